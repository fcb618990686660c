//! Durable Session Store: atomic, corruption-tolerant persistence of
//! sessions, the shared problem-attempt counters, and the startup-loaded
//! problem catalog.

pub mod atomic;
pub mod catalog;
pub mod counters;
pub mod error;
pub mod paths;
pub mod session_store;

pub use catalog::Catalog;
pub use counters::CounterStore;
pub use counters::ProblemCounters;
pub use error::StoreError;
pub use error::StoreOutcome;
pub use session_store::SessionStore;
