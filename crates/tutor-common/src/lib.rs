//! Ambient stack shared by every other crate: configuration loading and the
//! logging initializer. Deliberately has no dependency on `tutor-protocol`
//! or any of the domain crates — it sits below all of them.

pub mod config;
pub mod logging;

pub use config::Config;
pub use config::ConfigError;
