mod auth;
pub mod error;
mod http;
mod router;
mod state;
mod ws;

use std::sync::Arc;
use std::time::Duration;

pub use auth::AuthManager;
pub use error::OrchestratorError;
pub use router::build_router;
pub use state::AppState;

const AUTH_PRUNE_INTERVAL: Duration = Duration::from_secs(60);

/// Runs `AuthManager::prune` on a fixed interval for the life of the process,
/// the auth-side counterpart to `tutor_tutor::spawn_sweeper`.
pub fn spawn_auth_pruner(auth: Arc<AuthManager>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(AUTH_PRUNE_INTERVAL);
        loop {
            ticker.tick().await;
            auth.prune().await;
        }
    })
}
