use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;
use tutor_common::Config;
use tutor_exec::Executor;
use tutor_store::Catalog;
use tutor_store::CounterStore;
use tutor_store::SessionStore;
use tutor_tutor::TutorRegistry;

use crate::auth::AuthManager;

/// Everything a connection handler or REST handler needs, shared behind
/// `Arc` across every task the server spawns. The store, counters, registry,
/// and auth manager all carry their own internal locking; this struct adds
/// only the per-session lock table, since no single existing component owns
/// "is a session currently being mutated" across both the WS and REST
/// surfaces.
pub struct AppState {
    pub config: Config,
    pub catalog: Catalog,
    pub store: SessionStore,
    pub counters: CounterStore,
    pub registry: Arc<TutorRegistry>,
    pub executor: Arc<Executor>,
    pub auth: Arc<AuthManager>,
    pub workspaces_dir: PathBuf,
    session_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl AppState {
    pub fn new(
        config: Config,
        catalog: Catalog,
        store: SessionStore,
        counters: CounterStore,
        registry: Arc<TutorRegistry>,
        executor: Arc<Executor>,
        auth: Arc<AuthManager>,
        workspaces_dir: PathBuf,
    ) -> Self {
        Self {
            config,
            catalog,
            store,
            counters,
            registry,
            executor,
            auth,
            workspaces_dir,
            session_locks: Mutex::new(HashMap::new()),
        }
    }

    /// The lock serializing all mutating operations on one session across
    /// both the WebSocket connection loop and the REST run/submit handlers.
    pub async fn session_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.session_locks.lock().await;
        locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub fn workspace_for(&self, session_id: &str) -> PathBuf {
        self.workspaces_dir.join(session_id)
    }
}
