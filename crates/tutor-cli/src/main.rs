use std::sync::Arc;

use clap::Parser;
use tutor_common::logging;
use tutor_common::Config;
use tutor_exec::Executor;
use tutor_server::build_router;
use tutor_server::spawn_auth_pruner;
use tutor_server::AppState;
use tutor_server::AuthManager;
use tutor_store::Catalog;
use tutor_store::CounterStore;
use tutor_store::SessionStore;
use tutor_tutor::default_sweep_interval;
use tutor_tutor::spawn_sweeper;
use tutor_tutor::TutorRegistry;

/// Command-line interface for the `tutor-server` binary. Environment
/// variables (see `tutor_common::Config`) cover everything this flag set
/// doesn't; flags take precedence when both are given.
#[derive(Parser, Debug)]
#[command(version)]
struct Cli {
    /// Address to bind the HTTP/WebSocket server to.
    #[arg(long)]
    bind: Option<String>,

    /// Require this password for `/api/login`. Unset disables auth.
    #[arg(long)]
    password: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    let cli = Cli::parse();
    let mut config = Config::load()?;
    if let Some(bind) = cli.bind {
        config.bind_addr = bind;
    }
    if let Some(password) = cli.password {
        config.tutor_password = Some(password);
    }

    tokio::fs::create_dir_all(&config.sessions_dir).await?;
    tokio::fs::create_dir_all(&config.workspaces_dir).await?;

    let catalog = Catalog::load(&config.problems_dir);
    tracing::info!(count = catalog.len(), "problem catalog ready");

    let store = SessionStore::new(&config.sessions_dir);
    let counters = CounterStore::new(&config.sessions_dir)?;
    let executor = Arc::new(
        Executor::new(&config.workspaces_dir).with_limits(config.exec_cpu_seconds, config.exec_memory_mb),
    );
    let registry = Arc::new(TutorRegistry::with_limits(config.park_ttl, config.park_capacity));
    let auth = Arc::new(AuthManager::new(config.tutor_password.clone()));

    spawn_sweeper(Arc::clone(&registry), default_sweep_interval());
    spawn_auth_pruner(Arc::clone(&auth));

    let workspaces_dir = config.workspaces_dir.clone();
    let bind_addr = config.bind_addr.clone();
    let state = Arc::new(AppState::new(
        config,
        catalog,
        store,
        counters,
        registry,
        executor,
        auth,
        workspaces_dir,
    ));

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "tutor-server listening");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;
    Ok(())
}
