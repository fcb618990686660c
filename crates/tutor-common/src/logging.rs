use tracing_subscriber::EnvFilter;

/// Initialize the global `tracing` subscriber. Filter is sourced from
/// `RUST_LOG`, falling back to `TUTOR_LOG`, then `"info"` — mirrors the
/// reference server's own `EnvFilter::try_from_default_env().or_else(...)`
/// chain so operators can use either the generic or the project-scoped
/// variable name.
///
/// Safe to call more than once; subsequent calls are no-ops.
pub fn init() {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(std::env::var("TUTOR_LOG").unwrap_or_default()))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
