use tracing_subscriber::EnvFilter;

/// Initialize the process-wide `tracing` subscriber. Called exactly once,
/// before any other component logs anything. Defaults to `info` when
/// `RUST_LOG` is unset.
pub fn init() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .json()
        .init();
}
