use tracing_subscriber::EnvFilter;

/// Installs a global `tracing` subscriber reading its filter from
/// `RUST_LOG`, defaulting to `info`. Mirrors `weavegraph::telemetry`'s
/// initializer; idempotent-safe to call more than once in tests (errors
/// from a second `try_init` are ignored).
pub fn init_tracing() {
    init_tracing_with_filter("info");
}

pub fn init_tracing_with_filter(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(true)
        .try_init();
}
