//! Logging initialization for NanoForge.

/// Initialize the global tracing subscriber.
///
/// Call once at startup before any tracing events are emitted. Falls back
/// to the `RUST_LOG` env var; if unset, uses the provided level. Safe to
/// call more than once (subsequent calls are no-ops).
pub fn init_logging(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}
