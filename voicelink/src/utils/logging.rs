use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize logging with tracing
///
/// Reads the filter from the RUST_LOG environment variable if set, and
/// falls back to "voicelink=debug,warn" otherwise.
///
/// # Example
///
/// ```no_run
/// use voicelink::utils::logging::init_logging;
///
/// init_logging();
/// ```
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("voicelink=debug,warn"));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    tracing::info!("voicelink logging initialized");
}
