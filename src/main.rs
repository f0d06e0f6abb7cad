use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize logging with tracing.
/// Reads the filter from RUST_LOG, falling back to crate-level debug.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("voicebooth=debug,warn"));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() {
    // Load .env file if present (for development convenience)
    // Silently ignore if not found - production uses system env vars
    let _ = dotenvy::dotenv();

    init_logging();

    voicebooth::run().await;
}
