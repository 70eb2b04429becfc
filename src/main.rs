//! mirracquire - mirror resolution and fallback-fetch tool.
//!
//! Probes a pool of mirror URLs for the fastest reachable one, fetches a
//! text resource from it, and falls back to an anonymizing tor transport
//! when every direct mirror is unreachable.

use mirracquire::cli;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (before anything else)
    let _ = dotenvy::dotenv();

    // Initialize logging based on verbosity
    let default_filter = if cli::is_verbose() {
        "mirracquire=info"
    } else {
        "mirracquire=warn"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Run CLI
    cli::run().await
}
