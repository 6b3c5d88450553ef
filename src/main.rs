use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use ownurvoice::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Init logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    fmt().with_env_filter(filter).init();

    let config = AppConfig::from_env()?;

    // Startup banner at info level so something always prints at default verbosity
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    info!(
        target: "ownurvoice",
        "OwnUrVoice starting: RUST_LOG='{}', http_port={}, backend={:?}",
        rust_log, config.http_port, config.backend
    );

    ownurvoice::server::run(config).await
}
