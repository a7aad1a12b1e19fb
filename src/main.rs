use tracing_subscriber::{EnvFilter, fmt};
use tracing::info;

use sessiongate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    // Init logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    // Startup banner at info level so something always prints at default verbosity
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    info!(
        target: "startup",
        "sessiongate starting: RUST_LOG='{}', log_level='{}', bind={}:{}, user_directory={}, session_snapshot={:?}",
        rust_log,
        config.log_level,
        config.bind_addr,
        config.port,
        if config.database_url.is_some() { "postgres" } else { "memory" },
        config.sessions.snapshot_path,
    );

    sessiongate::server::run(config).await
}
