use ffu_server::config::ServerConfig;
use ffu_server::FleetServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = if let Ok(path) = std::env::var("FFU_CONFIG_PATH") {
        let mut config = ServerConfig::from_toml(path)?;
        config.fleet.apply_env();
        config
    } else {
        ServerConfig::from_env()?
    };

    // Create and start server
    let server = FleetServer::new(config)?;
    server.start().await?;

    Ok(())
}
