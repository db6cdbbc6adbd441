//! Orb arena WebSocket server.

use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Orb Arena Server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = server::Config::load()?;
    info!("Loaded configuration");
    info!("  Port: {}", config.server.port);
    info!("  World: {}x{}", config.world.width, config.world.height);
    info!(
        "  Round: {}ms + {}ms scores",
        config.round.duration_ms, config.round.score_display_ms
    );
    info!("  Ledger: {:?}", config.ledger.mode);

    // Start the game server
    server::run(config).await?;

    Ok(())
}
