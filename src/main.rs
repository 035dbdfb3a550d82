mod api;
mod bootstrap;
mod config;
mod error;
mod execution;
mod ledger;
mod middleware;
mod oracle;
mod server;
mod settlement;
mod webhook;

use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// Initialize logging and tracing
fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,tower_http=debug,chain_adapter=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    init_tracing();

    info!("🚀 Starting chain adapter");

    let config = config::Config::from_env()?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let components = bootstrap::initialize(&config, shutdown_rx.clone())?;

    let scheduler_handle = components.scheduler.start(shutdown_rx)?;

    let app = server::create_app(components.state);

    let shutdown = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
            return;
        }
        info!("Shutdown signal received");
        shutdown_tx.send_replace(true);
    };

    server::run_server(app, &config.bind_address, shutdown).await?;

    components.scheduler.stop();
    if let Err(e) = scheduler_handle.await {
        error!("Scheduler task failed: {}", e);
    }

    info!("👋 Chain adapter stopped");
    Ok(())
}
