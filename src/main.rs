//! urlwatch server binary.

use urlwatch::config::ServerConfig;
use urlwatch::export;
use urlwatch::scheduler::Scheduler;
use urlwatch::store::Store;
use urlwatch::web::Server;

use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("urlwatch=info".parse()?))
        .init();

    // Load configuration
    let cfg = ServerConfig::load();
    tracing::info!("Starting urlwatch on port {}...", cfg.http_port);

    let store = Arc::new(Store::new());
    let scheduler = Arc::new(Scheduler::new(store.clone())?);

    if cfg.autostart && !cfg.targets.is_empty() {
        scheduler.start(cfg.target_specs())?;
    } else {
        tracing::info!("No targets started; waiting for a start command");
    }

    let server = Server::new(cfg.clone(), scheduler.clone());
    server.start(shutdown_signal()).await?;

    // Let in-flight probes run into their timeout before exporting
    scheduler.shutdown(Duration::from_secs(6)).await;

    if let Some(dir) = &cfg.export_dir {
        match export::write_snapshot(dir, &store.snapshot()) {
            Ok(paths) => tracing::info!("Wrote {} CSV exports to {}", paths.len(), dir.display()),
            Err(e) => tracing::error!("Failed to export results to {}: {}", dir.display(), e),
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
