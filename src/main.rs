use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use equipment_service::config::{mask_database_url, ServiceConfig};
use equipment_service::{EquipmentEngine, HttpServer};

async fn shutdown_signal() {
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Received shutdown signal, gracefully shutting down...");
        }
        Err(err) => {
            error!("Unable to listen for shutdown signal: {}", err);
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "equipment_service=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Equipment Service v{}", env!("CARGO_PKG_VERSION"));

    let config = ServiceConfig::from_env()?;

    info!("Configuration loaded:");
    info!("  HTTP address: {}", config.socket_addr());
    info!("  Storage backend: {:?}", config.storage_backend);
    if let Some(url) = &config.database_url {
        info!("  Database URL: {}", mask_database_url(url));
    }
    info!("  Session TTL: {}h", config.session_ttl_hours);

    let engine = Arc::new(EquipmentEngine::from_config(&config).await?);

    let server = HttpServer::new(engine, config.cookie_secure, config.max_upload_bytes);
    server
        .start(config.socket_addr(), shutdown_signal())
        .await?;

    info!("Equipment Service shutdown complete");
    Ok(())
}
