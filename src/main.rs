//! GPS logger server

use std::sync::Arc;

use gps_logger::{
    config::AppConfig,
    database::Storage,
    errors::GpsLoggerError,
    routes::{self, ROUTES},
};
use tokio::{net::TcpListener, signal};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), GpsLoggerError> {
    #[cfg(feature = "dotenv")]
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load()?;
    config.database.validate()?;

    let storage = Storage::from_config(&config.database)?;
    info!("Storage backend: {}", storage.describe());
    if let Err(e) = storage.initialize().await {
        error!("Schema initialization failed: {}", e);
        return Err(e);
    }

    let addr = config.server.listen_addr()?;
    let listener = TcpListener::bind(addr).await?;
    info!("Listening on {}", addr);
    info!("Routes: {:?}", ROUTES);

    axum::serve(listener, routes::router(Arc::new(storage)))
        .with_graceful_shutdown(async {
            match signal::ctrl_c().await {
                Ok(()) => info!("Received shutdown signal"),
                Err(e) => {
                    error!("Failed to listen for shutdown signal: {}", e);
                    std::future::pending::<()>().await
                }
            }
        })
        .await?;

    Ok(())
}
