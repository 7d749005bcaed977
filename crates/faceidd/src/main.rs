use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod engine;

use config::{BusKind, Config};
use dbus_interface::{FaceIdService, BUS_NAME, OBJECT_PATH};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("faceidd starting");

    let config = Config::from_env().context("failed to load configuration")?;
    tracing::info!(
        model_dir = %config.model_dir.display(),
        db_path = %config.db_path.display(),
        threshold = config.decision_threshold,
        bus = ?config.bus,
        "configuration loaded"
    );

    let engine = engine::spawn_engine(&config).context("failed to start recognition engine")?;
    let service = FaceIdService::new(engine);

    let builder = match config.bus {
        BusKind::Session => zbus::connection::Builder::session(),
        BusKind::System => zbus::connection::Builder::system(),
    }
    .context("failed to connect to D-Bus")?;

    let _connection = builder
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, service)?
        .build()
        .await
        .context("failed to register D-Bus service")?;

    tracing::info!(name = BUS_NAME, path = OBJECT_PATH, "faceidd ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("faceidd shutting down");

    Ok(())
}
