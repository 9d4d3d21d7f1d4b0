use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use pirblaster::catalog::AssetCatalog;
use pirblaster::config::AppConfig;
use pirblaster::hardware::LogTransmitter;
use pirblaster::registry::DEVICES_FILE;
use pirblaster::transport::MqttConnector;
use pirblaster::DeviceRegistry;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(version, about = "MQTT to infrared bridge")]
struct Args {
    /// Directory holding mqtt.json and hardware.json
    #[arg(long, env = "PIRBLASTER_CONFIG_DIR", default_value = "./config/components")]
    config_dir: PathBuf,

    /// Root of the <manufacturer>/<model>.json command sets
    #[arg(long, env = "PIRBLASTER_ASSETS_DIR", default_value = "./commandSets")]
    assets_dir: PathBuf,

    /// Devices file (defaults to devices.json in the config directory)
    #[arg(long, env = "PIRBLASTER_DEVICES_FILE")]
    devices_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let args = Args::parse();
    let devices_file = args
        .devices_file
        .unwrap_or_else(|| args.config_dir.join(DEVICES_FILE));

    info!("PirBlaster starting");
    info!("  Config: {}", args.config_dir.display());
    info!("  Assets: {}", args.assets_dir.display());

    let app_config = AppConfig::load(&args.config_dir).context("loading configuration")?;
    info!(
        "  Broker: {}:{}",
        app_config.broker_hostname(),
        app_config.broker_port()
    );

    let registry = DeviceRegistry::new(
        app_config,
        Arc::new(LogTransmitter),
        AssetCatalog::new(&args.assets_dir),
        Arc::new(MqttConnector),
        devices_file,
    );

    let count = registry.load().await.context("loading devices")?;
    info!("{} device(s) loaded", count);

    registry.start_all().await;

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("Shutting down");

    if let Err(e) = registry.stop_all().await {
        error!("{}", e);
    }

    Ok(())
}
