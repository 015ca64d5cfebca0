use crate::{
    command_executor::{GimbalHandler, command_sender::GimbalCommandSender},
    communication::service::Service,
    config::{create_default_config, init_config},
    controller::gimbal::GimbalController,
    hardware::{OrientationReader, ServoBank, SystemClock},
    store::TomlStore,
};

use std::path::PathBuf;
use tracing::{error, info, warn};
use utilities::command_executor::CommandExecutor;

pub mod command_executor;
pub mod communication;
pub mod config;
pub mod controller;
pub mod hardware;
pub mod logging;
#[cfg(test)]
pub(crate) mod mocks;
pub mod store;

fn should_create_config() -> bool {
    std::env::var("CREATE_CONFIG")
        .map(|val| val == "1" || val.to_lowercase() == "true")
        .unwrap_or(false)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init()?;

    if should_create_config() {
        create_default_config(None::<PathBuf>)?;
    }

    let (_config_manager, config) = init_config().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        error!("Run with CREATE_CONFIG=1 to create a default configuration file.");
        e
    })?;

    let sensor = OrientationReader::open(&config.hardware)
        .map_err(|e| warn!("Orientation sensor not found: {}", e))
        .ok();
    let actuator = ServoBank::open(&config.hardware)
        .map_err(|e| warn!("Servo driver not found: {}", e))
        .ok();
    let store = TomlStore::new(&config.storage.calibration_path);

    let controller = GimbalController::new(
        sensor,
        actuator,
        store,
        SystemClock,
        config.controller.clone(),
    );

    let executor = CommandExecutor::new(GimbalHandler::new(controller));
    let gimbal = GimbalCommandSender::new(executor.sender());
    let _executor_handle = executor.spawn()?;

    let service = Service::new(config.server.clone(), gimbal);

    tokio::select! {
        result = service.run() => result?,
        _ = tokio::signal::ctrl_c() => info!("Shutting down"),
    }

    Ok(())
}
