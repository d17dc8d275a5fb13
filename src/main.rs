mod clock;
mod device;
mod display;
mod error;
mod network;
mod ranging;
mod reader;

use crate::device::DeviceManager;
use crate::error::AppError;
use attendance_core::config::TerminalConfig;
use esp_idf_svc::hal::delay::FreeRtos;
use esp_idf_svc::hal::prelude::*;
use esp_idf_svc::log::EspLogger;
use esp_idf_svc::sys::link_patches;
use log::info;

/// This function initializes the system and starts the main loop.
///
/// # Returns
/// The result of the operation.
fn main() -> Result<(), AppError> {
  // Initialize system
  link_patches();
  EspLogger::initialize_default();
  info!("=== IoT Attendance & Energy Monitor ===");

  let config = TerminalConfig::default();

  let peripherals = Peripherals::take()
    .map_err(|_| AppError::PeripheralsError("Failed to acquire ESP32 peripherals".into()))?;

  // Initialize device manager
  let mut manager = DeviceManager::new(peripherals, &config)?;

  // Main loop
  loop {
    manager.update();
    FreeRtos::delay_ms(config.timings.loop_tick_ms);
  }
}
