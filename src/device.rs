use crate::clock::TimeSource;
use crate::display::Lcd1602;
use crate::error::AppError;
use crate::network::{Session, WifiStation};
use crate::ranging::UltrasonicRanger;
use crate::reader::Mfrc522Reader;
use attendance_core::clock::{format_hhmm, ClockText};
use attendance_core::config::TerminalConfig;
use attendance_core::schedule::Concern;
use attendance_core::terminal::{Effect, Terminal};
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::delay::FreeRtos;
use esp_idf_svc::hal::gpio::{InputPin, OutputPin, PinDriver};
use esp_idf_svc::hal::i2c::{I2cConfig, I2cDriver};
use esp_idf_svc::hal::peripherals::Peripherals;
use esp_idf_svc::hal::prelude::*;
use esp_idf_svc::hal::spi::{config::Config as SpiConfig, SpiDeviceDriver, SpiDriver, SpiDriverConfig};
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use std::time::Instant;

/// The device manager interface.
pub struct DeviceManager<'a> {
  /// The 16x2 LCD.
  display: Lcd1602<'a>,

  /// The MFRC522 badge reader.
  reader: Mfrc522Reader<'a>,

  /// The HC-SR04 ranger standing in for a power meter.
  ranger: UltrasonicRanger<'a>,

  /// The Wi-Fi station.
  wifi: WifiStation,

  /// The backend session.
  session: Session,

  /// The SNTP clock, absent if it could not be started.
  time: Option<TimeSource>,

  /// Local offset from UTC.
  utc_offset_secs: i32,

  /// The terminal state.
  terminal: Terminal,

  /// Loop clock origin.
  boot: Instant,
}

/// The device manager implementation.
impl<'a> DeviceManager<'a> {
  /// Bring up every peripheral and open the backend session.
  ///
  /// Wi-Fi, time sync and the first connection attempt may fail without
  /// aborting; the main loop keeps retrying the connection.
  ///
  /// # Parameters
  /// - `peripherals`: The ESP32 peripherals.
  /// - `config`: The terminal configuration.
  ///
  /// # Returns
  /// The device manager.
  pub fn new(peripherals: Peripherals, config: &TerminalConfig) -> Result<Self, AppError> {
    let boot = Instant::now();
    let pins = peripherals.pins;

    // LCD on I2C0: SDA 21, SCL 22
    let i2c_config = I2cConfig::default().baudrate(100.kHz().into());
    let i2c = I2cDriver::new(peripherals.i2c0, pins.gpio21, pins.gpio22, &i2c_config)
      .map_err(|e| AppError::PeripheralsError(format!("Failed to initialize I2C: {:?}", e)))?;

    let mut display = Lcd1602::new(i2c);
    display.init()?;
    display.message("Initializing...", "Please wait")?;

    // Wi-Fi
    let sys_loop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take()?;
    let mut wifi = WifiStation::new(peripherals.modem, sys_loop, nvs, &config.wifi)?;

    log::info!("Connecting to Wi-Fi: {}", config.wifi.ssid);
    display.message("Connecting WiFi", config.wifi.ssid)?;

    if wifi.connect() {
      display.message("WiFi Connected", &wifi.ip_address())?;
      FreeRtos::delay_ms(1000);
    } else {
      display.message("WiFi Failed!", "Check settings")?;
      FreeRtos::delay_ms(2000);
    }

    // Time
    display.message("Syncing Time...", "")?;
    let time = match TimeSource::start(config.ntp_server, config.utc_offset_secs) {
      Ok(time) => Some(time),
      Err(e) => {
        log::error!("{}", e);
        None
      }
    };

    if time.as_ref().is_some_and(TimeSource::wait_for_sync) {
      display.message("Time Synced!", "")?;
    } else {
      display.message("Time Sync Fail", "Using server time")?;
    }
    FreeRtos::delay_ms(500);

    // MFRC522 on SPI2: SCK 18, MOSI 23, MISO 19, SS 5, RST 27
    let spi = SpiDriver::new(
      peripherals.spi2,
      pins.gpio18,
      pins.gpio23,
      Some(pins.gpio19),
      &SpiDriverConfig::new(),
    )
      .map_err(|e| AppError::PeripheralsError(format!("Failed to initialize SPI: {:?}", e)))?;
    let spi_device = SpiDeviceDriver::new(spi, Some(pins.gpio5), &SpiConfig::new().baudrate(4.MHz().into()))?;
    let reset = PinDriver::output(pins.gpio27.downgrade_output())?;

    let mut reader = Mfrc522Reader::new(spi_device, reset);
    reader.init()?;
    display.message("RFID Ready", "")?;

    // HC-SR04: TRIG 32, ECHO 33
    let trigger = PinDriver::output(pins.gpio32.downgrade_output())?;
    let echo = PinDriver::input(pins.gpio33.downgrade_input())?;
    let ranger = UltrasonicRanger::new(trigger, echo)?;

    // Backend
    let mut session = Session::new(config);
    if let Err(e) = session.connect() {
      log::error!("{}", e);
    }

    display.message("System Ready", "Scan RFID Card")?;
    log::info!("Setup complete!");

    let terminal = Terminal::new(config, boot.elapsed().as_millis() as u64);

    Ok(Self {
      display,
      reader,
      ranger,
      wifi,
      session,
      time,
      utc_offset_secs: config.utc_offset_secs,
      terminal,
      boot,
    })
  }

  /// Run one loop iteration: apply network events, then every due concern.
  pub fn update(&mut self) {
    let now = self.now_ms();

    for event in self.session.drain() {
      let effects = self.terminal.on_link(event, now);
      self.apply(effects);
    }

    for concern in self.terminal.due(now) {
      let effects = match concern {
        Concern::Badge => {
          let uid = self.reader.poll();
          self.terminal.on_badge(uid.as_deref(), now)
        }
        Concern::Power => {
          let watts = self.ranger.sample_power();
          self.terminal.on_power_sample(watts)
        }
        other => {
          let clock = self.clock_text();
          self.terminal.service(other, &clock)
        }
      };

      self.apply(effects);
    }
  }

  /// Carry out terminal effects. Failures are logged and retried by later cycles.
  ///
  /// # Parameters
  /// - `effects`: The effects, in order.
  fn apply(&mut self, effects: Vec<Effect>) {
    for effect in effects {
      match effect {
        Effect::Send(message) => {
          if let Err(e) = self.session.send(&message) {
            log::error!("{}", e);
          }
        }
        Effect::Show(frame) => {
          if let Err(e) = self.display.show(&frame) {
            log::error!("Failed to update display: {}", e);
          }
        }
        Effect::Reconnect => {
          self.wifi.ensure_connected();
          if let Err(e) = self.session.connect() {
            log::error!("{}", e);
          }
        }
      }
    }
  }

  fn clock_text(&self) -> ClockText {
    match &self.time {
      Some(time) => time.clock_text(),
      None => format_hhmm(None, self.utc_offset_secs),
    }
  }

  fn now_ms(&self) -> u64 {
    self.boot.elapsed().as_millis() as u64
  }
}
