use crate::error::AppError;
use attendance_core::power::{estimate_power, Entropy, ECHO_TIMEOUT_US};
use esp_idf_svc::hal::delay::Ets;
use esp_idf_svc::hal::gpio::{AnyInputPin, AnyOutputPin, Input, Output, PinDriver};
use std::time::{Duration, Instant};

/// Hardware random number generator.
///
/// Only truly random while the radio is on; otherwise pseudo-random, which
/// is enough for jitter.
pub struct HardwareEntropy;

impl Entropy for HardwareEntropy {
  fn next_u32(&mut self) -> u32 {
    // SAFETY: `esp_random` takes no arguments and only reads the RNG register.
    unsafe { esp_idf_svc::sys::esp_random() }
  }
}

/// HC-SR04 ultrasonic ranger, used as a stand-in power meter.
pub struct UltrasonicRanger<'a> {
  /// The trigger pin.
  trigger: PinDriver<'a, AnyOutputPin, Output>,

  /// The echo pin.
  echo: PinDriver<'a, AnyInputPin, Input>,

  /// Jitter source.
  entropy: HardwareEntropy,
}

/// The ranger implementation.
impl<'a> UltrasonicRanger<'a> {
  /// Create a new ranger.
  ///
  /// # Parameters
  /// - `trigger`: The trigger pin.
  /// - `echo`: The echo pin.
  ///
  /// # Returns
  /// The ranger.
  pub fn new(
    mut trigger: PinDriver<'a, AnyOutputPin, Output>,
    echo: PinDriver<'a, AnyInputPin, Input>
  ) -> Result<Self, AppError> {
    trigger.set_low()?;
    log::info!("Ultrasonic sensor initialized");

    Ok(Self { trigger, echo, entropy: HardwareEntropy })
  }

  /// Sample the simulated power draw.
  ///
  /// # Returns
  /// Watts; a baseline load when no echo was measured.
  pub fn sample_power(&mut self) -> f32 {
    let echo = self.measure_echo_us();
    estimate_power(echo, &mut self.entropy)
  }

  /// Trigger a pulse and time the echo.
  ///
  /// # Returns
  /// The echo high time in microseconds, or `None` on timeout.
  pub fn measure_echo_us(&mut self) -> Option<u32> {
    if let Err(e) = self.trigger_pulse() {
      log::error!("Failed to trigger ranging pulse: {:?}", e);
      return None;
    }

    let timeout = Duration::from_micros(ECHO_TIMEOUT_US as u64);
    let start = Instant::now();

    // A previous echo may still be high.
    while self.echo.is_high() {
      if start.elapsed() > timeout {
        return None;
      }
    }

    while self.echo.is_low() {
      if start.elapsed() > timeout {
        return None;
      }
    }

    let rising = Instant::now();
    while self.echo.is_high() {
      if start.elapsed() > timeout {
        return None;
      }
    }

    Some(rising.elapsed().as_micros() as u32)
  }

  fn trigger_pulse(&mut self) -> Result<(), AppError> {
    self.trigger.set_low()?;
    Ets::delay_us(2);
    self.trigger.set_high()?;
    Ets::delay_us(10);
    self.trigger.set_low()?;

    Ok(())
  }
}
