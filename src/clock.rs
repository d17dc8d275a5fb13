use crate::error::AppError;
use attendance_core::clock::{format_hhmm, ClockText};
use esp_idf_svc::hal::delay::FreeRtos;
use esp_idf_svc::sntp::{EspSntp, SntpConf, SyncStatus};
use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds to wait for the first SNTP sync at boot.
const SYNC_WAIT_SECS: u32 = 10;

/// Wall clock synchronized over SNTP. Cosmetic only.
pub struct TimeSource {
  /// The SNTP service; stops when dropped.
  sntp: EspSntp<'static>,

  /// Local offset from UTC.
  utc_offset_secs: i32,
}

/// The time source implementation.
impl TimeSource {
  /// Start SNTP against a server.
  ///
  /// # Parameters
  /// - `server`: The NTP server.
  /// - `utc_offset_secs`: Local offset from UTC.
  ///
  /// # Returns
  /// The time source, not yet synchronized.
  pub fn start(server: &str, utc_offset_secs: i32) -> Result<Self, AppError> {
    let mut conf = SntpConf::default();
    conf.servers[0] = server;

    let sntp = EspSntp::new(&conf)
      .map_err(|e| AppError::TimeError(format!("Failed to start SNTP with {}: {:?}", server, e)))?;

    log::info!("SNTP started with {}", server);

    Ok(Self { sntp, utc_offset_secs })
  }

  /// Block until the first sync completes or the wait runs out.
  ///
  /// # Returns
  /// Whether the clock is synchronized.
  pub fn wait_for_sync(&self) -> bool {
    for _ in 0..SYNC_WAIT_SECS {
      if self.is_synced() {
        break;
      }
      log::info!("Waiting for NTP time sync...");
      FreeRtos::delay_ms(1000);
    }

    let synced = self.is_synced();

    if synced {
      log::info!("NTP time synchronized: {}", self.clock_text());
    } else {
      log::warn!("Could not sync time with NTP");
    }

    synced
  }

  pub fn is_synced(&self) -> bool {
    self.sntp.get_sync_status() == SyncStatus::Completed
  }

  /// Local `HH:MM`, or `--:--` while the RTC holds no plausible time.
  pub fn clock_text(&self) -> ClockText {
    format_hhmm(Self::unix_secs(), self.utc_offset_secs)
  }

  fn unix_secs() -> Option<i64> {
    SystemTime::now()
      .duration_since(UNIX_EPOCH)
      .ok()
      .map(|elapsed| elapsed.as_secs() as i64)
  }
}
