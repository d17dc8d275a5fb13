//! Cosmetic wall-clock formatting for the status line.

use core::fmt::Write;
use heapless::String;

/// Placeholder shown while the clock is not synchronized.
pub const UNSYNCED: &str = "--:--";

/// Anything before 2021-01-01 is treated as an unsynchronized RTC.
pub const MIN_VALID_EPOCH: i64 = 1_609_459_200;

const SECS_PER_DAY: i64 = 86_400;

/// `HH:MM` text for the status line.
pub type ClockText = String<5>;

/// Local hour and minute for a Unix timestamp.
///
/// # Arguments
/// * `unix_secs` - Seconds since the Unix epoch (UTC).
/// * `utc_offset_secs` - Local offset from UTC.
///
/// # Returns
/// * `Option<(u8, u8)>` - `(hour, minute)`, or `None` if the timestamp is not
///   a plausible synchronized time.
pub fn local_hm(unix_secs: i64, utc_offset_secs: i32) -> Option<(u8, u8)> {
    if unix_secs < MIN_VALID_EPOCH {
        return None;
    }

    let seconds_of_day = (unix_secs + utc_offset_secs as i64).rem_euclid(SECS_PER_DAY);

    Some(((seconds_of_day / 3600) as u8, (seconds_of_day % 3600 / 60) as u8))
}

/// Format `HH:MM`, or [`UNSYNCED`] when no valid time is available.
pub fn format_hhmm(unix_secs: Option<i64>, utc_offset_secs: i32) -> ClockText {
    let mut out = ClockText::new();

    match unix_secs.and_then(|secs| local_hm(secs, utc_offset_secs)) {
        Some((hour, minute)) => {
            let _ = write!(out, "{hour:02}:{minute:02}");
        }
        None => {
            let _ = out.push_str(UNSYNCED);
        }
    }

    out
}

/// Tests.
#[cfg(test)]
mod tests {
    use super::*;

    // 2026-01-11T01:30:00Z
    const SAMPLE: i64 = 1_768_095_000;

    #[test]
    fn formats_local_time_with_offset() {
        assert_eq!(format_hhmm(Some(SAMPLE), 8 * 3600).as_str(), "09:30");
        assert_eq!(format_hhmm(Some(SAMPLE), 0).as_str(), "01:30");
    }

    #[test]
    fn wraps_past_midnight() {
        assert_eq!(local_hm(SAMPLE, -2 * 3600), Some((23, 30)));
    }

    #[test]
    fn unsynced_clock_shows_placeholder() {
        assert_eq!(format_hhmm(None, 0).as_str(), UNSYNCED);
        assert_eq!(format_hhmm(Some(12), 8 * 3600).as_str(), UNSYNCED);
    }
}
