//! Fixed-interval timers for each concern of the main loop.

use crate::config::Timings;
use enumset::{EnumSet, EnumSetType};

/// Work the main loop services on its own timer.
///
/// Iterating an `EnumSet<Concern>` yields concerns in declaration order,
/// which is the order the loop services them in.
#[derive(Debug, EnumSetType)]
pub enum Concern {
    Badge,
    Power,
    Display,
    Heartbeat,
    Reconnect,
}

/// A periodic timer measured in milliseconds since boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    period_ms: u64,
    last_ms: u64,
    forced: bool,
}

impl Interval {
    /// Create a timer whose first period starts at `start_ms`.
    pub fn new(period_ms: u64, start_ms: u64) -> Self {
        Self {
            period_ms,
            last_ms: start_ms,
            forced: false,
        }
    }

    /// Whether a full period elapsed since the last service (or a service was forced).
    pub fn is_due(&self, now_ms: u64) -> bool {
        self.forced || now_ms.saturating_sub(self.last_ms) >= self.period_ms
    }

    /// Record a service at `now_ms`.
    pub fn mark(&mut self, now_ms: u64) {
        self.last_ms = now_ms;
        self.forced = false;
    }

    /// Make the timer due on the next check regardless of elapsed time.
    pub fn force(&mut self) {
        self.forced = true;
    }
}

/// One timer per [`Concern`].
#[derive(Debug, Clone)]
pub struct Schedule {
    badge: Interval,
    power: Interval,
    display: Interval,
    heartbeat: Interval,
    reconnect: Interval,
}

impl Schedule {
    /// Create the timers, all starting at boot.
    ///
    /// # Arguments
    /// * `timings` - Interval lengths.
    /// * `boot_ms` - Loop clock at boot.
    ///
    /// # Returns
    /// * `Schedule` - The timers.
    pub fn new(timings: &Timings, boot_ms: u64) -> Self {
        Self {
            badge: Interval::new(timings.badge_poll_ms, boot_ms),
            power: Interval::new(timings.power_sample_ms, boot_ms),
            display: Interval::new(timings.display_refresh_ms, boot_ms),
            heartbeat: Interval::new(timings.heartbeat_ms, boot_ms),
            reconnect: Interval::new(timings.reconnect_ms, boot_ms),
        }
    }

    fn interval_mut(&mut self, concern: Concern) -> &mut Interval {
        match concern {
            Concern::Badge => &mut self.badge,
            Concern::Power => &mut self.power,
            Concern::Display => &mut self.display,
            Concern::Heartbeat => &mut self.heartbeat,
            Concern::Reconnect => &mut self.reconnect,
        }
    }

    /// Collect and mark every eligible concern whose timer expired.
    ///
    /// Concerns outside `eligible` are neither returned nor marked, so their
    /// timers keep running from the last time they were serviced.
    ///
    /// # Arguments
    /// * `now_ms` - Current loop clock.
    /// * `eligible` - Concerns allowed to run in the current state.
    ///
    /// # Returns
    /// * `EnumSet<Concern>` - The concerns to service now.
    pub fn take_due(&mut self, now_ms: u64, eligible: EnumSet<Concern>) -> EnumSet<Concern> {
        let mut due = EnumSet::new();

        for concern in eligible {
            let interval = self.interval_mut(concern);
            if interval.is_due(now_ms) {
                interval.mark(now_ms);
                due.insert(concern);
            }
        }

        due
    }

    /// Force a concern to run on the next [`Schedule::take_due`].
    pub fn force(&mut self, concern: Concern) {
        self.interval_mut(concern).force();
    }
}

/// Tests.
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_waits_full_period() {
        let mut interval = Interval::new(100, 0);

        assert!(!interval.is_due(99));
        assert!(interval.is_due(100));

        interval.mark(130);
        assert!(!interval.is_due(229));
        assert!(interval.is_due(230));
    }

    #[test]
    fn forced_interval_is_due_once() {
        let mut interval = Interval::new(60_000, 0);
        interval.force();

        assert!(interval.is_due(1));
        interval.mark(1);
        assert!(!interval.is_due(2));
    }

    #[test]
    fn take_due_respects_eligibility() {
        let mut schedule = Schedule::new(&Timings::default(), 0);

        let due = schedule.take_due(5_000, Concern::Badge | Concern::Display);
        assert_eq!(due, Concern::Badge | Concern::Display);

        // Reconnect was not eligible, so its timer was not consumed.
        let due = schedule.take_due(5_000, EnumSet::only(Concern::Reconnect));
        assert_eq!(due, EnumSet::only(Concern::Reconnect));
    }

    #[test]
    fn reconnect_no_more_than_every_period() {
        let mut schedule = Schedule::new(&Timings::default(), 0);
        let mut attempts = Vec::new();

        for now in (0..30_000).step_by(10) {
            if schedule
                .take_due(now, EnumSet::only(Concern::Reconnect))
                .contains(Concern::Reconnect)
            {
                attempts.push(now);
            }
        }

        assert_eq!(attempts, vec![5_000, 10_000, 15_000, 20_000, 25_000]);
        assert!(attempts.windows(2).all(|w| w[1] - w[0] >= 5_000));
    }
}
