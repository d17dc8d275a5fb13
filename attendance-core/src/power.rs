//! Simulated power draw derived from an ultrasonic distance reading.
//!
//! This stands in for a real power meter: a closer obstacle means a higher
//! wattage. No calibration is implied.

/// Longest echo the ranging sensor waits for, in microseconds.
pub const ECHO_TIMEOUT_US: u32 = 30_000;

/// Upper bound of the mapped distance range in centimetres.
pub const MAX_DISTANCE_CM: f32 = 400.0;

/// Power reported at zero distance.
pub const MAX_POWER_W: f32 = 1000.0;

/// Jitter added to an in-range estimate, half-open `[-20, 20)`.
const JITTER_W: (i32, i32) = (-20, 20);

/// Base load reported without a usable echo, half-open `[50, 80)`.
const BASELINE_W: (i32, i32) = (50, 80);

/// Speed of sound in centimetres per microsecond.
const SOUND_CM_PER_US: f32 = 0.034;

/// Source of uniformly distributed random words.
pub trait Entropy {
    /// Next random word.
    fn next_u32(&mut self) -> u32;

    /// Uniform integer in the half-open range `[low, high)`.
    ///
    /// # Arguments
    /// * `low` - Inclusive lower bound.
    /// * `high` - Exclusive upper bound; must be greater than `low`.
    ///
    /// # Returns
    /// * `i32` - The drawn value.
    fn uniform(&mut self, low: i32, high: i32) -> i32 {
        let span = high.saturating_sub(low).max(1) as u32;
        low + (self.next_u32() % span) as i32
    }
}

/// Convert an echo high time to a one-way distance.
///
/// # Arguments
/// * `echo_us` - Round-trip echo duration in microseconds.
///
/// # Returns
/// * `f32` - Distance in centimetres.
pub fn echo_to_distance_cm(echo_us: u32) -> f32 {
    echo_us as f32 * SOUND_CM_PER_US / 2.0
}

/// Map a distance onto the inverse power range, before jitter.
///
/// Returns `None` when the distance is outside `(0, 400)` cm.
pub fn mapped_power(distance_cm: f32) -> Option<f32> {
    if distance_cm > 0.0 && distance_cm < MAX_DISTANCE_CM {
        Some(MAX_POWER_W * (MAX_DISTANCE_CM - distance_cm) / MAX_DISTANCE_CM)
    } else {
        None
    }
}

/// Estimate power draw from an echo measurement.
///
/// # Arguments
/// * `echo_us` - Echo duration, or `None` when no echo arrived in time.
/// * `rng` - Randomness for jitter and baseline.
///
/// # Returns
/// * `f32` - Watts; never negative.
pub fn estimate_power<R: Entropy + ?Sized>(echo_us: Option<u32>, rng: &mut R) -> f32 {
    let mapped = echo_us.map(echo_to_distance_cm).and_then(mapped_power);

    match mapped {
        Some(watts) => {
            let jitter = rng.uniform(JITTER_W.0, JITTER_W.1) as f32;
            (watts + jitter).max(0.0)
        }
        None => rng.uniform(BASELINE_W.0, BASELINE_W.1) as f32,
    }
}
