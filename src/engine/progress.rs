//! Progress throttling for running requests

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Emission thresholds for progress updates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressCadence {
    /// Minimum wall time between two emissions
    pub interval: Duration,
    /// Minimum progress gained between two emissions (fraction of 1.0)
    pub step: f64,
}

impl Default for ProgressCadence {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(1000),
            step: 0.05,
        }
    }
}

/// Turns raw backend samples into a monotonic, rate-limited progress stream.
///
/// A sample is emitted only when both the interval and the step have passed
/// since the previous emission. Fractions are clamped to [0, 1] and never go
/// backwards.
#[derive(Debug)]
pub struct ProgressThrottle {
    cadence: ProgressCadence,
    total_seconds: f64,
    last_emitted: Option<(f64, Instant)>,
    high_water: f64,
}

impl ProgressThrottle {
    /// `total_seconds` is the expected output duration
    pub fn new(cadence: ProgressCadence, total_seconds: f64) -> Self {
        Self {
            cadence,
            total_seconds,
            last_emitted: None,
            high_water: 0.0,
        }
    }

    /// Fraction of the expected duration covered by `processed_seconds`
    pub fn fraction_of(&self, processed_seconds: f64) -> f64 {
        if self.total_seconds <= 0.0 || !processed_seconds.is_finite() {
            return 0.0;
        }
        (processed_seconds / self.total_seconds).clamp(0.0, 1.0)
    }

    /// Offer a raw fraction observed at `now`; returns the value to emit, if any
    pub fn offer(&mut self, fraction: f64, now: Instant) -> Option<f64> {
        if !fraction.is_finite() {
            return None;
        }
        let fraction = fraction.clamp(0.0, 1.0).max(self.high_water);
        self.high_water = fraction;

        let due = match self.last_emitted {
            None => fraction >= self.cadence.step,
            Some((last, at)) => {
                fraction - last >= self.cadence.step
                    && now.saturating_duration_since(at) >= self.cadence.interval
            }
        };
        // 1.0 is reserved for the completion event
        if !due || fraction >= 1.0 {
            return None;
        }

        self.last_emitted = Some((fraction, now));
        Some(fraction)
    }

    /// Offer processed media time instead of a fraction
    pub fn offer_seconds(&mut self, processed_seconds: f64, now: Instant) -> Option<f64> {
        let fraction = self.fraction_of(processed_seconds);
        self.offer(fraction, now)
    }

    /// Highest fraction seen so far
    pub fn high_water(&self) -> f64 {
        self.high_water
    }
}
