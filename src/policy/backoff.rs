use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(30_000);
pub const DEFAULT_JITTER: f64 = 0.25;

/// Source of the random component added to retry delays.
///
/// `next_unit` must return a value in `[0, 1)`.
pub trait JitterSource {
    fn next_unit(&mut self) -> f64;
}

impl<R: Rng> JitterSource for R {
    fn next_unit(&mut self) -> f64 {
        self.gen::<f64>()
    }
}

/// Always lands in the middle of the jitter band, so delays are the exact
/// exponential value.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoJitter;

impl JitterSource for NoJitter {
    fn next_unit(&mut self) -> f64 {
        0.5
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,
    pub backoff_factor: f64,
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
    /// Fraction of the delay that may be added or removed at random.
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1000),
            backoff_factor: 2.0,
            max_delay: DEFAULT_MAX_DELAY,
            jitter: DEFAULT_JITTER,
        }
    }
}

impl BackoffPolicy {
    pub fn new(base_delay: Duration, backoff_factor: f64, max_delay: Duration) -> Self {
        Self {
            base_delay,
            backoff_factor,
            max_delay,
            jitter: DEFAULT_JITTER,
        }
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    /// `min(base * factor^(attempt - 1), max)` without any randomness.
    pub fn base_delay_for(&self, attempt: u32) -> Duration {
        from_millis_f64(self.base_millis(attempt))
    }

    /// Exponential delay spread by up to `±jitter` and never above `max_delay`.
    pub fn delay_for<J: JitterSource + ?Sized>(&self, attempt: u32, jitter: &mut J) -> Duration {
        let spread = self.jitter.clamp(0.0, 1.0);
        let unit = jitter.next_unit().clamp(0.0, 1.0);
        let factor = 1.0 + spread * (2.0 * unit - 1.0);

        let jittered = self.base_millis(attempt) * factor;
        from_millis_f64(jittered).min(self.max_delay)
    }

    fn base_millis(&self, attempt: u32) -> f64 {
        let exponent = i32::try_from(attempt.max(1) - 1).unwrap_or(i32::MAX);
        let max_ms = self.max_delay.as_secs_f64() * 1000.0;
        let raw_ms = self.base_delay.as_secs_f64() * 1000.0 * self.backoff_factor.max(0.0).powi(exponent);

        // powi overflows to inf for large attempts
        if raw_ms.is_finite() {
            raw_ms.min(max_ms)
        } else {
            max_ms
        }
    }
}

// rounded to whole microseconds so 0.3s stays 300ms
fn from_millis_f64(ms: f64) -> Duration {
    Duration::from_micros((ms.max(0.0) * 1000.0).round() as u64)
}

/// Delay before the next attempt, jittered with the thread RNG.
pub fn get_retry_delay(
    attempt: u32,
    base_delay: Duration,
    backoff_factor: f64,
    max_delay: Duration,
) -> Duration {
    let policy = BackoffPolicy::new(base_delay, backoff_factor, max_delay);
    policy.delay_for(attempt, &mut rand::thread_rng())
}
