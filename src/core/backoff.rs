use std::time::Duration;

/// Exponential backoff policy for failed session fetches.
///
/// Failures are counted from 1: the first failure waits `base`, the second
/// `base * multiplier`, and so on, never longer than `cap`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub multiplier: f64,
    pub cap: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(2_000),
            multiplier: 2.0,
            cap: Duration::from_millis(60_000),
        }
    }
}

impl BackoffPolicy {
    /// Delay before the next attempt after `failure_count` consecutive failures.
    /// A count of 0 is treated as 1.
    pub fn next_delay(&self, failure_count: u32) -> Duration {
        next_delay(failure_count, self.base, self.cap, self.multiplier)
    }
}

/// `min(cap, base * multiplier^(failure_count - 1))`.
pub fn next_delay(failure_count: u32, base: Duration, cap: Duration, multiplier: f64) -> Duration {
    let exponent = failure_count.max(1) - 1;
    let factor = multiplier.max(1.0).powi(exponent.min(i32::MAX as u32) as i32);
    let millis = base.as_millis() as f64 * factor;
    let cap_millis = cap.as_millis() as f64;

    if !millis.is_finite() || millis >= cap_millis {
        return cap;
    }
    Duration::from_millis(millis.round() as u64).min(cap)
}
