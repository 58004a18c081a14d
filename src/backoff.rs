//! Retry of a single series fetch with exponential delay on throttling.

use std::time::Duration;

use tracing::warn;

use crate::fred::{FetchError, SeriesSource};
use crate::series::{DateRange, RawSeries};

const MAX_BACKOFF_SHIFT: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base_delay: Duration,
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_attempts: 5,
        }
    }
}

impl BackoffPolicy {
    /// `base_delay * 2^attempt`, attempts counted from zero.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.min(MAX_BACKOFF_SHIFT);
        self.base_delay.saturating_mul(factor)
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Blocking wait between attempts.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

pub fn fetch_with_backoff(
    source: &dyn SeriesSource,
    series_id: &str,
    range: &DateRange,
    policy: &BackoffPolicy,
    sleeper: &dyn Sleeper,
) -> Result<RawSeries, FetchError> {
    let attempts = policy.attempts();
    let mut attempt: u32 = 0;
    loop {
        match source.fetch_series(series_id, range) {
            Ok(series) => return Ok(series),
            Err(err) if err.is_rate_limited() && attempt + 1 < attempts => {
                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    component = "backoff",
                    event = "backoff.rate_limited",
                    series_id,
                    attempt = attempt + 1,
                    max_attempts = attempts,
                    delay_ms = delay.as_millis() as u64
                );
                sleeper.sleep(delay);
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
