//! Retry delay computation.
//!
//! `BackoffScheduler` is a pure function of the attempt number. It does not
//! track attempts itself; the synchronizer's `RetryState` drives it.

use std::time::Duration;

use rand::Rng;

/// Default number of automatic retries before degrading to fallback.
pub const MAX_RETRIES: u32 = 3;

/// Default delay before the first retry.
pub const BASE_DELAY: Duration = Duration::from_millis(1000);

/// Upper bound on the random jitter, as a fraction of the delay.
const JITTER_FRACTION: f64 = 0.1;

/// Outcome of asking the scheduler about an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Wait this long, then try again.
    Retry(Duration),
    /// Retry ceiling reached; the caller moves on to fallback.
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffScheduler {
    max_retries: u32,
    base_delay: Duration,
    jitter: bool,
}

impl BackoffScheduler {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            jitter: false,
        }
    }

    pub fn from_config(config: &crate::config::SyncConfig) -> Self {
        Self::new(config.max_retries, Duration::from_millis(config.base_delay_ms))
            .with_jitter(config.jitter)
    }

    /// Enable random jitter. Leave off wherever timing must be reproducible.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Delay before retry number `attempt` (0-based): `2^attempt * base`.
    ///
    /// With the defaults this is 1s, 2s, 4s for attempts 0, 1, 2 and `Stop`
    /// from attempt 3 on.
    pub fn delay_for(&self, attempt: u32) -> Backoff {
        if attempt >= self.max_retries {
            return Backoff::Stop;
        }
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        let delay = self.base_delay.saturating_mul(factor);
        if self.jitter {
            return Backoff::Retry(add_jitter(delay));
        }
        Backoff::Retry(delay)
    }
}

impl Default for BackoffScheduler {
    fn default() -> Self {
        Self::new(MAX_RETRIES, BASE_DELAY)
    }
}

fn add_jitter(delay: Duration) -> Duration {
    let max_extra = (delay.as_millis() as f64 * JITTER_FRACTION) as u64;
    if max_extra == 0 {
        return delay;
    }
    let extra = rand::rng().random_range(0..=max_extra);
    delay + Duration::from_millis(extra)
}
