//! Call-rate ceiling for the record source.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::clock::{Clock, elapsed};

/// Enforces a minimum spacing of `1 / calls_per_second` between source calls.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    min_interval: Duration,
    last_call: Option<DateTime<Utc>>,
}

impl RateLimiter {
    /// A non-positive or non-finite rate disables limiting. A rate too small for its
    /// interval to fit in a `Duration` saturates at `Duration::MAX`.
    #[must_use]
    pub fn per_second(calls_per_second: f64) -> Self {
        let min_interval = if calls_per_second.is_finite() && calls_per_second > 0.0 {
            Duration::try_from_secs_f64(1.0 / calls_per_second).unwrap_or(Duration::MAX)
        } else {
            Duration::ZERO
        };
        Self {
            min_interval,
            last_call: None,
        }
    }

    #[must_use]
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// How long a call at `now` would have to wait.
    #[must_use]
    pub fn wait_time(&self, now: DateTime<Utc>) -> Duration {
        match self.last_call {
            Some(last) => self.min_interval.saturating_sub(elapsed(last, now)),
            None => Duration::ZERO,
        }
    }

    /// Sleep until a call is allowed, then record it. Returns the time slept.
    pub fn acquire(&mut self, clock: &dyn Clock) -> Duration {
        let wait = self.wait_time(clock.now());
        if !wait.is_zero() {
            tracing::trace!(wait_ms = wait.as_millis() as u64, "rate limit wait");
            clock.sleep(wait);
        }
        self.last_call = Some(clock.now());
        wait
    }
}
