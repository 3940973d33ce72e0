//! Bounded exponential backoff for transient source failures.

use std::time::Duration;

use crate::types::IngestOptions;

/// Retry state for one batch fetch.
///
/// Delay for attempt `n` (zero-based) is `base * 2^n`, capped at `max`. A throttle
/// hint raises the delay but never past the cap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    max_retries: u32,
    attempt: u32,
}

impl Backoff {
    #[must_use]
    pub fn new(base: Duration, max: Duration, max_retries: u32) -> Self {
        Self {
            base,
            max,
            max_retries,
            attempt: 0,
        }
    }

    #[must_use]
    pub fn from_options(options: &IngestOptions) -> Self {
        Self::new(
            options.base_backoff(),
            options.max_backoff(),
            options.max_retries,
        )
    }

    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }

    /// Delay before the next retry, or `None` once `max_retries` retries were spent.
    pub fn next_delay(&mut self, retry_after: Option<Duration>) -> Option<Duration> {
        if self.attempt >= self.max_retries {
            return None;
        }
        let computed = self.delay_for(self.attempt);
        self.attempt += 1;
        Some(retry_after.map_or(computed, |hint| hint.max(computed).min(self.max)))
    }

    /// Retries handed out so far.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_double_up_to_the_cap() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(5), 5);
        let delays: Vec<_> = std::iter::from_fn(|| backoff.next_delay(None)).collect();
        assert_eq!(
            delays,
            [1, 2, 4, 5, 5].map(Duration::from_secs).to_vec()
        );
        assert_eq!(backoff.attempts(), 5);
        assert_eq!(backoff.next_delay(None), None);

        backoff.reset();
        assert_eq!(backoff.next_delay(None), Some(Duration::from_secs(1)));
    }

    #[test]
    fn retry_after_is_honored_up_to_the_cap() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(10), 3);
        assert_eq!(
            backoff.next_delay(Some(Duration::from_secs(7))),
            Some(Duration::from_secs(7))
        );
        assert_eq!(
            backoff.next_delay(Some(Duration::from_secs(90))),
            Some(Duration::from_secs(10))
        );
        assert_eq!(
            backoff.next_delay(Some(Duration::from_millis(1))),
            Some(Duration::from_secs(4))
        );
    }

    #[test]
    fn huge_attempts_saturate() {
        let backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(60), 100);
        assert_eq!(backoff.delay_for(64), Duration::from_secs(60));
    }
}
