//! Exponential backoff with jitter for watch resubscription.

use rand::Rng;
use std::time::Duration;

/// Consecutive-failure tracker for the watch restart loop.
///
/// The n-th consecutive failure waits `base * 2^(n-1)`, capped at `max`,
/// plus up to 10% random jitter.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    failures: u32,
}

impl Backoff {
    pub fn new(base_ms: u64, max_ms: u64) -> Self {
        Self {
            base: Duration::from_millis(base_ms),
            max: Duration::from_millis(max_ms),
            failures: 0,
        }
    }

    /// Record a failure and return how long to wait before retrying.
    pub fn next_delay(&mut self) -> Duration {
        self.failures = self.failures.saturating_add(1);
        with_jitter(self.ceiling())
    }

    /// Delay for the current failure count, before jitter.
    pub fn ceiling(&self) -> Duration {
        let Some(exponent) = self.failures.checked_sub(1) else {
            return Duration::ZERO;
        };
        let factor = 1u32.checked_shl(exponent).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }

    /// Forget previous failures after a healthy session.
    pub fn reset(&mut self) {
        self.failures = 0;
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }
}

fn with_jitter(delay: Duration) -> Duration {
    let spread = delay / 10;
    delay + spread.mul_f64(rand::thread_rng().gen::<f64>())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    #[test]
    fn test_ceiling_doubles_then_caps() {
        let mut backoff = Backoff::new(100, 1000);
        assert_eq!(backoff.ceiling(), Duration::ZERO);

        let mut ceilings = Vec::new();
        for _ in 0..6 {
            backoff.next_delay();
            ceilings.push(backoff.ceiling());
        }
        assert_eq!(ceilings, vec![ms(100), ms(200), ms(400), ms(800), ms(1000), ms(1000)]);
    }

    #[test]
    fn test_jitter_stays_within_ten_percent() {
        let mut backoff = Backoff::new(1000, 30_000);
        for _ in 0..8 {
            let delay = backoff.next_delay();
            let ceiling = backoff.ceiling();
            assert!(delay >= ceiling);
            assert!(delay <= ceiling + ceiling / 10);
        }
    }

    #[test]
    fn test_many_failures_do_not_overflow() {
        let mut backoff = Backoff::new(500, 30_000);
        for _ in 0..200 {
            assert!(backoff.next_delay() <= ms(33_000));
        }
        assert_eq!(backoff.failures(), 200);
    }

    #[test]
    fn test_reset_starts_over() {
        let mut backoff = Backoff::new(100, 1000);
        backoff.next_delay();
        backoff.next_delay();
        assert_eq!(backoff.failures(), 2);

        backoff.reset();
        assert_eq!(backoff.failures(), 0);
        backoff.next_delay();
        assert_eq!(backoff.ceiling(), ms(100));
    }
}
