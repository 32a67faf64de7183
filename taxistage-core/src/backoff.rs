//! Delay between fetch attempts.

use std::time::Duration;

/// Exponential backoff: `base_delay * 2^(attempt - 2)` before attempt `attempt`,
/// capped at `max_delay`. Attempt 1 never waits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Backoff {
    /// No waiting at all. Used by tests and by callers that pace themselves.
    pub const fn none() -> Self {
        Self {
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 || self.base_delay.is_zero() {
            return Duration::ZERO;
        }
        let exp = (attempt - 2).min(16);
        self.base_delay
            .saturating_mul(2u32.pow(exp))
            .min(self.max_delay)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_attempt_never_waits() {
        assert_eq!(Backoff::default().delay_before(1), Duration::ZERO);
    }

    #[test]
    fn doubles_then_caps() {
        let b = Backoff {
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(3),
        };
        assert_eq!(b.delay_before(2), Duration::from_millis(500));
        assert_eq!(b.delay_before(3), Duration::from_millis(1000));
        assert_eq!(b.delay_before(4), Duration::from_millis(2000));
        assert_eq!(b.delay_before(5), Duration::from_secs(3));
        assert_eq!(b.delay_before(60), Duration::from_secs(3));
    }

    #[test]
    fn none_is_zero() {
        assert_eq!(Backoff::none().delay_before(7), Duration::ZERO);
    }
}
