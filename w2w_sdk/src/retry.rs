use std::time::Duration;

/// Backoff for consecutive failed relay polls.
///
/// ```
/// use w2w_sdk::retry::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy {
///     max_retries: 10,
///     initial_delay: Duration::from_secs(1),
///     multiplier: 2.0,
///     max_delay: Duration::from_secs(60),
/// };
///
/// assert_eq!(policy.next_timeout(3), Some(Duration::from_secs(8)));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Consecutive failures tolerated before giving up
    pub max_retries: u32,
    pub initial_delay: Duration,
    /// Growth of the delay per failure; 1s with 2.0 waits 1s, 2s, 4s...
    pub multiplier: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 8,
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Delay after `failures` consecutive failures, `None` once
    /// `max_retries` is reached
    pub fn next_timeout(&self, failures: u32) -> Option<Duration> {
        if failures >= self.max_retries {
            return None;
        }

        let delay = self.initial_delay.as_secs_f64() * self.multiplier.powi(failures as i32);
        let delay = Duration::from_secs_f64(delay);

        Some(std::cmp::min(delay, self.max_delay))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff() {
        let policy = RetryPolicy {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(10),
        };

        assert_eq!(policy.next_timeout(0), Some(Duration::from_secs(1)));
        assert_eq!(policy.next_timeout(1), Some(Duration::from_secs(2)));
        assert_eq!(policy.next_timeout(2), Some(Duration::from_secs(4)));
        assert_eq!(policy.next_timeout(3), None);
    }

    #[test]
    fn test_default_caps_at_a_minute() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.next_timeout(0), Some(Duration::from_secs(1)));
        assert_eq!(policy.next_timeout(6), Some(Duration::from_secs(60)));
        assert_eq!(policy.next_timeout(7), Some(Duration::from_secs(60)));
        assert_eq!(policy.next_timeout(8), None);
    }
}
