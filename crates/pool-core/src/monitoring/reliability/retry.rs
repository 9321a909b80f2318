//! Retry policy with fixed, linear, and exponential backoff (C11b).

use std::time::Duration;

use rand::Rng;

use crate::error::{ErrorInfo, ErrorKind, PoolResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffStrategy {
    FixedDelay,
    Exponential,
    Linear,
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub strategy: BackoffStrategy,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            strategy: BackoffStrategy::Exponential,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(3600),
            backoff_multiplier: 2.0,
            jitter: 0.0,
        }
    }
}

impl RetryPolicy {
    /// Delay before `attempt` (0-indexed). `Fixed` is constant,
    /// `Exponential` multiplies by `backoff_multiplier^attempt`, `Linear`
    /// scales by `attempt + 1`. Both are capped at `max_delay`.
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_secs = match self.strategy {
            BackoffStrategy::FixedDelay => self.initial_delay.as_secs_f64(),
            BackoffStrategy::Exponential => {
                self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32)
            }
            BackoffStrategy::Linear => self.initial_delay.as_secs_f64() * (attempt as f64 + 1.0),
        };
        let capped = base_secs.min(self.max_delay.as_secs_f64());

        let delayed = if self.jitter > 0.0 {
            let jitter_range = capped * self.jitter;
            let offset = rand::thread_rng().gen_range(-jitter_range..=jitter_range);
            (capped + offset).max(0.0)
        } else {
            capped
        };
        Duration::from_secs_f64(delayed)
    }

    /// `false` once `attempt` reaches `max_attempts`, or when `kind` is
    /// flagged non-transient.
    pub fn should_retry(&self, attempt: u32, kind: ErrorKind) -> bool {
        if kind.is_non_transient() {
            return false;
        }
        attempt < self.max_attempts
    }

    /// Runs `f`, retrying per this policy until it succeeds or attempts
    /// are exhausted.
    pub fn execute<F, R>(&self, mut f: F) -> PoolResult<R>
    where
        F: FnMut(u32) -> Result<R, ErrorKind>,
    {
        let mut attempt = 0;
        loop {
            match f(attempt) {
                Ok(value) => return Ok(value),
                Err(kind) => {
                    if !self.should_retry(attempt, kind) {
                        return Err(ErrorInfo::new(ErrorKind::RetryAttemptsExhausted, format!("gave up after {} attempts ({:?})", attempt + 1, kind)));
                    }
                    std::thread::sleep(self.calculate_delay(attempt));
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter(strategy: BackoffStrategy) -> RetryPolicy {
        RetryPolicy {
            max_attempts: 5,
            strategy,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(3600),
            backoff_multiplier: 2.0,
            jitter: 0.0,
        }
    }

    #[test]
    fn exponential_backoff_doubles_each_attempt() {
        let policy = no_jitter(BackoffStrategy::Exponential);
        assert_eq!(policy.calculate_delay(0), Duration::from_secs(1));
        assert_eq!(policy.calculate_delay(1), Duration::from_secs(2));
        assert_eq!(policy.calculate_delay(2), Duration::from_secs(4));
        assert_eq!(policy.calculate_delay(3), Duration::from_secs(8));
    }

    #[test]
    fn exponential_backoff_caps_at_max_delay() {
        let policy = RetryPolicy {
            max_delay: Duration::from_secs(3),
            ..no_jitter(BackoffStrategy::Exponential)
        };
        assert_eq!(policy.calculate_delay(5), Duration::from_secs(3));
    }

    #[test]
    fn fixed_delay_is_constant() {
        let policy = no_jitter(BackoffStrategy::FixedDelay);
        assert_eq!(policy.calculate_delay(0), Duration::from_secs(1));
        assert_eq!(policy.calculate_delay(4), Duration::from_secs(1));
    }

    #[test]
    fn linear_delay_scales_by_attempt_number() {
        let policy = no_jitter(BackoffStrategy::Linear);
        assert_eq!(policy.calculate_delay(0), Duration::from_secs(1));
        assert_eq!(policy.calculate_delay(1), Duration::from_secs(2));
        assert_eq!(policy.calculate_delay(2), Duration::from_secs(3));
    }

    #[test]
    fn non_transient_errors_are_never_retried() {
        let policy = RetryPolicy::default();
        assert!(!policy.should_retry(0, ErrorKind::InvalidArgument));
        assert!(policy.should_retry(0, ErrorKind::NetworkError));
    }

    #[test]
    fn exhausting_attempts_returns_retry_exhausted() {
        let policy = RetryPolicy {
            max_attempts: 2,
            ..no_jitter(BackoffStrategy::FixedDelay)
        };
        let calls = std::cell::Cell::new(0);
        let result: PoolResult<()> = policy.execute(|_attempt| {
            calls.set(calls.get() + 1);
            Err(ErrorKind::NetworkError)
        });
        assert_eq!(result.unwrap_err().kind, ErrorKind::RetryAttemptsExhausted);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn execute_returns_first_success() {
        let policy = no_jitter(BackoffStrategy::FixedDelay);
        let result = policy.execute(|attempt| if attempt < 2 { Err(ErrorKind::NetworkError) } else { Ok(attempt) });
        assert_eq!(result.unwrap(), 2);
    }
}
