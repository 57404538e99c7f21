//! Exponential backoff for failed provider calls.

use std::time::Duration;

use rand::{Rng, thread_rng};

use crate::config::RetryPolicyConfig;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    base: Duration,
    max: Duration,
    jitter_factor: f64,
    max_attempts: u32,
}

impl RetryPolicy {
    pub fn new(base: Duration, max: Duration, jitter_factor: f64, max_attempts: u32) -> Self {
        Self {
            base,
            max: max.max(base),
            jitter_factor: jitter_factor.clamp(0.0, 1.0),
            max_attempts: max_attempts.max(1),
        }
    }

    /// Failed attempts allowed on one request before giving up.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before the next attempt, given how many attempts already failed.
    ///
    /// `min(base * 2^attempts, max)` plus up to `jitter_factor` of that value.
    /// A larger `retry_after` hint from the provider wins.
    pub fn backoff(&self, attempts_completed: u32, retry_after: Option<u64>) -> Duration {
        self.backoff_with(attempts_completed, retry_after, &mut thread_rng())
    }

    fn backoff_with<R: Rng + ?Sized>(
        &self,
        attempts_completed: u32,
        retry_after: Option<u64>,
        rng: &mut R,
    ) -> Duration {
        let exponent = i32::try_from(attempts_completed).unwrap_or(i32::MAX);
        let mut backoff = (self.base.as_secs_f64() * 2_f64.powi(exponent))
            .min(self.max.as_secs_f64());

        if let Some(retry_after) = retry_after {
            backoff = backoff.max(retry_after as f64);
        }

        let jitter_range = self.jitter_factor * backoff;
        let jitter = if jitter_range > 0.0 {
            rng.gen_range(0.0..jitter_range)
        } else {
            0.0
        };

        Duration::try_from_secs_f64(backoff + jitter).unwrap_or(self.max)
    }
}

impl From<&RetryPolicyConfig> for RetryPolicy {
    fn from(config: &RetryPolicyConfig) -> Self {
        Self::new(
            Duration::from_millis(config.base_ms),
            Duration::from_millis(config.max_ms),
            config.jitter_factor,
            config.max_attempts,
        )
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryPolicyConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn policy(jitter_factor: f64) -> RetryPolicy {
        RetryPolicy::new(
            Duration::from_secs(1),
            Duration::from_secs(60),
            jitter_factor,
            5,
        )
    }

    #[test]
    fn doubles_until_capped() {
        let policy = policy(0.0);
        let mut rng = StdRng::seed_from_u64(7);

        assert_eq!(policy.backoff_with(0, None, &mut rng), Duration::from_secs(1));
        assert_eq!(policy.backoff_with(1, None, &mut rng), Duration::from_secs(2));
        assert_eq!(policy.backoff_with(3, None, &mut rng), Duration::from_secs(8));
        assert_eq!(policy.backoff_with(10, None, &mut rng), Duration::from_secs(60));
        assert_eq!(policy.backoff_with(u32::MAX, None, &mut rng), Duration::from_secs(60));
    }

    #[test]
    fn jitter_stays_within_factor() {
        let policy = policy(0.1);
        let mut rng = StdRng::seed_from_u64(42);

        for _ in 0..100 {
            let delay = policy.backoff_with(2, None, &mut rng).as_secs_f64();
            assert!((4.0..4.4).contains(&delay), "delay {delay} out of range");
        }
    }

    #[test]
    fn retry_after_takes_precedence_when_larger() {
        let policy = policy(0.0);
        let mut rng = StdRng::seed_from_u64(1);

        assert_eq!(
            policy.backoff_with(0, Some(30), &mut rng),
            Duration::from_secs(30)
        );
        assert_eq!(
            policy.backoff_with(4, Some(3), &mut rng),
            Duration::from_secs(16)
        );
    }

    #[test]
    fn built_from_config() {
        let policy = RetryPolicy::from(&RetryPolicyConfig {
            base_ms: 10,
            max_ms: 40,
            jitter_factor: 0.0,
            max_attempts: 3,
        });

        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.backoff(5, None), Duration::from_millis(40));
    }
}
