//! Exponential backoff with a ceiling and optional jitter.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backoff settings shared by the conflict-retry loop and the deploy command
/// retry loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Delay before the second attempt
    pub base_delay_ms: u64,
    /// Growth factor applied per attempt
    pub multiplier: f64,
    /// Ceiling for any single delay
    pub max_delay_ms: u64,
    /// Whether to add random jitter to each delay
    pub jitter_enabled: bool,
    /// Largest jitter as a fraction of the computed delay
    pub max_jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            multiplier: 2.0,
            max_delay_ms: 60_000,
            jitter_enabled: true,
            max_jitter: 0.1,
        }
    }
}

impl BackoffConfig {
    /// Delay to wait after the given failed attempt (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31) as i32;
        let raw = self.base_delay_ms as f64 * self.multiplier.powi(exponent);
        let capped = raw.min(self.max_delay_ms as f64);

        let with_jitter = if self.jitter_enabled && self.max_jitter > 0.0 {
            let jitter = capped * rand::rng().random_range(0.0..=self.max_jitter);
            (capped + jitter).min(self.max_delay_ms as f64)
        } else {
            capped
        };

        Duration::from_millis(with_jitter.max(0.0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter() -> BackoffConfig {
        BackoffConfig {
            jitter_enabled: false,
            ..BackoffConfig::default()
        }
    }

    #[test]
    fn delays_grow_exponentially() {
        let config = no_jitter();
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(3), Duration::from_secs(4));
    }

    #[test]
    fn delays_are_capped() {
        let config = BackoffConfig {
            max_delay_ms: 5_000,
            ..no_jitter()
        };
        assert_eq!(config.delay_for_attempt(10), Duration::from_secs(5));
        assert_eq!(config.delay_for_attempt(u32::MAX), Duration::from_secs(5));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let config = BackoffConfig::default();
        for _ in 0..50 {
            let delay = config.delay_for_attempt(2);
            assert!(delay >= Duration::from_secs(2));
            assert!(delay <= Duration::from_millis(2_200));
        }
    }
}
