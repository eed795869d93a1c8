//! Delivery retry backoff
//!
//! Backoff is computed, not slept on: failed deliveries are written back with
//! a `next_retry_at` timestamp and become visible to devices again when that
//! instant passes. No task blocks waiting for a retry.

use std::time::Duration;

use rand::Rng;

use crate::config::DeliveryConfig;

/// Compute the backoff delay before retry attempt number `attempt`
///
/// `attempt` is 1-based: the delay applied after the first failure is
/// `backoff_delay(config, 1)`. The delay grows by `backoff_multiplier` per
/// attempt and is capped at `max_backoff`. When jitter is enabled a random
/// factor in [0.5, 1.5) is applied so a fleet of devices retrying the same
/// artifact does not thundering-herd the server.
pub fn backoff_delay(config: &DeliveryConfig, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1);
    let base = config.initial_backoff.as_secs_f64()
        * config.backoff_multiplier.powi(exponent as i32);
    let capped = base.min(config.max_backoff.as_secs_f64());

    let secs = if config.jitter {
        let factor = rand::thread_rng().gen_range(0.5..1.5);
        capped * factor
    } else {
        capped
    };

    // Jitter can push past the cap; clamp so max_backoff is a hard ceiling.
    Duration::from_secs_f64(secs.min(config.max_backoff.as_secs_f64()))
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn config_without_jitter() -> DeliveryConfig {
        DeliveryConfig {
            initial_backoff: Duration::from_secs(60),
            max_backoff: Duration::from_secs(3600),
            backoff_multiplier: 2.0,
            jitter: false,
            ..DeliveryConfig::default()
        }
    }

    #[test]
    fn test_backoff_grows_exponentially() {
        let config = config_without_jitter();
        assert_eq!(backoff_delay(&config, 1), Duration::from_secs(60));
        assert_eq!(backoff_delay(&config, 2), Duration::from_secs(120));
        assert_eq!(backoff_delay(&config, 3), Duration::from_secs(240));
        assert_eq!(backoff_delay(&config, 4), Duration::from_secs(480));
    }

    #[test]
    fn test_backoff_is_capped() {
        let config = config_without_jitter();
        // 60 * 2^9 = 30720s, well past the 3600s cap
        assert_eq!(backoff_delay(&config, 10), Duration::from_secs(3600));
        assert_eq!(backoff_delay(&config, 100), Duration::from_secs(3600));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let config = DeliveryConfig {
            jitter: true,
            ..config_without_jitter()
        };
        for attempt in 1..=6 {
            let delay = backoff_delay(&config, attempt);
            let base = 60.0 * 2.0_f64.powi(attempt as i32 - 1);
            let expected_max = (base * 1.5).min(3600.0);
            assert!(delay.as_secs_f64() >= base.min(3600.0) * 0.5 - f64::EPSILON);
            assert!(delay.as_secs_f64() <= expected_max + f64::EPSILON);
        }
    }

    #[test]
    fn test_attempt_zero_behaves_like_first() {
        // Defensive callers passing 0 get the initial backoff, not a panic
        let config = config_without_jitter();
        assert_eq!(backoff_delay(&config, 0), Duration::from_secs(60));
    }
}
