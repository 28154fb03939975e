use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Retry policy for transient database failures.
///
/// Attempt `n` (0-indexed) waits `initial_delay_ms * backoff_multiplier^n`,
/// capped at `max_delay_ms`, before the next try.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Whether retries are enabled.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Maximum number of retry attempts (not including the initial attempt).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial delay before first retry in milliseconds.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Maximum delay between retries in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Multiplier for exponential backoff.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Random jitter applied to delays (fraction, 0.0-1.0).
    #[serde(default)]
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: 0.0,
        }
    }
}

impl RetryConfig {
    /// A policy that makes exactly one attempt.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Total attempts including the first one.
    pub fn max_attempts(&self) -> u32 {
        if self.enabled {
            self.max_retries.saturating_add(1)
        } else {
            1
        }
    }

    /// Calculate the delay for a given retry attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_delay =
            (self.initial_delay_ms as f64) * self.backoff_multiplier.powi(attempt as i32);
        let capped_delay = base_delay.min(self.max_delay_ms as f64);

        let jitter_range = capped_delay * self.jitter;
        let jitter = if jitter_range > 0.0 {
            use rand::Rng;
            rand::thread_rng().gen_range(-jitter_range..jitter_range)
        } else {
            0.0
        };

        let final_delay = (capped_delay + jitter).max(0.0);
        Duration::from_millis(final_delay as u64)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(ConfigError::Validation(format!(
                "retry.backoff_multiplier must be a finite number >= 1.0, got {}",
                self.backoff_multiplier
            )));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(ConfigError::Validation(format!(
                "retry.jitter must be between 0.0 and 1.0, got {}",
                self.jitter
            )));
        }
        if self.initial_delay_ms > self.max_delay_ms {
            return Err(ConfigError::Validation(
                "retry.initial_delay_ms cannot exceed retry.max_delay_ms".into(),
            ));
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    100
}

fn default_max_delay_ms() -> u64 {
    10_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_doubles_then_caps() {
        let config = RetryConfig {
            initial_delay_ms: 100,
            max_delay_ms: 500,
            backoff_multiplier: 2.0,
            ..Default::default()
        };
        assert_eq!(config.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(400));
        assert_eq!(config.delay_for_attempt(3), Duration::from_millis(500));
        assert_eq!(config.delay_for_attempt(20), Duration::from_millis(500));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let config = RetryConfig {
            initial_delay_ms: 1000,
            jitter: 0.5,
            ..Default::default()
        };
        for _ in 0..50 {
            let delay = config.delay_for_attempt(0).as_millis();
            assert!((500..=1500).contains(&delay), "delay {delay} out of range");
        }
    }

    #[test]
    fn test_max_attempts() {
        assert_eq!(RetryConfig::default().max_attempts(), 4);
        assert_eq!(RetryConfig::disabled().max_attempts(), 1);
        let no_retries = RetryConfig {
            max_retries: 0,
            ..Default::default()
        };
        assert_eq!(no_retries.max_attempts(), 1);
    }

    #[test]
    fn test_validate() {
        RetryConfig::default().validate().unwrap();
        assert!(
            RetryConfig {
                backoff_multiplier: 0.5,
                ..Default::default()
            }
            .validate()
            .is_err()
        );
        assert!(
            RetryConfig {
                jitter: 1.5,
                ..Default::default()
            }
            .validate()
            .is_err()
        );
        assert!(
            RetryConfig {
                initial_delay_ms: 20_000,
                ..Default::default()
            }
            .validate()
            .is_err()
        );
    }
}
