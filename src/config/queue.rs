//! Webhook queue configuration

use serde::Deserialize;
use std::time::Duration;

use crate::adapters::queue::RetryPolicy;

use super::error::ValidationError;

#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_attempt_timeout")]
    pub attempt_timeout_secs: u64,

    /// Base delay; attempt `n` waits `n * retry_backoff_ms` before the next.
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,

    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl QueueConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default()
            .with_max_attempts(self.max_attempts)
            .with_attempt_timeout(Duration::from_secs(self.attempt_timeout_secs))
            .with_backoff(Duration::from_millis(self.retry_backoff_ms))
            .with_concurrency(self.concurrency)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_attempts == 0 || self.max_attempts > 10 {
            return Err(ValidationError::InvalidRetryAttempts);
        }
        if self.attempt_timeout_secs == 0 || self.attempt_timeout_secs > 600 {
            return Err(ValidationError::InvalidAttemptTimeout);
        }
        if self.channel_capacity == 0 || self.concurrency == 0 {
            return Err(ValidationError::InvalidQueueCapacity);
        }
        Ok(())
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            attempt_timeout_secs: default_attempt_timeout(),
            retry_backoff_ms: default_retry_backoff(),
            channel_capacity: default_channel_capacity(),
            concurrency: default_concurrency(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_attempt_timeout() -> u64 {
    120
}

fn default_retry_backoff() -> u64 {
    1000
}

fn default_channel_capacity() -> usize {
    1024
}

fn default_concurrency() -> usize {
    4
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_give_three_attempts_of_two_minutes() {
        let policy = QueueConfig::default().retry_policy();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.attempt_timeout, Duration::from_secs(120));
        assert_eq!(policy.backoff, Duration::from_secs(1));
    }

    #[test]
    fn zero_attempts_is_invalid() {
        let config = QueueConfig {
            max_attempts: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ValidationError::InvalidRetryAttempts));
    }
}
