//! Retry policy with exponential backoff.
//!
//! The default schedule is the one the profile loader uses: two retries after
//! 2s and 4s, three attempts in total.

use crate::ApiError;
use std::time::Duration;

/// Retry policy configuration.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
    /// Whether to add jitter to delays
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: false,
        }
    }
}

impl RetryConfig {
    /// Set the maximum number of retries.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the delay before the first retry.
    #[must_use]
    pub const fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the maximum delay.
    #[must_use]
    pub const fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Add up to 25% random jitter to each delay.
    #[must_use]
    pub const fn with_jitter(mut self) -> Self {
        self.jitter = true;
        self
    }
}

/// Decides whether and when a failed attempt is retried.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Create a new retry policy with the given configuration.
    #[must_use]
    pub const fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Create a retry policy with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(RetryConfig::default())
    }

    /// Delay to wait after failed attempt number `attempt` (0-based).
    ///
    /// With the defaults this is `2^(attempt + 1)` seconds.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base_delay =
            self.config.initial_delay.as_secs_f64() * self.config.multiplier.powi(exponent);
        let delay = base_delay.min(self.config.max_delay.as_secs_f64());

        let delay = if self.config.jitter {
            delay * (1.0 + rand::random::<f64>() * 0.25)
        } else {
            delay
        };

        Duration::from_secs_f64(delay)
    }

    /// Check if an error seen on attempt number `attempt` should be retried.
    #[must_use]
    pub const fn should_retry(&self, error: &ApiError, attempt: u32) -> bool {
        attempt < self.config.max_retries && error.is_retryable()
    }

    /// Get the maximum number of retries.
    #[must_use]
    pub const fn max_retries(&self) -> u32 {
        self.config.max_retries
    }

    /// Total number of attempts, the first one included.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.config.max_retries.saturating_add(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::with_defaults()
    }
}
