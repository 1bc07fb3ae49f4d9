//! Retry policy with exponential backoff.
//!
//! The delay before retry `n` (1-based) is `base_delay * 2^(n-1)`, capped at
//! `max_delay`, plus uniform jitter in `[0, max_jitter)`. Backoff sleeps are
//! bounded by the caller's deadline and are cancelled with the calling future.

use orchestrator_core::{OrchestratorError, OrchestratorResult};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Maximum delay between retries, before jitter
    pub max_delay: Duration,
    /// Backoff multiplier
    pub multiplier: f64,
    /// Upper bound of the random jitter added to each delay
    pub max_jitter: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            max_jitter: Duration::from_secs(1),
        }
    }
}

/// Retry policy implementation
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Create a new retry policy with the given configuration
    #[must_use]
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Create with default configuration
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(RetryConfig::default())
    }

    /// A policy that never retries
    #[must_use]
    pub fn no_retry() -> Self {
        Self::new(RetryConfig {
            max_retries: 0,
            ..Default::default()
        })
    }

    /// Get the configuration
    #[must_use]
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Backoff before retry `retry` (1-based), without jitter
    #[must_use]
    pub fn backoff(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31) as i32;
        let base = self.config.base_delay.as_secs_f64();
        let delay = base * self.config.multiplier.powi(exponent);
        let delay = delay.min(self.config.max_delay.as_secs_f64());
        Duration::from_secs_f64(delay.max(0.0))
    }

    /// Backoff before retry `retry` (1-based), with jitter
    #[must_use]
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        self.backoff(retry) + self.jitter()
    }

    fn jitter(&self) -> Duration {
        let max = self.config.max_jitter.as_millis() as u64;
        if max == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..max))
    }

    /// Execute an operation with retry logic.
    ///
    /// `operation` receives the 0-based attempt number. Retries stop early
    /// when the next backoff would run past `deadline`.
    pub async fn run<F, Fut, T>(&self, deadline: Option<Instant>, mut operation: F) -> RetryResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = OrchestratorResult<T>>,
    {
        let mut attempt = 0;
        loop {
            let error = match operation(attempt).await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(attempt = attempt, "Retry succeeded");
                    }
                    return RetryResult::Success {
                        value,
                        attempts: attempt + 1,
                    };
                }
                Err(error) => error,
            };

            if !error.is_retryable() {
                return RetryResult::NonRetryable {
                    error,
                    attempts: attempt + 1,
                };
            }
            if attempt >= self.config.max_retries {
                return RetryResult::Exhausted {
                    error,
                    attempts: attempt + 1,
                };
            }

            let delay = self.delay_for_retry(attempt + 1);
            if let Some(deadline) = deadline {
                if Instant::now() + delay >= deadline {
                    debug!(
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        "Retry backoff would pass the deadline, giving up"
                    );
                    return RetryResult::Exhausted {
                        error,
                        attempts: attempt + 1,
                    };
                }
            }

            warn!(
                attempt = attempt + 1,
                max_retries = self.config.max_retries,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Retrying after error"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    /// Execute an operation with retry logic
    ///
    /// # Errors
    /// Returns the last error once retries are exhausted, or the first
    /// non-retryable error
    pub async fn execute<F, Fut, T>(&self, deadline: Option<Instant>, operation: F) -> OrchestratorResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = OrchestratorResult<T>>,
    {
        self.run(deadline, operation).await.into_result()
    }
}

/// Result of a retry operation
#[derive(Debug)]
pub enum RetryResult<T> {
    /// Operation succeeded
    Success {
        /// The value produced
        value: T,
        /// Number of attempts made
        attempts: u32,
    },
    /// Operation kept failing with retryable errors
    Exhausted {
        /// The final error
        error: OrchestratorError,
        /// Number of attempts made
        attempts: u32,
    },
    /// Operation failed with a non-retryable error
    NonRetryable {
        /// The error
        error: OrchestratorError,
        /// Number of attempts made
        attempts: u32,
    },
}

impl<T> RetryResult<T> {
    /// Convert to a Result carrying the last error
    ///
    /// # Errors
    /// Returns the error if the operation failed
    pub fn into_result(self) -> OrchestratorResult<T> {
        match self {
            Self::Success { value, .. } => Ok(value),
            Self::Exhausted { error, .. } | Self::NonRetryable { error, .. } => Err(error),
        }
    }

    /// Number of attempts made
    #[must_use]
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Success { attempts, .. }
            | Self::Exhausted { attempts, .. }
            | Self::NonRetryable { attempts, .. } => *attempts,
        }
    }

    /// Check if the operation succeeded
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Builder for retry policy
#[derive(Debug, Default)]
pub struct RetryPolicyBuilder {
    config: RetryConfig,
}

impl RetryPolicyBuilder {
    /// Create a new builder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set max retries
    #[must_use]
    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    /// Set base delay
    #[must_use]
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.config.base_delay = delay;
        self
    }

    /// Set max delay
    #[must_use]
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.config.max_delay = delay;
        self
    }

    /// Set backoff multiplier
    #[must_use]
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.config.multiplier = multiplier.max(1.0);
        self
    }

    /// Set the jitter bound
    #[must_use]
    pub fn max_jitter(mut self, jitter: Duration) -> Self {
        self.config.max_jitter = jitter;
        self
    }

    /// Build the policy
    #[must_use]
    pub fn build(self) -> RetryPolicy {
        RetryPolicy::new(self.config)
    }
}
