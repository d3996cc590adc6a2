//! Generic retry executor with pluggable backoff and retry policies
//!
//! The executor drives an async operation until it succeeds, the policy
//! declines to retry, or the attempt budget is spent. Delays are computed by
//! a [`BackoffStrategy`] and slept with `tokio::time::sleep`, so tests can
//! run it under a paused runtime clock.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

/// Errors that can occur during retry operations
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// Every attempt failed; carries the error of the final attempt
    #[error("all {attempts} attempts failed, last error: {last}")]
    Exhausted { attempts: u32, last: E },

    /// The policy refused to retry this error
    #[error("non-retryable error after {attempts} attempt(s): {error}")]
    NonRetryable { attempts: u32, error: E },

    /// The retry configuration is invalid
    #[error("invalid retry configuration: {message}")]
    InvalidConfiguration { message: String },
}

impl<E> RetryError<E> {
    /// Number of attempts made before giving up.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted { attempts, .. } | Self::NonRetryable { attempts, .. } => *attempts,
            Self::InvalidConfiguration { .. } => 0,
        }
    }
}

/// Result type for retry operations
pub type RetryResult<T, E> = Result<T, RetryError<E>>;

/// Outcome of a retry execution including result and summary statistics.
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    pub result: RetryResult<T, E>,
    pub attempts: u32,
    pub total_delay: Duration,
}

impl<T, E> RetryOutcome<T, E> {
    /// Consume the outcome and return only the result.
    pub fn into_result(self) -> RetryResult<T, E> {
        self.result
    }

    /// Number of retries performed (attempts after the first).
    pub fn retries(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }
}

/// Trait for determining whether an error should be retried
pub trait RetryPolicy<E> {
    /// Decide whether `error` from the 0-based `attempt` should be retried
    fn should_retry(&self, error: &E, attempt: u32) -> RetryDecision;
}

/// Decision for whether to retry an operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry the operation with the configured backoff delay
    Retry,
    /// Retry the operation after a specific delay
    RetryAfter(Duration),
    /// Don't retry the operation
    Stop,
}

/// Backoff strategy for calculating retry delays
#[derive(Debug, Clone, PartialEq)]
pub enum BackoffStrategy {
    /// Fixed delay between retries
    Fixed(Duration),
    /// Exponential backoff: `initial_delay * base^attempt`, capped at
    /// `max_delay`
    Exponential { initial_delay: Duration, base: f64, max_delay: Duration },
}

impl BackoffStrategy {
    /// Doubling backoff starting at `initial_delay`.
    pub fn doubling(initial_delay: Duration, max_delay: Duration) -> Self {
        Self::Exponential { initial_delay, base: 2.0, max_delay }
    }

    /// Calculate the delay before the retry that follows the 0-based
    /// `attempt`
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        match self {
            Self::Fixed(delay) => *delay,
            Self::Exponential { initial_delay, base, max_delay } => {
                let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
                let delay = initial_delay.as_secs_f64() * base.powi(exponent);
                if !delay.is_finite() || delay >= max_delay.as_secs_f64() {
                    *max_delay
                } else {
                    Duration::from_secs_f64(delay.max(0.0))
                }
            }
        }
    }
}

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,
    /// Backoff strategy for calculating delays
    pub backoff: BackoffStrategy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffStrategy::doubling(
                Duration::from_millis(100),
                Duration::from_secs(30),
            ),
        }
    }
}

impl RetryConfig {
    /// Create a configuration builder
    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder::default()
    }

    /// Single attempt, no retries.
    pub fn no_retry() -> Self {
        Self { max_attempts: 1, backoff: BackoffStrategy::Fixed(Duration::ZERO) }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), RetryError<()>> {
        if self.max_attempts == 0 {
            return Err(RetryError::InvalidConfiguration {
                message: "max_attempts must be greater than 0".to_string(),
            });
        }

        if let BackoffStrategy::Exponential { base, .. } = &self.backoff {
            if *base <= 0.0 {
                return Err(RetryError::InvalidConfiguration {
                    message: "exponential base must be greater than 0".to_string(),
                });
            }
        }

        Ok(())
    }
}

/// Builder for RetryConfig with fluent API
#[derive(Debug, Default)]
pub struct RetryConfigBuilder {
    config: RetryConfig,
}

impl RetryConfigBuilder {
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.max_attempts = attempts;
        self
    }

    pub fn exponential_backoff(
        mut self,
        initial_delay: Duration,
        base: f64,
        max_delay: Duration,
    ) -> Self {
        self.config.backoff = BackoffStrategy::Exponential { initial_delay, base, max_delay };
        self
    }

    pub fn build(self) -> Result<RetryConfig, RetryError<()>> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// The main retry executor
#[derive(Debug, Clone)]
pub struct RetryExecutor<P> {
    config: RetryConfig,
    policy: P,
}

impl<P> RetryExecutor<P> {
    /// Create a new retry executor with the given configuration and policy
    pub fn new(config: RetryConfig, policy: P) -> Self {
        Self { config, policy }
    }

    /// The configuration this executor runs with.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Execute an operation with retry logic
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> RetryResult<T, E>
    where
        P: RetryPolicy<E>,
        E: fmt::Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.execute_with_outcome(operation).await.into_result()
    }

    /// Execute an operation with retry logic and return outcome statistics.
    ///
    /// The operation receives the 0-based attempt number.
    pub async fn execute_with_outcome<F, Fut, T, E>(&self, mut operation: F) -> RetryOutcome<T, E>
    where
        P: RetryPolicy<E>,
        E: fmt::Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut total_delay = Duration::ZERO;
        let mut attempt = 0;

        loop {
            let attempt_number = attempt + 1;
            debug!(attempt = attempt_number, max_attempts, "executing operation");

            let error = match operation(attempt).await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(retries = attempt, "operation succeeded after retries");
                    }
                    return RetryOutcome {
                        result: Ok(value),
                        attempts: attempt_number,
                        total_delay,
                    };
                }
                Err(error) => error,
            };

            let delay = match self.policy.should_retry(&error, attempt) {
                RetryDecision::Stop => {
                    debug!(attempt = attempt_number, %error, "retry policy declined to retry");
                    return RetryOutcome {
                        result: Err(RetryError::NonRetryable { attempts: attempt_number, error }),
                        attempts: attempt_number,
                        total_delay,
                    };
                }
                _ if attempt_number >= max_attempts => {
                    warn!(attempts = attempt_number, %error, "all retry attempts exhausted");
                    return RetryOutcome {
                        result: Err(RetryError::Exhausted { attempts: attempt_number, last: error }),
                        attempts: attempt_number,
                        total_delay,
                    };
                }
                RetryDecision::Retry => self.config.backoff.calculate_delay(attempt),
                RetryDecision::RetryAfter(custom) => custom,
            };

            warn!(attempt = attempt_number, delay_ms = delay.as_millis() as u64, %error, "operation failed, retrying");
            tokio::time::sleep(delay).await;
            total_delay += delay;
            attempt += 1;
        }
    }
}

/// Pre-defined retry policies for common scenarios
pub mod policies {
    use super::{RetryDecision, RetryPolicy};
    use crate::error::ErrorClassification;

    /// Predicate-based retry policy
    #[derive(Debug, Clone, Copy)]
    pub struct PredicateRetry<F> {
        predicate: F,
    }

    impl<F> PredicateRetry<F> {
        pub fn new(predicate: F) -> Self {
            Self { predicate }
        }
    }

    /// Retries errors that classify themselves as retryable, honoring any
    /// `retry_after` hint.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct Classified;

    impl<E: ErrorClassification> RetryPolicy<E> for Classified {
        fn should_retry(&self, error: &E, _attempt: u32) -> RetryDecision {
            if !error.is_retryable() {
                return RetryDecision::Stop;
            }
            error.retry_after().map_or(RetryDecision::Retry, RetryDecision::RetryAfter)
        }
    }

    impl<F, E> RetryPolicy<E> for PredicateRetry<F>
    where
        F: Fn(&E) -> bool,
    {
        fn should_retry(&self, error: &E, _attempt: u32) -> RetryDecision {
            if (self.predicate)(error) {
                RetryDecision::Retry
            } else {
                RetryDecision::Stop
            }
        }
    }
}
