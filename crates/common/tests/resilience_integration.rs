//! Integration tests for the resilience module
//!
//! Runs the retry executor under a paused tokio clock so backoff delays are
//! observable without real sleeping.

#![cfg(feature = "runtime")]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tiercache_common::resilience::policies::PredicateRetry;
use tiercache_common::resilience::{BackoffStrategy, RetryConfig, RetryError, RetryExecutor};

#[derive(Debug, Clone, PartialEq)]
enum Failure {
    Transient,
    Permanent,
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Verifies backoff delays double between attempts.
///
/// # Test Steps
/// 1. Configure 3 attempts with a 1s doubling backoff
/// 2. Fail every attempt with a transient error
/// 3. Verify 1s + 2s of paused time elapsed and the last error is returned
#[tokio::test(start_paused = true)]
async fn test_doubling_backoff_between_attempts() {
    let config = RetryConfig {
        max_attempts: 3,
        backoff: BackoffStrategy::doubling(Duration::from_secs(1), Duration::from_secs(30)),
    };
    let executor = RetryExecutor::new(config, PredicateRetry::new(|e: &Failure| *e == Failure::Transient));
    let started = tokio::time::Instant::now();

    let outcome = executor
        .execute_with_outcome(|_| async { Err::<(), _>(Failure::Transient) })
        .await;

    assert_eq!(outcome.attempts, 3);
    assert_eq!(outcome.total_delay, Duration::from_secs(3));
    assert!(started.elapsed() >= Duration::from_secs(3));
    assert!(matches!(
        outcome.result,
        Err(RetryError::Exhausted { attempts: 3, last: Failure::Transient })
    ));
}

/// Verifies a permanent error stops the loop immediately.
#[tokio::test(start_paused = true)]
async fn test_permanent_error_is_not_retried() {
    let calls = Arc::new(AtomicU32::new(0));
    let executor = RetryExecutor::new(
        RetryConfig::default(),
        PredicateRetry::new(|e: &Failure| *e == Failure::Transient),
    );

    let result = executor
        .execute(|attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 0 {
                    Err::<(), _>(Failure::Permanent)
                } else {
                    Ok(())
                }
            }
        })
        .await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(matches!(result, Err(RetryError::NonRetryable { attempts: 1, .. })));
}
