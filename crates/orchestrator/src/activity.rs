//! Activity execution: side-effecting store operations wrapped with a
//! start-to-close timeout, an exponential retry policy, and error
//! classification.
//!
//! This is the sole place where low-level storage errors are mapped into the
//! orchestrator's error taxonomy. Deterministic rejections are surfaced
//! immediately; everything else is retried to exhaustion.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use billfold_store::StoreError;

/// Exponential backoff policy for retryable activity failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub initial_interval: Duration,
    pub backoff_coefficient: f64,
    pub max_interval: Duration,
    /// `None` retries without bound; the orchestrator has no wall-clock
    /// deadline of its own.
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(1),
            backoff_coefficient: 2.0,
            max_interval: Duration::from_secs(60),
            max_attempts: None,
        }
    }
}

/// Per-activity execution options.
#[derive(Debug, Clone)]
pub struct ActivityOptions {
    pub start_to_close_timeout: Duration,
    pub retry: RetryPolicy,
}

/// Options for the boot-time open-bill insert.
pub fn open_bill_options() -> ActivityOptions {
    ActivityOptions {
        start_to_close_timeout: Duration::from_secs(5),
        retry: RetryPolicy::default(),
    }
}

/// Options for the close write: 1 min per attempt, at most 5 attempts.
pub fn close_bill_options() -> ActivityOptions {
    ActivityOptions {
        start_to_close_timeout: Duration::from_secs(60),
        retry: RetryPolicy {
            initial_interval: Duration::from_secs(2),
            backoff_coefficient: 2.0,
            max_interval: Duration::from_secs(60),
            max_attempts: Some(5),
        },
    }
}

/// Terminal outcome of an activity, after the retry policy has run.
#[derive(Debug, Error)]
pub enum ActivityError {
    /// Storage rejected user-controlled input. Never retried.
    #[error("rejected input: {0}")]
    UserInput(String),

    /// Structurally invalid activity arguments. Never retried.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The bill was closed under a different request id. Never retried.
    #[error("bill already closed by a different request")]
    BillAlreadyClosed,

    /// Replay of a request that already completed. Never retried; callers
    /// treat this as success.
    #[error("duplicate request")]
    DuplicateRequest,

    /// Retryable failures survived the policy.
    #[error("{activity} failed after {attempts} attempt(s): {last}")]
    Exhausted {
        activity: &'static str,
        attempts: u32,
        last: String,
    },
}

enum AttemptOutcome {
    NonRetryable(ActivityError),
    Retryable(String),
}

fn classify(err: StoreError) -> AttemptOutcome {
    match err {
        StoreError::UserInput(msg) => AttemptOutcome::NonRetryable(ActivityError::UserInput(msg)),
        StoreError::InvalidRequest(msg) => {
            AttemptOutcome::NonRetryable(ActivityError::InvalidRequest(msg))
        }
        StoreError::AlreadyClosed => AttemptOutcome::NonRetryable(ActivityError::BillAlreadyClosed),
        StoreError::DuplicateRequest => {
            AttemptOutcome::NonRetryable(ActivityError::DuplicateRequest)
        }
        other => AttemptOutcome::Retryable(other.to_string()),
    }
}

/// Run `op` under `options`, retrying retryable failures with exponential
/// backoff. Each attempt is bounded by the start-to-close timeout; a timed
/// out attempt counts as retryable.
pub async fn execute<T, F, Fut>(
    options: &ActivityOptions,
    activity: &'static str,
    mut op: F,
) -> Result<T, ActivityError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut interval = options.retry.initial_interval;
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        let outcome = match timeout(options.start_to_close_timeout, op()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(err)) => classify(err),
            Err(_) => AttemptOutcome::Retryable(format!(
                "start-to-close timeout after {:?}",
                options.start_to_close_timeout
            )),
        };

        match outcome {
            AttemptOutcome::NonRetryable(err) => {
                debug!(activity, attempt, error = %err, "activity failed with non-retryable error");
                return Err(err);
            }
            AttemptOutcome::Retryable(last) => {
                if let Some(max) = options.retry.max_attempts {
                    if attempt >= max {
                        warn!(activity, attempts = attempt, error = %last, "activity retries exhausted");
                        return Err(ActivityError::Exhausted {
                            activity,
                            attempts: attempt,
                            last,
                        });
                    }
                }
                warn!(activity, attempt, error = %last, "activity failed, retrying");
                sleep(interval).await;
                interval = interval
                    .mul_f64(options.retry.backoff_coefficient)
                    .min(options.retry.max_interval);
            }
        }
    }
}
