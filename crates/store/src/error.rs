//! Store error model.
//!
//! Storage failures split into deterministic rejections (bad input, conflicts
//! with the idempotency protocol) and transient backend faults. The activity
//! layer consumes this split to decide what is retryable; the store itself
//! never retries.

use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// No such row. Distinct and non-fatal on read paths.
    #[error("bill not found")]
    NotFound,

    /// A close retried with the request id that already completed. The
    /// persisted artifact is unchanged; callers treat this as success.
    #[error("duplicate close request")]
    DuplicateRequest,

    /// A close arrived for a bill already closed under a different request id.
    #[error("bill already closed by a different request")]
    AlreadyClosed,

    /// The backend rejected user-controlled input (e.g. unique-constraint
    /// violation on user-supplied columns).
    #[error("rejected input: {0}")]
    UserInput(String),

    /// Structurally invalid activity arguments (e.g. nil request id).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A persisted row could not be decoded into domain types.
    #[error("corrupt row: {0}")]
    Decode(String),

    /// Backend fault (connection, transaction, constraint outside the cases
    /// above). Candidates for retry.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Backend unreachable or otherwise transiently failing.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}
