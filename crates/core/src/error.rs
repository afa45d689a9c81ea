//! Domain error model.
//!
//! Errors in this module represent **business logic failures** - validation
//! errors, invariant violations, conflicts. They are deterministic: the same
//! input always produces the same error. Infrastructure failures (network,
//! database) live in the store and orchestrator layers.
//!
//! Domain errors are `Clone` and `PartialEq` so handlers can propagate them
//! across task boundaries and tests can compare them directly.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error (business logic failures).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input, unknown currency).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated (e.g. mutating a non-open bill).
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested resource was not found (domain-level).
    #[error("not found")]
    NotFound,

    /// A conflict with existing state (e.g. re-adding an item at a new price).
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }
}
