//! # DomainError
//!
//! Centralized error handling for the forum service.
//! Adapters classify raw storage failures into these variants at their
//! boundary; callers above them only map kinds to wire shapes.

use std::time::Duration;
use thiserror::Error;

/// The primary error type for all domain operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed or missing input (e.g. empty text, unknown parent id)
    #[error("validation error: {0}")]
    Invalid(String),

    /// No row with that id
    #[error("{0} not found with ID {1}")]
    NotFound(&'static str, String),

    /// Uniqueness violation (e.g. duplicate board name)
    #[error("conflict: {0}")]
    Conflict(String),

    /// Transient storage or network failure; safe to retry
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// The caller cancelled the request
    #[error("operation cancelled")]
    Cancelled,

    /// The request deadline elapsed before the storage call completed
    #[error("deadline exceeded after {0:?}")]
    DeadlineExceeded(Duration),

    /// Anything else; surfaced for operator attention
    #[error("internal service error: {0}")]
    Internal(String),
}

/// Coarse classification of a [`DomainError`], stable across the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Invalid,
    NotFound,
    Conflict,
    Unavailable,
    Cancelled,
    DeadlineExceeded,
    Internal,
}

impl ErrorKind {
    /// Machine-readable code used in response bodies.
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::Invalid => "INVALID",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::Unavailable => "UNAVAILABLE",
            ErrorKind::Cancelled => "CANCELLED",
            ErrorKind::DeadlineExceeded => "DEADLINE_EXCEEDED",
            ErrorKind::Internal => "INTERNAL",
        }
    }
}

impl DomainError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::Invalid(_) => ErrorKind::Invalid,
            DomainError::NotFound(..) => ErrorKind::NotFound,
            DomainError::Conflict(_) => ErrorKind::Conflict,
            DomainError::Unavailable(_) => ErrorKind::Unavailable,
            DomainError::Cancelled => ErrorKind::Cancelled,
            DomainError::DeadlineExceeded(_) => ErrorKind::DeadlineExceeded,
            DomainError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Only transient storage failures are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DomainError::Unavailable(_))
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        DomainError::Invalid(msg.into())
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        DomainError::NotFound(entity, id.to_string())
    }
}

/// A specialized Result type for domain logic.
pub type Result<T> = std::result::Result<T, DomainError>;
