//! Domain error types.

use store::{CounterError, StoreError};
use thiserror::Error;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// A referenced record does not exist.
    #[error("{0}")]
    NotFound(String),

    /// A business rule rejected the operation.
    #[error("{0}")]
    Conflict(String),

    /// The request itself is malformed.
    #[error("{0}")]
    Invalid(String),

    /// An error occurred in the durable store.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// An error occurred in the availability counter store.
    #[error("Counter error: {0}")]
    Counter(#[from] CounterError),
}

/// Coarse classification of a [`DomainError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Invalid,
    Unexpected,
}

impl DomainError {
    pub fn not_found(message: impl Into<String>) -> Self {
        DomainError::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        DomainError::Conflict(message.into())
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        DomainError::Invalid(message.into())
    }

    /// Classifies the error.
    ///
    /// A lost optimistic update and a duplicate key are conflicts; every
    /// other store or counter failure is unexpected.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::NotFound(_) => ErrorKind::NotFound,
            DomainError::Conflict(_) => ErrorKind::Conflict,
            DomainError::Invalid(_) => ErrorKind::Invalid,
            DomainError::Store(StoreError::ConcurrencyConflict { .. })
            | DomainError::Store(StoreError::UniqueViolation(_)) => ErrorKind::Conflict,
            DomainError::Store(_) | DomainError::Counter(_) => ErrorKind::Unexpected,
        }
    }
}

/// Result type for domain operations.
pub type Result<T> = std::result::Result<T, DomainError>;
