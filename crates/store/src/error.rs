use thiserror::Error;

use crate::{BookingId, Version};

/// Errors that can occur when interacting with the durable store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An optimistic version check failed when updating a booking.
    #[error(
        "Concurrency conflict for booking {booking_id}: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        booking_id: BookingId,
        expected: Version,
        actual: Version,
    },

    /// A row lock could not be acquired within the configured timeout.
    #[error("Timed out waiting for lock on {0}")]
    LockTimeout(String),

    /// A uniqueness constraint was violated.
    #[error("Duplicate value: {0}")]
    UniqueViolation(String),

    /// An update targeted a row that does not exist.
    #[error("Row not found: {0}")]
    RowNotFound(String),

    /// A stored value could not be decoded into its record type.
    #[error("Decode error: {0}")]
    Decode(String),

    /// A fault injected by the in-memory store.
    #[error("Injected failure: {0}")]
    Injected(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Result type for durable store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors raised by the availability counter store.
#[derive(Debug, Error)]
pub enum CounterError {
    /// The Redis backend failed.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// The counter backend is unreachable.
    #[error("Counter store unavailable: {0}")]
    Unavailable(String),
}

/// Result type for availability counter operations.
pub type CounterResult<T> = std::result::Result<T, CounterError>;
