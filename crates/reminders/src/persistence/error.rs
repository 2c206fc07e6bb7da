//! Persistence error types.

use std::fmt;

use thiserror::Error;

use crate::error::Error;

/// Errors raised by the SurrealDB store.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Failed to connect to the database
    #[error("connection failed: {reason}")]
    ConnectionFailed { reason: String },

    /// Query execution failed
    #[error("query failed: {reason}")]
    QueryFailed { reason: String },

    /// Stored record could not be decoded
    #[error("serialization error: {reason}")]
    SerializationError { reason: String },

    /// Operation timed out
    #[error("operation timed out")]
    Timeout,
}

impl PersistenceError {
    pub fn connection_failed(reason: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            reason: reason.into(),
        }
    }

    pub fn query_failed(reason: impl Into<String>) -> Self {
        Self::QueryFailed {
            reason: reason.into(),
        }
    }

    pub fn serialization_error(reason: impl Into<String>) -> Self {
        Self::SerializationError {
            reason: reason.into(),
        }
    }

    /// Check if error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::ConnectionFailed { .. } | Self::Timeout)
    }
}

/// Result type for persistence operations.
pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Classify a SurrealDB error by its message.
pub fn from_surrealdb_error(err: impl fmt::Display) -> PersistenceError {
    let msg = err.to_string();

    if msg.contains("timeout") || msg.contains("Timeout") {
        PersistenceError::Timeout
    } else if msg.contains("connection") || msg.contains("Connection") || msg.contains("connect") {
        PersistenceError::connection_failed(msg)
    } else {
        PersistenceError::query_failed(msg)
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization_error(err.to_string())
    }
}

/// Attach the failed operation's name when leaving the persistence layer.
pub(crate) fn storage_error(operation: &'static str) -> impl FnOnce(PersistenceError) -> Error {
    move |err| Error::storage_failed(operation, err.to_string())
}
