//! Core error types for SubTrack operations.
//!
//! All errors are explicit, typed, and recoverable - no panics allowed.

use thiserror::Error;

/// Core error type for subscription and renewal operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    // Renewal arithmetic
    #[error("invalid frequency '{value}': expected one of daily, weekly, monthly, yearly")]
    InvalidFrequency { value: String },

    #[error("date out of range: {reason}")]
    DateOutOfRange { reason: String },

    // Validation
    #[error("validation failed: {}", .messages.join(", "))]
    Validation { messages: Vec<String> },

    #[error("invalid {field} '{value}'")]
    InvalidEnum { field: &'static str, value: String },

    // Parsing errors
    #[error("JSON parse error: {reason}")]
    JsonParseFailed { reason: String },

    // Generic errors
    #[error("invalid record: {reason}")]
    InvalidRecord { reason: String },
}

impl Error {
    /// Create an invalid frequency error.
    pub fn invalid_frequency(value: impl Into<String>) -> Self {
        Self::InvalidFrequency {
            value: value.into(),
        }
    }

    /// Create a date out of range error.
    pub fn date_out_of_range(reason: impl Into<String>) -> Self {
        Self::DateOutOfRange {
            reason: reason.into(),
        }
    }

    /// Create a validation error from one or more messages.
    pub fn validation<I, S>(messages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Validation {
            messages: messages.into_iter().map(Into::into).collect(),
        }
    }

    /// Create an invalid enum value error.
    pub fn invalid_enum(field: &'static str, value: impl Into<String>) -> Self {
        Self::InvalidEnum {
            field,
            value: value.into(),
        }
    }

    /// Create a JSON parse error.
    pub fn json_parse_failed(reason: impl Into<String>) -> Self {
        Self::JsonParseFailed {
            reason: reason.into(),
        }
    }

    /// Create an invalid record error.
    pub fn invalid_record(reason: impl Into<String>) -> Self {
        Self::InvalidRecord {
            reason: reason.into(),
        }
    }

    /// Whether the caller supplied bad input (as opposed to a record that
    /// could not be decoded).
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidFrequency { .. }
                | Self::DateOutOfRange { .. }
                | Self::Validation { .. }
                | Self::InvalidEnum { .. }
                | Self::JsonParseFailed { .. }
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::json_parse_failed(err.to_string())
    }
}
