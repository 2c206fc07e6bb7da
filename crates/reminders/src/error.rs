//! Error types for the reminders crate.

use std::fmt;

/// Result type alias for reminder operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Reminder workflow error types.
///
/// Run aborts (missing subscription, inactive, renewal passed) are outcomes,
/// not errors; see [`crate::types::AbortReason`].
#[derive(Debug, Clone)]
pub enum Error {
    /// Domain error from the core crate (bad frequency, date overflow, ...).
    Core(subtrack_core::Error),
    /// Storage operation failed.
    StorageFailed {
        operation: String,
        reason: String,
    },
    /// Serialization error.
    Serialization {
        reason: String,
    },
    /// The notifier rejected a reminder.
    NotifierFailed {
        label: String,
        reason: String,
    },
    /// The trigger substrate refused or failed the request.
    TriggerFailed {
        reason: String,
    },
    /// No trigger substrate is configured.
    TriggerNotConfigured,
    /// Invalid configuration.
    Config {
        reason: String,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Core(err) => write!(f, "{err}"),
            Self::StorageFailed { operation, reason } => {
                write!(f, "storage operation '{operation}' failed: {reason}")
            }
            Self::Serialization { reason } => write!(f, "serialization error: {reason}"),
            Self::NotifierFailed { label, reason } => {
                write!(f, "notifier failed for '{label}': {reason}")
            }
            Self::TriggerFailed { reason } => write!(f, "workflow trigger failed: {reason}"),
            Self::TriggerNotConfigured => write!(f, "reminder workflow is not configured"),
            Self::Config { reason } => write!(f, "configuration error: {reason}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Core(err) => Some(err),
            _ => None,
        }
    }
}

impl Error {
    /// Create a storage failed error.
    pub fn storage_failed(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StorageFailed {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create a serialization error.
    pub fn serialization(reason: impl Into<String>) -> Self {
        Self::Serialization {
            reason: reason.into(),
        }
    }

    /// Create a notifier failed error.
    pub fn notifier_failed(label: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::NotifierFailed {
            label: label.into(),
            reason: reason.into(),
        }
    }

    /// Create a trigger failed error.
    pub fn trigger_failed(reason: impl Into<String>) -> Self {
        Self::TriggerFailed {
            reason: reason.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// Whether retrying the same operation later may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::StorageFailed { .. } | Self::TriggerFailed { .. }
        )
    }
}

impl From<subtrack_core::Error> for Error {
    fn from(err: subtrack_core::Error) -> Self {
        Self::Core(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

impl From<bincode::error::EncodeError> for Error {
    fn from(err: bincode::error::EncodeError) -> Self {
        Self::serialization(err.to_string())
    }
}
