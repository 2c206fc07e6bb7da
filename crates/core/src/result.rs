//! Result type definition and extension traits.
//!
//! Provides combinators for degrading a failed side operation into a log line
//! instead of an error, without unwrap/expect/panic.

use std::fmt::Display;

use crate::error::Error;

/// The standard Result type for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait for Results whose failure must not reach the caller.
///
/// Used where a secondary concern (scheduling a reminder, recording a
/// journal line) may fail without failing the primary operation.
pub trait ResultExt<T> {
    /// Convert to an Option, logging the error under `context` if present.
    fn into_option_logged(self, context: &str) -> Option<T>;

    /// Get the value or `default`, logging the error under `context`.
    fn or_default_logged(self, context: &str, default: T) -> T;
}

impl<T, E: Display> ResultExt<T> for std::result::Result<T, E> {
    fn into_option_logged(self, context: &str) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!(error = %e, "{context}");
                None
            }
        }
    }

    fn or_default_logged(self, context: &str, default: T) -> T {
        match self {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(error = %e, "{context}, using default");
                default
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_into_option_ok() {
        let result: Result<i32> = Ok(42);
        assert_eq!(result.into_option_logged("lookup"), Some(42));
    }

    #[test]
    fn test_result_into_option_err() {
        let result: Result<i32> = Err(Error::invalid_record("test"));
        assert_eq!(result.into_option_logged("lookup"), None);
    }

    #[test]
    fn test_or_default_logged_err() {
        let result: std::result::Result<i32, String> = Err("boom".to_string());
        assert_eq!(result.or_default_logged("parse", 99), 99);
    }
}
