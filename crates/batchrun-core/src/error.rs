//! Error types for batchrun.

use thiserror::Error;

/// Result type alias using batchrun's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for batchrun operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Store read or write failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Unit of work failed inside an executor
    #[error("Execution error: {0}")]
    Execution(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_not_found() {
        let err = Error::NotFound("task 42".to_string());
        assert_eq!(err.to_string(), "Not found: task 42");
    }

    #[test]
    fn test_error_display_execution() {
        let err = Error::Execution("mailer unreachable".to_string());
        assert_eq!(err.to_string(), "Execution error: mailer unreachable");
    }

    #[test]
    fn test_error_display_config() {
        let err = Error::Config("no executor registered".to_string());
        assert_eq!(err.to_string(), "Configuration error: no executor registered");
    }

    #[test]
    fn test_error_display_internal() {
        let err = Error::Internal("lock poisoned".to_string());
        assert_eq!(err.to_string(), "Internal error: lock poisoned");
    }

    #[test]
    fn test_error_display_database() {
        let err = Error::Database(sqlx::Error::RowNotFound);
        assert!(err.to_string().starts_with("Database error:"));
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number");
        assert!(json_err.is_err());

        let err: Error = json_err.unwrap_err().into();
        match err {
            Error::Serialization(msg) => {
                assert!(!msg.is_empty());
            }
            _ => panic!("Expected Serialization error"),
        }
    }

    #[test]
    fn test_from_sqlx_error() {
        let err: Error = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, Error::Database(sqlx::Error::PoolTimedOut)));
    }
}
