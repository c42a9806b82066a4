//! Error types for the GNX record store.
//!
//! All public APIs return `GnxResult<T>` — no panics in library code.

use thiserror::Error;

/// Unified error type for all GNX operations.
#[derive(Debug, Error)]
pub enum GnxError {
    /// Schema lifecycle error (exists / missing / corrupt catalog)
    #[error("schema error: {0}")]
    Schema(String),

    /// Requested model is not part of the opened schema
    #[error("model '{0}' not found")]
    ModelNotFound(String),

    /// Requested record does not exist (never written, deleted or out of range)
    #[error("record {id} not found in model '{model}'")]
    RecordNotFound { model: String, id: i64 },

    /// Invalid declaration or request (undeclared field, wrong operator, ...)
    #[error("validation error: {0}")]
    Validation(String),

    /// Value does not fit the codec of its field
    #[error("type mismatch on '{field}': expected {expected}, got {actual}")]
    TypeMismatch {
        field: String,
        expected: String,
        actual: String,
    },

    /// On-disk data does not match the catalog layout
    #[error("corrupted data: {0}")]
    Corrupted(String),

    /// Standard I/O error
    #[error("io error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// sled index tree error
    #[error("index error: {source}")]
    Index {
        #[from]
        source: sled::Error,
    },

    /// Invalid REGEX / IREGEX pattern
    #[error("invalid pattern: {source}")]
    InvalidPattern {
        #[from]
        source: regex::Error,
    },

    /// CSV export error
    #[error("csv error: {source}")]
    Csv {
        #[from]
        source: csv::Error,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Invalid arguments
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
}

/// Result type alias for all GNX operations.
pub type GnxResult<T> = Result<T, GnxError>;

impl From<serde_json::Error> for GnxError {
    fn from(err: serde_json::Error) -> Self {
        GnxError::Serialization(err.to_string())
    }
}

impl GnxError {
    /// `RecordNotFound` 생성 헬퍼
    pub(crate) fn not_found(model: &str, id: i64) -> Self {
        GnxError::RecordNotFound {
            model: model.to_string(),
            id,
        }
    }

    /// `TypeMismatch` 생성 헬퍼
    pub(crate) fn mismatch(field: &str, expected: impl Into<String>, actual: impl Into<String>) -> Self {
        GnxError::TypeMismatch {
            field: field.to_string(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_schema() {
        let err = GnxError::Schema("schema 'users' already exists".to_string());
        assert_eq!(err.to_string(), "schema error: schema 'users' already exists");
    }

    #[test]
    fn error_display_record_not_found() {
        let err = GnxError::not_found("User", 3);
        assert_eq!(err.to_string(), "record 3 not found in model 'User'");
    }

    #[test]
    fn error_display_type_mismatch() {
        let err = GnxError::mismatch("age", "INT", "STRING");
        assert_eq!(
            err.to_string(),
            "type mismatch on 'age': expected INT, got STRING"
        );
    }

    #[test]
    fn error_from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: GnxError = io.into();
        assert!(err.to_string().starts_with("io error"));
    }

    #[test]
    fn gnx_result_err() {
        let result: GnxResult<i32> = Err(GnxError::ModelNotFound("Task".to_string()));
        assert!(result.is_err());
    }
}
