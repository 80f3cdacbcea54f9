//! Error types for EduHub
//!
//! One taxonomy for both store backends. Driver errors carrying server
//! codes are mapped onto the same variants the embedded engine raises, so
//! callers can match on `ValidationFailure` or `DuplicateKey` regardless of
//! where the document lives.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for EduHub operations
#[derive(Debug, Error)]
pub enum Error {
    // ==========================================================================
    // Write rejections
    // ==========================================================================
    #[error("Document failed validation in collection '{collection}': {message}")]
    ValidationFailure { collection: String, message: String },

    #[error("Duplicate key in collection '{collection}': {key}")]
    DuplicateKey { collection: String, key: String },

    // ==========================================================================
    // Lookups
    // ==========================================================================
    #[error("No document '{id}' in collection '{collection}'")]
    NotFound { collection: String, id: String },

    #[error("Collection '{name}' already exists")]
    CollectionExists { name: String },

    // ==========================================================================
    // Caller input
    // ==========================================================================
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Invalid {kind} '{value}': {reason}")]
    InvalidIdentifier {
        kind: &'static str,
        value: String,
        reason: &'static str,
    },

    // ==========================================================================
    // Query errors
    // ==========================================================================
    #[error("Query error: {message}")]
    Query { message: String },

    // ==========================================================================
    // Backend errors
    // ==========================================================================
    #[error("Driver error: {message}")]
    Driver { message: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for EduHub operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn not_found(collection: &str, id: impl Into<String>) -> Self {
        Error::NotFound {
            collection: collection.to_string(),
            id: id.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Error::InvalidInput {
            message: message.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

// =============================================================================
// Conversions from external error types
// =============================================================================

impl From<docql::QueryError> for Error {
    fn from(err: docql::QueryError) -> Self {
        Error::Query {
            message: err.to_string(),
        }
    }
}

impl From<bson::ser::Error> for Error {
    fn from(err: bson::ser::Error) -> Self {
        Error::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<bson::de::Error> for Error {
    fn from(err: bson::de::Error) -> Self {
        Error::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<crate::validation::ValidationError> for Error {
    fn from(err: crate::validation::ValidationError) -> Self {
        use crate::validation::ValidationError;
        match err {
            ValidationError::InvalidName(kind, value, reason) => Error::InvalidIdentifier {
                kind,
                value,
                reason,
            },
            ValidationError::TooLong(kind, value, _max) => Error::InvalidIdentifier {
                kind,
                value,
                reason: "exceeds maximum length",
            },
            ValidationError::Empty(kind) => Error::InvalidIdentifier {
                kind,
                value: String::new(),
                reason: "cannot be empty",
            },
        }
    }
}

impl Error {
    /// Map a server-reported code onto the taxonomy
    ///
    /// Anything the server rejected that is not a validation, duplicate key
    /// or existing collection error is a query error; connection and
    /// server-selection failures never carry a code and stay `Driver`.
    pub fn from_server_code(code: i32, message: String) -> Self {
        match code {
            121 => Error::ValidationFailure {
                collection: String::new(),
                message,
            },
            11000 | 11001 => Error::DuplicateKey {
                collection: String::new(),
                key: message,
            },
            48 => Error::CollectionExists { name: message },
            _ => Error::Query {
                message: format!("server error {}: {}", code, message),
            },
        }
    }
}

#[cfg(feature = "mongodb")]
impl From<mongodb::error::Error> for Error {
    fn from(err: mongodb::error::Error) -> Self {
        use mongodb::error::{ErrorKind, WriteFailure};

        let server_error = match err.kind.as_ref() {
            ErrorKind::Write(WriteFailure::WriteError(e)) => Some((e.code, e.message.clone())),
            ErrorKind::BulkWrite(bulk) => bulk
                .write_errors
                .as_ref()
                .and_then(|errors| errors.first())
                .map(|e| (e.code, e.message.clone())),
            ErrorKind::Command(e) => Some((e.code, e.message.clone())),
            _ => None,
        };

        match server_error {
            Some((code, message)) => Error::from_server_code(code, message),
            None => Error::Driver {
                message: err.to_string(),
            },
        }
    }
}

// =============================================================================
// Error Display Helpers
// =============================================================================

impl Error {
    /// Fill in the collection on errors raised below the catalog
    pub fn in_collection(self, name: &str) -> Self {
        match self {
            Error::ValidationFailure { collection, message } if collection.is_empty() => {
                Error::ValidationFailure {
                    collection: name.to_string(),
                    message,
                }
            }
            Error::DuplicateKey { collection, key } if collection.is_empty() => {
                Error::DuplicateKey {
                    collection: name.to_string(),
                    key,
                }
            }
            other => other,
        }
    }

    /// Returns a user-friendly suggestion for fixing the error
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Error::ValidationFailure { .. } => {
                Some("Check required fields, types and enum values against the collection schema")
            }
            Error::DuplicateKey { .. } => Some("Use a different value for the unique field"),
            Error::NotFound { .. } => Some("Check the document id and collection name"),
            Error::InvalidIdentifier { .. } => {
                Some("Collection names must be non-empty and cannot contain '$' or start with 'system.'")
            }
            Error::Driver { .. } => Some("Check that the server is reachable at the configured URI"),
            _ => None,
        }
    }

    /// Returns true if the demo can continue after this error
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::ValidationFailure { .. }
                | Error::DuplicateKey { .. }
                | Error::NotFound { .. }
                | Error::InvalidInput { .. }
                | Error::InvalidIdentifier { .. }
                | Error::Query { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::not_found("users", "u-1");
        assert_eq!(err.to_string(), "No document 'u-1' in collection 'users'");
    }

    #[test]
    fn test_error_suggestion() {
        let err = Error::DuplicateKey {
            collection: "users".to_string(),
            key: "email_1".to_string(),
        };
        assert!(err.suggestion().is_some());
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_server_codes_map_to_taxonomy() {
        assert!(matches!(
            Error::from_server_code(121, "failed".into()),
            Error::ValidationFailure { .. }
        ));
        assert!(matches!(
            Error::from_server_code(11000, "email_1 dup".into()),
            Error::DuplicateKey { .. }
        ));
        assert!(matches!(
            Error::from_server_code(48, "users".into()),
            Error::CollectionExists { .. }
        ));

        // $limit 0, missing text index, index options conflict
        for code in [15958, 27, 85] {
            let err = Error::from_server_code(code, "rejected".into());
            assert!(matches!(err, Error::Query { .. }), "code {} gave {:?}", code, err);
            assert!(err.is_recoverable());
        }
    }

    #[test]
    fn test_in_collection_fills_blank_only() {
        let err = Error::ValidationFailure {
            collection: String::new(),
            message: "bad".to_string(),
        }
        .in_collection("courses");
        assert!(matches!(err, Error::ValidationFailure { ref collection, .. } if collection == "courses"));

        let err = Error::DuplicateKey {
            collection: "users".to_string(),
            key: "k".to_string(),
        }
        .in_collection("courses");
        assert!(matches!(err, Error::DuplicateKey { ref collection, .. } if collection == "users"));
    }

    #[test]
    fn test_query_error_conversion() {
        let err: Error = docql::QueryError::new("unknown operator: $foo").at("price").into();
        assert!(err.to_string().contains("$foo"));
        assert!(err.is_recoverable());
    }
}
