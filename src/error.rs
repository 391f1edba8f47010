//! Error types for the field-mapping layer.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for mapping and execution operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error surfaced by a database driver.
pub type DriverError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error type for mapping, conversion and execution operations.
#[derive(Error, Debug)]
pub enum Error {
    /// The query matched no rows.
    #[error("no rows in result set")]
    NoRows,

    /// The scan destination does not match the prepared record.
    #[error("Invalid destination: {message}")]
    InvalidDestination { message: String },

    /// A value could not be converted to or from the declared field kind.
    #[error("Type mismatch in column {column}: expected {expected}, got {actual}")]
    TypeMismatch {
        column: String,
        expected: String,
        actual: String,
    },

    /// A composite field could not be serialized. Fatal for the whole prepare call.
    #[error("Failed to encode column {column}: {source}")]
    Encode {
        column: String,
        #[source]
        source: serde_json::Error,
    },

    /// A payload could not be decoded into its field.
    #[error("Failed to decode column {column}: {message}")]
    Decode { column: String, message: String },

    /// Result row width does not match the prepared column list.
    #[error("Row has {actual} columns, prepared column list has {expected}")]
    ColumnCount { expected: usize, actual: usize },

    /// Unknown datetime unit token.
    #[error("Invalid datetime unit: {token}")]
    InvalidDateTimeUnit { token: String },

    /// Integer timestamp cannot be represented as a datetime.
    #[error("Timestamp {value}{unit} is out of range")]
    TimestampOutOfRange { value: i64, unit: String },

    /// A transaction is already active on this session.
    #[error("Transaction already active")]
    TransactionActive,

    /// The execution context was cancelled.
    #[error("Operation cancelled")]
    Cancelled,

    /// The execution context deadline elapsed.
    #[error("Operation timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    /// Error returned by the underlying driver, passed through unchanged.
    #[error(transparent)]
    Driver(DriverError),
}

impl Error {
    /// Wrap a driver error.
    pub fn driver(err: impl Into<DriverError>) -> Self {
        Self::Driver(err.into())
    }

    /// Create a type mismatch error.
    pub fn type_mismatch(
        column: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::TypeMismatch {
            column: column.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create an invalid destination error.
    pub fn invalid_destination(message: impl Into<String>) -> Self {
        Self::InvalidDestination {
            message: message.into(),
        }
    }

    /// Create a decode error.
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Check whether this is the "no rows" condition.
    pub fn is_no_rows(&self) -> bool {
        matches!(self, Error::NoRows)
    }
}
