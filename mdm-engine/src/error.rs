//! Error types for the request orchestration engine

use thiserror::Error;

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Comprehensive error types for the orchestration engine
#[derive(Error, Debug)]
pub enum EngineError {
    /// Lock could not be acquired within the caller's wait budget
    #[error("Lock acquisition timed out for key {0}")]
    LockTimeout(String),

    /// Lock record is gone or owned by another holder
    #[error("Lock on {key} is not held by {holder}")]
    LockNotHeld { key: String, holder: String },

    /// Table is not known to the backing store
    #[error("Table {0} not found")]
    TableNotFound(String),

    /// Row index is out of range or the row was removed
    #[error("Row {row} not found in table {table}")]
    RowNotFound { table: String, row: usize },

    /// Column is not part of the table vocabulary
    #[error("Column {column} not found in table {table}")]
    ColumnNotFound { table: String, column: String },

    /// Request is not present where it was expected
    #[error("Request {0} not found")]
    RequestNotFound(String),

    /// Row was reindexed between scheduling and handling
    #[error("Request number mismatch: scheduled {scheduled}, row carries {actual}")]
    RequestNumberMismatch { scheduled: String, actual: String },

    /// Invalid state transition on a request row
    #[error("Invalid status transition from {from} to {to}")]
    InvalidStatusTransition { from: String, to: String },

    /// A wire value failed to parse into its enum
    #[error("Invalid {what} value: {value}")]
    InvalidValue { what: &'static str, value: String },

    /// Attachment operation failed
    #[error("Attachment error: {0}")]
    Attachment(String),

    /// Notification channel failure
    #[error("Notification error: {0}")]
    Notification(String),

    /// Validation error at a user-facing boundary
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration relation is missing or malformed
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Backing store failure
    #[error("Store error: {0}")]
    Store(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Whether the error is transient and the operation may be retried
    /// by a later sweep without operator intervention.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EngineError::LockTimeout(_) | EngineError::Store(_) | EngineError::Notification(_)
        )
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Store(err.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Internal(format!("serialization error: {}", err))
    }
}
