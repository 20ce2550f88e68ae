//! Error types for the ORM runtime
//!
//! Every failure the runtime can report is an [`OrmError`]. Errors produced by
//! observer hooks and by drivers are carried through unchanged so callers can
//! tell a hook-originated abort apart from a backend failure.

use crate::event_error::EventError;

/// Result type alias for ORM operations
pub type OrmResult<T> = Result<T, OrmError>;

/// Error types for ORM operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum OrmError {
    /// Invalid or inconsistent configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A connection name that was never configured
    #[error("Configuration error: database connection '{0}' is not configured")]
    UnknownConnection(String),

    /// An observer hook aborted the operation
    #[error(transparent)]
    Hook(#[from] EventError),

    /// Driver-level failure (constraint violation, bad statement, ...)
    #[error("Database error: {0}")]
    Database(String),

    /// The backend could not be reached or the connection is closed
    #[error("Connection error: {0}")]
    Connection(String),

    /// No row matched the requested key
    #[error("Record not found in table '{table}' with key {key}")]
    NotFound { table: String, key: String },

    /// Primary key is missing or invalid
    #[error("Primary key is missing or invalid")]
    MissingPrimaryKey,

    /// Attribute map could not be converted to or from a model
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Begin, commit or rollback failed, or the transaction is already finished
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// The operation's context was cancelled
    #[error("Operation cancelled")]
    Cancelled,

    /// The operation's context deadline passed
    #[error("Context deadline exceeded")]
    DeadlineExceeded,
}

impl OrmError {
    pub fn not_found(table: &str, key: impl ToString) -> Self {
        OrmError::NotFound {
            table: table.to_string(),
            key: key.to_string(),
        }
    }

    /// True when an observer hook produced this error
    pub fn is_hook_error(&self) -> bool {
        matches!(self, OrmError::Hook(_))
    }

    /// The hook error that aborted the operation, if any
    pub fn as_hook_error(&self) -> Option<&EventError> {
        match self {
            OrmError::Hook(err) => Some(err),
            _ => None,
        }
    }

    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            OrmError::Configuration(_) | OrmError::UnknownConnection(_)
        )
    }

    /// True for errors raised by the context rather than the backend
    pub fn is_context_error(&self) -> bool {
        matches!(self, OrmError::Cancelled | OrmError::DeadlineExceeded)
    }
}

// Convert from sqlx errors
impl From<sqlx::Error> for OrmError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                OrmError::Connection(err.to_string())
            }
            _ => OrmError::Database(err.to_string()),
        }
    }
}

// Convert from serde_json errors
impl From<serde_json::Error> for OrmError {
    fn from(err: serde_json::Error) -> Self {
        OrmError::Serialization(err.to_string())
    }
}
