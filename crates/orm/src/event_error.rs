use std::fmt;

/// Error returned by an observer hook.
///
/// Any hook error aborts the operation in flight and reaches the caller as
/// [`OrmError::Hook`](crate::error::OrmError::Hook) without extra decoration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventError {
    Observer {
        message: String,
    },
    Validation {
        message: String,
        hint: Option<String>,
    },
    Database {
        message: String,
    },
    PropagationStopped {
        reason: String,
    },
}

impl EventError {
    pub fn observer(message: &str) -> Self {
        Self::Observer {
            message: message.to_string(),
        }
    }

    pub fn validation(message: &str) -> Self {
        Self::Validation {
            message: message.to_string(),
            hint: None,
        }
    }

    pub fn validation_with_hint(message: &str, hint: &str) -> Self {
        Self::Validation {
            message: message.to_string(),
            hint: Some(hint.to_string()),
        }
    }

    pub fn database(message: &str) -> Self {
        Self::Database {
            message: message.to_string(),
        }
    }

    pub fn propagation_stopped(reason: &str) -> Self {
        Self::PropagationStopped {
            reason: reason.to_string(),
        }
    }
}

impl fmt::Display for EventError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventError::Observer { message } => write!(f, "{}", message),
            EventError::Validation { message, hint } => {
                write!(f, "Validation error: {}", message)?;
                if let Some(hint) = hint {
                    write!(f, " (hint: {})", hint)?;
                }
                Ok(())
            }
            EventError::Database { message } => write!(f, "Database error: {}", message),
            EventError::PropagationStopped { reason } => {
                write!(f, "Event propagation stopped: {}", reason)
            }
        }
    }
}

impl std::error::Error for EventError {}

impl From<std::io::Error> for EventError {
    fn from(err: std::io::Error) -> Self {
        Self::database(&err.to_string())
    }
}

impl From<anyhow::Error> for EventError {
    fn from(err: anyhow::Error) -> Self {
        Self::observer(&err.to_string())
    }
}
