use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DatabaseAdapterErrorCode {
    NotInitialized,
    InvalidArgument,
    UnexpectedValue,
    Internal,
    PermissionDenied,
}

impl DatabaseAdapterErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseAdapterErrorCode::NotInitialized => "database/not-initialized",
            DatabaseAdapterErrorCode::InvalidArgument => "database/invalid-argument",
            DatabaseAdapterErrorCode::UnexpectedValue => "database/unexpected-value",
            DatabaseAdapterErrorCode::Internal => "database/internal",
            DatabaseAdapterErrorCode::PermissionDenied => "database/permission-denied",
        }
    }
}

/// Error raised by every [`DatabaseAdapter`](crate::database::DatabaseAdapter) operation.
#[derive(Clone, Debug)]
pub struct DatabaseAdapterError {
    pub code: DatabaseAdapterErrorCode,
    message: String,
    cause: Option<Arc<dyn Error + Send + Sync>>,
}

impl DatabaseAdapterError {
    pub fn new(code: DatabaseAdapterErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            cause: None,
        }
    }

    /// Attaches the underlying failure, exposed through [`Error::source`].
    pub fn with_cause(mut self, cause: impl Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Arc::new(cause));
        self
    }

    pub fn code_str(&self) -> &'static str {
        self.code.as_str()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for DatabaseAdapterError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code_str())
    }
}

impl Error for DatabaseAdapterError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn Error + 'static))
    }
}

pub type DatabaseResult<T> = Result<T, DatabaseAdapterError>;

pub fn not_initialized() -> DatabaseAdapterError {
    DatabaseAdapterError::new(
        DatabaseAdapterErrorCode::NotInitialized,
        "Realtime Database adapter is not initialized; call initialize() first",
    )
}

pub fn invalid_argument(message: impl Into<String>) -> DatabaseAdapterError {
    DatabaseAdapterError::new(DatabaseAdapterErrorCode::InvalidArgument, message)
}

pub fn unexpected_value(message: impl Into<String>) -> DatabaseAdapterError {
    DatabaseAdapterError::new(DatabaseAdapterErrorCode::UnexpectedValue, message)
}

pub fn internal_error(message: impl Into<String>) -> DatabaseAdapterError {
    DatabaseAdapterError::new(DatabaseAdapterErrorCode::Internal, message)
}

pub fn permission_denied(message: impl Into<String>) -> DatabaseAdapterError {
    DatabaseAdapterError::new(DatabaseAdapterErrorCode::PermissionDenied, message)
}
