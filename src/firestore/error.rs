use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FirestoreAdapterErrorCode {
    NotInitialized,
    InvalidArgument,
    MissingProjectId,
    Internal,
    NotFound,
    PermissionDenied,
    Unauthenticated,
    Unavailable,
    DeadlineExceeded,
    ResourceExhausted,
}

impl FirestoreAdapterErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FirestoreAdapterErrorCode::NotInitialized => "firestore/not-initialized",
            FirestoreAdapterErrorCode::InvalidArgument => "firestore/invalid-argument",
            FirestoreAdapterErrorCode::MissingProjectId => "firestore/missing-project-id",
            FirestoreAdapterErrorCode::Internal => "firestore/internal",
            FirestoreAdapterErrorCode::NotFound => "firestore/not-found",
            FirestoreAdapterErrorCode::PermissionDenied => "firestore/permission-denied",
            FirestoreAdapterErrorCode::Unauthenticated => "firestore/unauthenticated",
            FirestoreAdapterErrorCode::Unavailable => "firestore/unavailable",
            FirestoreAdapterErrorCode::DeadlineExceeded => "firestore/deadline-exceeded",
            FirestoreAdapterErrorCode::ResourceExhausted => "firestore/resource-exhausted",
        }
    }
}

#[derive(Clone, Debug)]
pub struct FirestoreAdapterError {
    pub code: FirestoreAdapterErrorCode,
    message: String,
    cause: Option<Arc<dyn Error + Send + Sync>>,
}

impl FirestoreAdapterError {
    pub fn new(code: FirestoreAdapterErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            cause: None,
        }
    }

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

impl Display for FirestoreAdapterError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code_str())
    }
}

impl Error for FirestoreAdapterError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn Error + 'static))
    }
}

pub type FirestoreResult<T> = Result<T, FirestoreAdapterError>;

pub fn not_initialized() -> FirestoreAdapterError {
    FirestoreAdapterError::new(
        FirestoreAdapterErrorCode::NotInitialized,
        "Firestore adapter is not initialized; call initialize() first",
    )
}

pub fn invalid_argument(message: impl Into<String>) -> FirestoreAdapterError {
    FirestoreAdapterError::new(FirestoreAdapterErrorCode::InvalidArgument, message)
}

pub fn missing_project_id() -> FirestoreAdapterError {
    FirestoreAdapterError::new(
        FirestoreAdapterErrorCode::MissingProjectId,
        "Firebase options must include a project_id to use Firestore",
    )
}

pub fn internal_error(message: impl Into<String>) -> FirestoreAdapterError {
    FirestoreAdapterError::new(FirestoreAdapterErrorCode::Internal, message)
}

pub fn not_found(message: impl Into<String>) -> FirestoreAdapterError {
    FirestoreAdapterError::new(FirestoreAdapterErrorCode::NotFound, message)
}

pub fn permission_denied(message: impl Into<String>) -> FirestoreAdapterError {
    FirestoreAdapterError::new(FirestoreAdapterErrorCode::PermissionDenied, message)
}

pub fn unauthenticated(message: impl Into<String>) -> FirestoreAdapterError {
    FirestoreAdapterError::new(FirestoreAdapterErrorCode::Unauthenticated, message)
}

pub fn unavailable(message: impl Into<String>) -> FirestoreAdapterError {
    FirestoreAdapterError::new(FirestoreAdapterErrorCode::Unavailable, message)
}

pub fn deadline_exceeded(message: impl Into<String>) -> FirestoreAdapterError {
    FirestoreAdapterError::new(FirestoreAdapterErrorCode::DeadlineExceeded, message)
}

pub fn resource_exhausted(message: impl Into<String>) -> FirestoreAdapterError {
    FirestoreAdapterError::new(FirestoreAdapterErrorCode::ResourceExhausted, message)
}
