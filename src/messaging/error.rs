use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MessagingAdapterErrorCode {
    NotInitialized,
    InvalidArgument,
    MissingAppConfigValues,
    PermissionBlocked,
    TokenDeletionFailed,
    TokenSubscribeFailed,
    TokenUnsubscribeFailed,
    Internal,
}

impl MessagingAdapterErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessagingAdapterErrorCode::NotInitialized => "messaging/not-initialized",
            MessagingAdapterErrorCode::InvalidArgument => "messaging/invalid-argument",
            MessagingAdapterErrorCode::MissingAppConfigValues => {
                "messaging/missing-app-config-values"
            }
            MessagingAdapterErrorCode::PermissionBlocked => "messaging/permission-blocked",
            MessagingAdapterErrorCode::TokenDeletionFailed => "messaging/token-deletion-failed",
            MessagingAdapterErrorCode::TokenSubscribeFailed => "messaging/token-subscribe-failed",
            MessagingAdapterErrorCode::TokenUnsubscribeFailed => {
                "messaging/token-unsubscribe-failed"
            }
            MessagingAdapterErrorCode::Internal => "messaging/internal",
        }
    }
}

#[derive(Clone, Debug)]
pub struct MessagingAdapterError {
    pub code: MessagingAdapterErrorCode,
    message: String,
    cause: Option<Arc<dyn Error + Send + Sync>>,
}

impl MessagingAdapterError {
    pub fn new(code: MessagingAdapterErrorCode, message: impl Into<String>) -> Self {
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

impl Display for MessagingAdapterError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code_str())
    }
}

impl Error for MessagingAdapterError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn Error + 'static))
    }
}

pub type MessagingResult<T> = Result<T, MessagingAdapterError>;

pub fn not_initialized() -> MessagingAdapterError {
    MessagingAdapterError::new(
        MessagingAdapterErrorCode::NotInitialized,
        "Messaging adapter is not initialized; call initialize() first",
    )
}

pub fn invalid_argument(message: impl Into<String>) -> MessagingAdapterError {
    MessagingAdapterError::new(MessagingAdapterErrorCode::InvalidArgument, message)
}

pub fn missing_app_config_values(missing: &[&str]) -> MessagingAdapterError {
    MessagingAdapterError::new(
        MessagingAdapterErrorCode::MissingAppConfigValues,
        format!(
            "Firebase options are missing values required by messaging: {}",
            missing.join(", ")
        ),
    )
}

pub fn permission_blocked() -> MessagingAdapterError {
    MessagingAdapterError::new(
        MessagingAdapterErrorCode::PermissionBlocked,
        "Notification permission was not granted",
    )
}

pub fn token_deletion_failed(message: impl Into<String>) -> MessagingAdapterError {
    MessagingAdapterError::new(MessagingAdapterErrorCode::TokenDeletionFailed, message)
}

pub fn token_subscribe_failed(message: impl Into<String>) -> MessagingAdapterError {
    MessagingAdapterError::new(MessagingAdapterErrorCode::TokenSubscribeFailed, message)
}

pub fn token_unsubscribe_failed(message: impl Into<String>) -> MessagingAdapterError {
    MessagingAdapterError::new(MessagingAdapterErrorCode::TokenUnsubscribeFailed, message)
}

pub fn internal_error(message: impl Into<String>) -> MessagingAdapterError {
    MessagingAdapterError::new(MessagingAdapterErrorCode::Internal, message)
}
