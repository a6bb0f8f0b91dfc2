use std::error::Error;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

/// Error type returned by async token providers when token acquisition fails.
#[derive(Debug, Clone)]
pub struct TokenError {
    message: String,
}

impl TokenError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn from_error(err: impl Error) -> Self {
        Self::new(err.to_string())
    }
}

impl fmt::Display for TokenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Error for TokenError {}

/// Supplies credentials to the REST backends.
///
/// Returning `Ok(None)` sends the request unauthenticated.
#[async_trait]
pub trait AsyncTokenProvider: Send + Sync {
    async fn get_token(&self, force_refresh: bool) -> Result<Option<String>, TokenError>;
}

pub type TokenProviderArc = Arc<dyn AsyncTokenProvider>;

/// Provider that never attaches credentials.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopTokenProvider;

#[async_trait]
impl AsyncTokenProvider for NoopTokenProvider {
    async fn get_token(&self, _force_refresh: bool) -> Result<Option<String>, TokenError> {
        Ok(None)
    }
}

/// Provider returning a fixed token, e.g. a service-account access token
/// minted out of band or an emulator `owner` token.
#[derive(Clone, Debug)]
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl AsyncTokenProvider for StaticTokenProvider {
    async fn get_token(&self, _force_refresh: bool) -> Result<Option<String>, TokenError> {
        if self.token.is_empty() {
            Ok(None)
        } else {
            Ok(Some(self.token.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_provider_treats_empty_token_as_anonymous() {
        assert_eq!(StaticTokenProvider::new("").get_token(false).await.unwrap(), None);
        assert_eq!(
            StaticTokenProvider::new("owner").get_token(true).await.unwrap(),
            Some("owner".to_string())
        );
        assert_eq!(NoopTokenProvider.get_token(false).await.unwrap(), None);
    }
}
