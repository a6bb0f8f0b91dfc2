use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use async_trait::async_trait;
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};

use crate::messaging::error::{token_deletion_failed, token_subscribe_failed, MessagingResult};
use crate::messaging::types::PermissionState;

const TOKEN_LENGTH: usize = 32;

/// Platform push service behind a [`MessagingAdapter`](crate::messaging::MessagingAdapter).
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn request_permission(&self) -> MessagingResult<PermissionState>;

    /// Registers the device and returns a new token.
    async fn issue_token(&self) -> MessagingResult<String>;

    async fn delete_token(&self, token: &str) -> MessagingResult<()>;

    async fn subscribe_to_topic(&self, token: &str, topic: &str) -> MessagingResult<()>;

    async fn unsubscribe_from_topic(&self, token: &str, topic: &str) -> MessagingResult<()>;

    fn kind(&self) -> &'static str;
}

/// Transport that issues random tokens locally and keeps a topic registry in
/// memory.
#[derive(Debug)]
pub struct LocalPushTransport {
    permission: PermissionState,
    registrations: Mutex<BTreeMap<String, BTreeSet<String>>>,
}

impl LocalPushTransport {
    /// A transport whose permission prompt is always granted.
    pub fn new() -> Self {
        Self::with_permission(PermissionState::Granted)
    }

    /// A transport whose permission prompt resolves to `permission`.
    pub fn with_permission(permission: PermissionState) -> Self {
        Self {
            permission,
            registrations: Mutex::new(BTreeMap::new()),
        }
    }

    /// Topics `token` is subscribed to, sorted.
    pub fn topics(&self, token: &str) -> Vec<String> {
        self.registrations
            .lock()
            .unwrap()
            .get(token)
            .map(|topics| topics.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_registered(&self, token: &str) -> bool {
        self.registrations.lock().unwrap().contains_key(token)
    }
}

impl Default for LocalPushTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn generate_token() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .map(char::from)
        .take(TOKEN_LENGTH)
        .collect()
}

#[async_trait]
impl PushTransport for LocalPushTransport {
    async fn request_permission(&self) -> MessagingResult<PermissionState> {
        Ok(self.permission)
    }

    async fn issue_token(&self) -> MessagingResult<String> {
        let mut registrations = self.registrations.lock().unwrap();
        loop {
            let token = generate_token();
            if !registrations.contains_key(&token) {
                registrations.insert(token.clone(), BTreeSet::new());
                return Ok(token);
            }
        }
    }

    async fn delete_token(&self, token: &str) -> MessagingResult<()> {
        match self.registrations.lock().unwrap().remove(token) {
            Some(_) => Ok(()),
            None => Err(token_deletion_failed(format!("Unknown token '{token}'"))),
        }
    }

    async fn subscribe_to_topic(&self, token: &str, topic: &str) -> MessagingResult<()> {
        let mut registrations = self.registrations.lock().unwrap();
        let topics = registrations
            .get_mut(token)
            .ok_or_else(|| token_subscribe_failed(format!("Unknown token '{token}'")))?;
        topics.insert(topic.to_string());
        Ok(())
    }

    async fn unsubscribe_from_topic(&self, token: &str, topic: &str) -> MessagingResult<()> {
        if let Some(topics) = self.registrations.lock().unwrap().get_mut(token) {
            topics.remove(topic);
        }
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn tokens_are_unique_and_deletable() {
        let transport = LocalPushTransport::new();
        let first = transport.issue_token().await.unwrap();
        let second = transport.issue_token().await.unwrap();
        assert_ne!(first, second);
        assert_eq!(first.len(), TOKEN_LENGTH);

        transport.delete_token(&first).await.unwrap();
        assert!(!transport.is_registered(&first));
        let err = transport.delete_token(&first).await.unwrap_err();
        assert_eq!(err.code_str(), "messaging/token-deletion-failed");
    }

    #[tokio::test]
    async fn topics_follow_the_token() {
        let transport = LocalPushTransport::new();
        let token = transport.issue_token().await.unwrap();
        transport.subscribe_to_topic(&token, "news").await.unwrap();
        transport.subscribe_to_topic(&token, "alerts").await.unwrap();
        transport.unsubscribe_from_topic(&token, "news").await.unwrap();
        assert_eq!(transport.topics(&token), vec!["alerts".to_string()]);

        let err = transport
            .subscribe_to_topic("missing", "news")
            .await
            .unwrap_err();
        assert_eq!(err.code_str(), "messaging/token-subscribe-failed");
    }
}
