use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_lock::Mutex as AsyncMutex;

use crate::app::{AdapterState, FirebaseOptions, StateCell};
use crate::messaging::error::{
    invalid_argument, missing_app_config_values, not_initialized, permission_blocked,
    token_subscribe_failed, token_unsubscribe_failed, MessagingAdapterError, MessagingResult,
};
use crate::messaging::subscription::ListenerSet;
use crate::messaging::transport::{LocalPushTransport, PushTransport};
use crate::messaging::types::{
    MessageHandler, MessageOrigin, MessagePayload, MessageStream, PermissionState, TokenStream,
};
use crate::util::Unsubscribe;

const TOPIC_PREFIX: &str = "/topics/";

/// Adapter over a push-notification channel: permission, device token,
/// topics and incoming messages.
///
/// Platform glue hands received messages to [`dispatch`](Self::dispatch);
/// the adapter routes them by [`MessageOrigin`].
pub struct MessagingAdapter {
    state: StateCell<MessagingConnection>,
}

/// Live connection owned by a ready [`MessagingAdapter`].
pub struct MessagingConnection {
    transport: Arc<dyn PushTransport>,
    permission: Mutex<PermissionState>,
    registration: AsyncMutex<Registration>,
    token_listeners: Arc<ListenerSet<String>>,
    message_listeners: Arc<ListenerSet<MessagePayload>>,
    background_handler: Arc<Mutex<Option<(u64, MessageHandler)>>>,
    next_handler_id: AtomicU64,
    initial_message: Mutex<Option<MessagePayload>>,
}

/// Device token and the topics it should be subscribed to.
#[derive(Default)]
struct Registration {
    token: Option<String>,
    topics: BTreeSet<String>,
    /// Set when a token was deleted; the next issued token is announced.
    reissue_pending: bool,
}

impl MessagingAdapter {
    pub fn new() -> Self {
        Self {
            state: StateCell::new(),
        }
    }

    /// Checks that `options` carries the values the push channel needs and
    /// connects to a [`LocalPushTransport`]. A second call is a no-op.
    pub async fn initialize(&self, options: &FirebaseOptions) -> MessagingResult<()> {
        self.connect(move || async move {
            check_app_config(options)?;
            Ok(Arc::new(LocalPushTransport::new()) as Arc<dyn PushTransport>)
        })
        .await
    }

    pub async fn initialize_with_transport(
        &self,
        transport: Arc<dyn PushTransport>,
    ) -> MessagingResult<()> {
        self.connect(move || async move { Ok(transport) }).await
    }

    async fn connect<F, Fut>(&self, transport: F) -> MessagingResult<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = MessagingResult<Arc<dyn PushTransport>>>,
    {
        let connected = self
            .state
            .initialize_with(move || async move {
                let transport = transport().await?;
                log::debug!("Messaging adapter connected to {} transport", transport.kind());
                Ok::<_, MessagingAdapterError>(MessagingConnection::new(transport))
            })
            .await?;
        if !connected {
            log::warn!("Messaging adapter already initialized; ignoring initialize()");
        }
        Ok(())
    }

    pub async fn state(&self) -> AdapterState<MessagingConnection> {
        self.state.snapshot().await
    }

    pub async fn is_initialized(&self) -> bool {
        self.state.snapshot().await.is_ready()
    }

    async fn connection(&self) -> MessagingResult<Arc<MessagingConnection>> {
        self.state.connection().await.ok_or_else(not_initialized)
    }

    /// Prompts for notification permission and remembers the answer.
    pub async fn request_permission(&self) -> MessagingResult<PermissionState> {
        let connection = self.connection().await?;
        connection.request_permission().await
    }

    /// Current device token, issued on first use. Prompts for permission
    /// when it has not been decided yet.
    pub async fn token(&self) -> MessagingResult<String> {
        let connection = self.connection().await?;
        connection.ensure_permission().await?;
        let mut registration = connection.registration.lock().await;
        connection.ensure_token(&mut registration).await
    }

    /// Deletes the current token. Returns `false` when no token was issued.
    pub async fn delete_token(&self) -> MessagingResult<bool> {
        let connection = self.connection().await?;
        let mut registration = connection.registration.lock().await;
        let Some(token) = registration.token.clone() else {
            return Ok(false);
        };
        connection.transport.delete_token(&token).await?;
        registration.token = None;
        registration.reissue_pending = true;
        Ok(true)
    }

    /// Replaces the current token with a new one and announces it on
    /// [`on_token_refresh`](Self::on_token_refresh) streams.
    pub async fn refresh_token(&self) -> MessagingResult<String> {
        let connection = self.connection().await?;
        connection.ensure_permission().await?;
        let mut registration = connection.registration.lock().await;
        if let Some(old) = registration.token.take() {
            connection.transport.delete_token(&old).await?;
        }
        registration.reissue_pending = true;
        connection.ensure_token(&mut registration).await
    }

    /// Streams every token issued after a refresh or a deletion.
    pub async fn on_token_refresh(&self) -> MessagingResult<TokenStream> {
        let connection = self.connection().await?;
        Ok(connection.token_listeners.subscribe())
    }

    pub async fn subscribe_to_topic(&self, topic: &str) -> MessagingResult<()> {
        let connection = self.connection().await?;
        let topic = normalize_topic(topic)?;
        connection.ensure_permission().await?;
        let mut registration = connection.registration.lock().await;
        let token = connection.ensure_token(&mut registration).await?;
        connection
            .transport
            .subscribe_to_topic(&token, &topic)
            .await
            .map_err(|err| {
                token_subscribe_failed(format!("Subscribing to '{topic}' failed: {}", err.message()))
                    .with_cause(err)
            })?;
        registration.topics.insert(topic);
        Ok(())
    }

    pub async fn unsubscribe_from_topic(&self, topic: &str) -> MessagingResult<()> {
        let connection = self.connection().await?;
        let topic = normalize_topic(topic)?;
        let mut registration = connection.registration.lock().await;
        if let Some(token) = registration.token.clone() {
            connection
                .transport
                .unsubscribe_from_topic(&token, &topic)
                .await
                .map_err(|err| {
                    token_unsubscribe_failed(format!(
                        "Unsubscribing from '{topic}' failed: {}",
                        err.message()
                    ))
                    .with_cause(err)
                })?;
        }
        registration.topics.remove(&topic);
        Ok(())
    }

    /// Streams messages received while the app is in the foreground.
    pub async fn on_message(&self) -> MessagingResult<MessageStream> {
        let connection = self.connection().await?;
        Ok(connection.message_listeners.subscribe())
    }

    /// Installs the handler for background messages, replacing any previous
    /// one. The returned closure removes it.
    pub async fn on_background_message(
        &self,
        handler: MessageHandler,
    ) -> MessagingResult<Unsubscribe> {
        let connection = self.connection().await?;
        let id = connection.next_handler_id.fetch_add(1, Ordering::SeqCst);
        *connection.background_handler.lock().unwrap() = Some((id, handler));
        let slot = Arc::clone(&connection.background_handler);
        Ok(Box::new(move || {
            let mut slot = slot.lock().unwrap();
            if slot.as_ref().is_some_and(|(current, _)| *current == id) {
                *slot = None;
            }
        }))
    }

    /// The message that launched the app, if any. Returned once.
    pub async fn initial_message(&self) -> MessagingResult<Option<MessagePayload>> {
        let connection = self.connection().await?;
        let message = connection.initial_message.lock().unwrap().take();
        Ok(message)
    }

    /// Delivers a message received by the platform.
    pub async fn dispatch(
        &self,
        payload: MessagePayload,
        origin: MessageOrigin,
    ) -> MessagingResult<()> {
        let connection = self.connection().await?;
        match origin {
            MessageOrigin::Foreground => {
                let delivered = connection.message_listeners.broadcast(&payload);
                log::debug!("foreground message delivered to {delivered} streams");
            }
            MessageOrigin::Background => {
                let handler = connection
                    .background_handler
                    .lock()
                    .unwrap()
                    .as_ref()
                    .map(|(_, handler)| Arc::clone(handler));
                match handler {
                    Some(handler) => handler(payload),
                    None => log::debug!("no background handler; dropping message"),
                }
            }
            MessageOrigin::Launch => {
                *connection.initial_message.lock().unwrap() = Some(payload);
            }
        }
        Ok(())
    }
}

impl Default for MessagingAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MessagingAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessagingAdapter").finish_non_exhaustive()
    }
}

impl MessagingConnection {
    fn new(transport: Arc<dyn PushTransport>) -> Self {
        Self {
            transport,
            permission: Mutex::new(PermissionState::Default),
            registration: AsyncMutex::new(Registration::default()),
            token_listeners: Arc::new(ListenerSet::new("token refresh")),
            message_listeners: Arc::new(ListenerSet::new("message")),
            background_handler: Arc::new(Mutex::new(None)),
            next_handler_id: AtomicU64::new(0),
            initial_message: Mutex::new(None),
        }
    }

    pub fn transport_kind(&self) -> &'static str {
        self.transport.kind()
    }

    pub fn permission(&self) -> PermissionState {
        *self.permission.lock().unwrap()
    }

    async fn request_permission(&self) -> MessagingResult<PermissionState> {
        let permission = self.transport.request_permission().await?;
        *self.permission.lock().unwrap() = permission;
        Ok(permission)
    }

    async fn ensure_permission(&self) -> MessagingResult<()> {
        let permission = match self.permission() {
            PermissionState::Default => self.request_permission().await?,
            decided => decided,
        };
        if permission == PermissionState::Granted {
            Ok(())
        } else {
            Err(permission_blocked())
        }
    }

    /// Returns the current token, issuing one (and re-subscribing the known
    /// topics) when there is none.
    async fn ensure_token(&self, registration: &mut Registration) -> MessagingResult<String> {
        if let Some(token) = &registration.token {
            return Ok(token.clone());
        }
        let token = self.transport.issue_token().await?;
        registration.token = Some(token.clone());
        if std::mem::take(&mut registration.reissue_pending) {
            self.token_listeners.broadcast(&token);
        }
        for topic in &registration.topics {
            self.transport
                .subscribe_to_topic(&token, topic)
                .await
                .map_err(|err| {
                    token_subscribe_failed(format!(
                        "Restoring topic '{topic}' on the new token failed: {}",
                        err.message()
                    ))
                    .with_cause(err)
                })?;
        }
        Ok(token)
    }
}

impl fmt::Debug for MessagingConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessagingConnection")
            .field("transport", &self.transport.kind())
            .field("permission", &self.permission())
            .finish_non_exhaustive()
    }
}

fn check_app_config(options: &FirebaseOptions) -> MessagingResult<()> {
    let missing: Vec<&str> = [
        ("project_id", &options.project_id),
        ("api_key", &options.api_key),
        ("app_id", &options.app_id),
        ("messaging_sender_id", &options.messaging_sender_id),
    ]
    .into_iter()
    .filter(|(_, value)| value.as_deref().map_or(true, |value| value.trim().is_empty()))
    .map(|(name, _)| name)
    .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(missing_app_config_values(&missing))
    }
}

/// Strips an optional `/topics/` prefix and checks the name against
/// `[a-zA-Z0-9-_.~%]+`.
fn normalize_topic(topic: &str) -> MessagingResult<String> {
    let name = topic.strip_prefix(TOPIC_PREFIX).unwrap_or(topic);
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.' | '~' | '%'));
    if valid {
        Ok(name.to_string())
    } else {
        Err(invalid_argument(format!("Invalid topic name '{topic}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::error::MessagingAdapterErrorCode;

    async fn adapter_with(transport: Arc<LocalPushTransport>) -> MessagingAdapter {
        let adapter = MessagingAdapter::new();
        adapter.initialize_with_transport(transport).await.unwrap();
        adapter
    }

    #[test]
    fn topic_names_are_validated() {
        assert_eq!(normalize_topic("/topics/news").unwrap(), "news");
        assert_eq!(normalize_topic("a-b_c.d~e%20").unwrap(), "a-b_c.d~e%20");
        assert!(normalize_topic("").is_err());
        assert!(normalize_topic("/topics/").is_err());
        assert!(normalize_topic("bad topic").is_err());
        assert!(normalize_topic("news/sports").is_err());
    }

    #[tokio::test]
    async fn initialize_requires_messaging_config() {
        let adapter = MessagingAdapter::new();
        let options = FirebaseOptions {
            project_id: Some("demo".into()),
            api_key: Some("key".into()),
            ..Default::default()
        };
        let err = adapter.initialize(&options).await.unwrap_err();
        assert_eq!(err.code, MessagingAdapterErrorCode::MissingAppConfigValues);
        assert!(err.message().contains("app_id"));
        assert!(err.message().contains("messaging_sender_id"));
        assert!(!adapter.is_initialized().await);
    }

    #[tokio::test]
    async fn denied_permission_blocks_tokens() {
        let transport = Arc::new(LocalPushTransport::with_permission(PermissionState::Denied));
        let adapter = adapter_with(transport).await;
        assert_eq!(
            adapter.request_permission().await.unwrap(),
            PermissionState::Denied
        );
        let err = adapter.token().await.unwrap_err();
        assert_eq!(err.code, MessagingAdapterErrorCode::PermissionBlocked);
    }

    #[tokio::test]
    async fn token_is_stable_until_deleted() {
        let transport = Arc::new(LocalPushTransport::new());
        let adapter = adapter_with(Arc::clone(&transport)).await;
        assert!(!adapter.delete_token().await.unwrap());

        let first = adapter.token().await.unwrap();
        assert_eq!(adapter.token().await.unwrap(), first);
        assert!(adapter.delete_token().await.unwrap());
        assert!(!transport.is_registered(&first));
        assert_ne!(adapter.token().await.unwrap(), first);
    }

    #[tokio::test]
    async fn topics_survive_token_rotation() {
        let transport = Arc::new(LocalPushTransport::new());
        let adapter = adapter_with(Arc::clone(&transport)).await;
        adapter.subscribe_to_topic("/topics/news").await.unwrap();
        adapter.subscribe_to_topic("alerts").await.unwrap();
        adapter.unsubscribe_from_topic("alerts").await.unwrap();

        let rotated = adapter.refresh_token().await.unwrap();
        assert_eq!(transport.topics(&rotated), vec!["news".to_string()]);

        let err = adapter.subscribe_to_topic("no spaces").await.unwrap_err();
        assert_eq!(err.code, MessagingAdapterErrorCode::InvalidArgument);
    }

    #[tokio::test]
    async fn background_handler_is_replaced_and_removed() {
        let adapter = adapter_with(Arc::new(LocalPushTransport::new())).await;
        let seen = Arc::new(Mutex::new(Vec::new()));

        let first_seen = Arc::clone(&seen);
        let remove_first = adapter
            .on_background_message(Arc::new(move |payload: MessagePayload| {
                first_seen.lock().unwrap().push(format!("first:{:?}", payload.message_id));
            }))
            .await
            .unwrap();
        let second_seen = Arc::clone(&seen);
        let remove_second = adapter
            .on_background_message(Arc::new(move |payload: MessagePayload| {
                second_seen.lock().unwrap().push(format!("second:{:?}", payload.message_id));
            }))
            .await
            .unwrap();

        // Removing a replaced handler leaves the current one installed.
        remove_first();
        let payload = MessagePayload {
            message_id: Some("m1".into()),
            ..Default::default()
        };
        adapter
            .dispatch(payload.clone(), MessageOrigin::Background)
            .await
            .unwrap();
        remove_second();
        adapter
            .dispatch(payload, MessageOrigin::Background)
            .await
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["second:Some(\"m1\")".to_string()]);
    }

    #[tokio::test]
    async fn launch_message_is_consumed_once() {
        let adapter = adapter_with(Arc::new(LocalPushTransport::new())).await;
        assert!(adapter.initial_message().await.unwrap().is_none());
        let payload = MessagePayload {
            from: Some("123".into()),
            ..Default::default()
        };
        adapter
            .dispatch(payload.clone(), MessageOrigin::Launch)
            .await
            .unwrap();
        assert_eq!(adapter.initial_message().await.unwrap(), Some(payload));
        assert!(adapter.initial_message().await.unwrap().is_none());
    }
}
