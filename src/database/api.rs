use std::fmt;
use std::future::Future;
use std::sync::Arc;

use serde_json::{Map, Value};
use url::Url;

use crate::app::{AdapterState, FirebaseOptions, StateCell};
use crate::database::backend::{InMemoryTreeBackend, RestTreeBackend, TreeBackend};
use crate::database::error::{
    internal_error, invalid_argument, not_initialized, unexpected_value, DatabaseAdapterError,
    DatabaseResult,
};
use crate::database::listeners::{
    child_events, ChildEventKind, ChildEventStream, ListenerRegistry, LocationValues,
    NodeStream,
};
use crate::database::node::{ordered_children, Node};
use crate::database::path::{join_path, normalize_path, validate_key};
use crate::platform::token::TokenProviderArc;
use crate::platform::FirebaseDefaults;
use crate::util::subscribe::listener_channel;
use crate::util::Subscription;

/// Adapter over a hierarchical key-value tree addressed by slash-separated
/// paths.
///
/// Create one per logical database, call [`initialize`](Self::initialize)
/// once, then share it (it is `Send + Sync`; wrap it in an `Arc` to hand it
/// to several tasks). Every operation fails with
/// [`DatabaseAdapterErrorCode::NotInitialized`](crate::database::DatabaseAdapterErrorCode)
/// until then and never reaches the backend.
pub struct DatabaseAdapter {
    state: StateCell<DatabaseConnection>,
    auth_provider: Option<TokenProviderArc>,
}

/// Live connection owned by a ready [`DatabaseAdapter`].
pub struct DatabaseConnection {
    backend: Arc<dyn TreeBackend>,
    listeners: Arc<ListenerRegistry>,
}

/// Child-event streams registered together by
/// [`DatabaseAdapter::subscribe_child_events`]. Each stream is cancelled
/// independently.
#[derive(Debug, Default)]
pub struct ChildEventSubscriptions {
    pub added: Option<ChildEventStream>,
    pub changed: Option<ChildEventStream>,
    pub removed: Option<ChildEventStream>,
}

impl ChildEventSubscriptions {
    pub fn take(&mut self, kind: ChildEventKind) -> Option<ChildEventStream> {
        match kind {
            ChildEventKind::Added => self.added.take(),
            ChildEventKind::Changed => self.changed.take(),
            ChildEventKind::Removed => self.removed.take(),
        }
    }

    fn slot(&mut self, kind: ChildEventKind) -> &mut Option<ChildEventStream> {
        match kind {
            ChildEventKind::Added => &mut self.added,
            ChildEventKind::Changed => &mut self.changed,
            ChildEventKind::Removed => &mut self.removed,
        }
    }
}

impl DatabaseAdapter {
    pub fn new() -> Self {
        Self {
            state: StateCell::new(),
            auth_provider: None,
        }
    }

    /// Credentials attached to REST requests when `initialize` selects the
    /// REST backend.
    pub fn with_auth_provider(mut self, provider: TokenProviderArc) -> Self {
        self.auth_provider = Some(provider);
        self
    }

    /// Connects to the database described by `options`.
    ///
    /// Uses the REST backend when `options.database_url` is set or a
    /// `database` emulator host is configured in the environment defaults,
    /// and the in-memory backend otherwise. A second call is a no-op.
    pub async fn initialize(&self, options: &FirebaseOptions) -> DatabaseResult<()> {
        self.initialize_with_defaults(options, &FirebaseDefaults::load())
            .await
    }

    pub(crate) async fn initialize_with_defaults(
        &self,
        options: &FirebaseOptions,
        defaults: &FirebaseDefaults,
    ) -> DatabaseResult<()> {
        let auth_provider = self.auth_provider.clone();
        self.connect(|| async move { select_backend(options, defaults, auth_provider) })
            .await
    }

    /// Connects to a caller-supplied backend.
    pub async fn initialize_with_backend(
        &self,
        backend: Arc<dyn TreeBackend>,
    ) -> DatabaseResult<()> {
        self.connect(|| async move { Ok(backend) }).await
    }

    async fn connect<F, Fut>(&self, backend: F) -> DatabaseResult<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = DatabaseResult<Arc<dyn TreeBackend>>>,
    {
        let connected = self
            .state
            .initialize_with(move || async move {
                let backend = backend().await?;
                log::debug!(
                    "Realtime Database adapter connected to {} backend",
                    backend.kind()
                );
                Ok::<_, DatabaseAdapterError>(DatabaseConnection {
                    backend,
                    listeners: Arc::new(ListenerRegistry::default()),
                })
            })
            .await?;
        if !connected {
            log::warn!("Realtime Database adapter already initialized; ignoring initialize()");
        }
        Ok(())
    }

    pub async fn state(&self) -> AdapterState<DatabaseConnection> {
        self.state.snapshot().await
    }

    pub async fn is_initialized(&self) -> bool {
        self.state.snapshot().await.is_ready()
    }

    async fn connection(&self) -> DatabaseResult<Arc<DatabaseConnection>> {
        self.state.connection().await.ok_or_else(not_initialized)
    }

    /// Overwrites the value at `path`; children missing from `value` are
    /// removed. Writing `null` removes the node.
    pub async fn replace(&self, path: &str, value: Value) -> DatabaseResult<()> {
        let connection = self.connection().await?;
        let segments = normalize_path(path)?;
        connection
            .write(&segments, connection.backend.set(&segments, value))
            .await
    }

    /// Stores `value` under a new, store-generated child key of `path` and
    /// returns the key.
    pub async fn append(&self, path: &str, value: Value) -> DatabaseResult<String> {
        let connection = self.connection().await?;
        let segments = normalize_path(path)?;
        let key = connection
            .write(&segments, connection.backend.push(&segments, value))
            .await?;
        key.filter(|key| !key.is_empty()).ok_or_else(|| {
            unexpected_value(format!(
                "Backend did not return a generated key for '/{}'",
                join_path(&segments)
            ))
        })
    }

    /// Updates only the given children of `path`. Keys may be relative paths
    /// such as `profile/name`.
    pub async fn merge(&self, path: &str, fields: Map<String, Value>) -> DatabaseResult<()> {
        let connection = self.connection().await?;
        let segments = normalize_path(path)?;
        let mut updates = Vec::with_capacity(fields.len());
        for (key, value) in fields {
            let relative = normalize_path(&key)?;
            if relative.is_empty() {
                return Err(invalid_argument("Merge keys cannot be empty"));
            }
            relative.iter().try_for_each(|segment| validate_key(segment))?;
            let mut absolute = segments.clone();
            absolute.extend(relative);
            updates.push((absolute, value));
        }
        if updates.is_empty() {
            return Ok(());
        }
        connection
            .write(&segments, connection.backend.update(&segments, updates))
            .await
    }

    /// Deletes the node at `path` and all of its descendants.
    pub async fn remove(&self, path: &str) -> DatabaseResult<()> {
        let connection = self.connection().await?;
        let segments = normalize_path(path)?;
        connection
            .write(&segments, connection.backend.delete(&segments))
            .await
    }

    pub async fn read_once(&self, path: &str) -> DatabaseResult<Node> {
        let connection = self.connection().await?;
        let segments = normalize_path(path)?;
        let value = connection.backend.get(&segments).await?;
        Ok(Node::from_value(segments.last(), value))
    }

    /// Reads the direct children of `path` in key order. A missing location
    /// has no children; a scalar or array location is an error.
    pub async fn read_children_once(&self, path: &str) -> DatabaseResult<Vec<Node>> {
        let connection = self.connection().await?;
        let segments = normalize_path(path)?;
        let value = connection.backend.get(&segments).await?;
        let children = ordered_children(&value).ok_or_else(|| {
            unexpected_value(format!(
                "Value at '/{}' is not a mapping of children",
                join_path(&segments)
            ))
        })?;
        Ok(children
            .into_iter()
            .map(|(key, child)| Node::from_value(Some(&key), child))
            .collect())
    }

    /// Streams the value at `path`: the current value first, then one item
    /// per change made through this adapter.
    pub async fn subscribe(&self, path: &str) -> DatabaseResult<NodeStream> {
        let connection = self.connection().await?;
        let segments = normalize_path(path)?;
        let (sender, receiver) = listener_channel();
        let id = connection
            .listeners
            .register_value(segments.clone(), sender);
        let subscription = connection.subscription(id, receiver);

        let value = connection.backend.get(&segments).await?;
        connection
            .listeners
            .deliver_initial_value(id, Node::from_value(segments.last(), value));
        Ok(subscription)
    }

    pub async fn subscribe_child_added(&self, path: &str) -> DatabaseResult<ChildEventStream> {
        self.subscribe_child(path, ChildEventKind::Added).await
    }

    pub async fn subscribe_child_changed(&self, path: &str) -> DatabaseResult<ChildEventStream> {
        self.subscribe_child(path, ChildEventKind::Changed).await
    }

    pub async fn subscribe_child_removed(&self, path: &str) -> DatabaseResult<ChildEventStream> {
        self.subscribe_child(path, ChildEventKind::Removed).await
    }

    /// Registers one stream per requested kind. Duplicate kinds are
    /// registered once.
    pub async fn subscribe_child_events(
        &self,
        path: &str,
        kinds: &[ChildEventKind],
    ) -> DatabaseResult<ChildEventSubscriptions> {
        let mut subscriptions = ChildEventSubscriptions::default();
        for kind in ChildEventKind::ALL {
            if kinds.contains(&kind) {
                *subscriptions.slot(kind) = Some(self.subscribe_child(path, kind).await?);
            }
        }
        Ok(subscriptions)
    }

    async fn subscribe_child(
        &self,
        path: &str,
        kind: ChildEventKind,
    ) -> DatabaseResult<ChildEventStream> {
        let connection = self.connection().await?;
        let segments = normalize_path(path)?;
        let (sender, receiver) = listener_channel();
        let id = connection
            .listeners
            .register_child(segments.clone(), kind, sender);
        let subscription = connection.subscription(id, receiver);

        if kind == ChildEventKind::Added {
            let value = connection.backend.get(&segments).await?;
            connection
                .listeners
                .deliver_initial_children(id, child_events(kind, &Value::Null, &value));
        }
        Ok(subscription)
    }
}

impl Default for DatabaseAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DatabaseAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseAdapter").finish_non_exhaustive()
    }
}

impl DatabaseConnection {
    pub fn backend_kind(&self) -> &'static str {
        self.backend.kind()
    }

    /// Number of live subscriptions.
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    fn subscription<T>(
        &self,
        id: u64,
        receiver: async_channel::Receiver<T>,
    ) -> Subscription<T> {
        let listeners = Arc::clone(&self.listeners);
        Subscription::new(receiver, Box::new(move || listeners.remove(id)))
    }

    /// Runs `operation` and notifies the listeners whose locations it may
    /// have changed.
    async fn write<T, F>(&self, changed: &[String], operation: F) -> DatabaseResult<T>
    where
        F: Future<Output = DatabaseResult<T>>,
    {
        let paths = self.listeners.affected_paths(changed);
        if paths.is_empty() {
            return operation.await;
        }

        let before = self.read_locations(&paths).await;
        let result = operation.await?;
        match before {
            Ok(before) => match self.read_locations(&paths).await {
                Ok(after) => self.listeners.dispatch(&before, &after),
                Err(err) => self.listeners.dispatch_error(&paths, &err),
            },
            Err(err) => {
                log::warn!("listener locations unreadable before write: {err}");
                self.listeners.dispatch_error(&paths, &err);
            }
        }
        Ok(result)
    }

    async fn read_locations(&self, paths: &[Vec<String>]) -> DatabaseResult<LocationValues> {
        let mut values = LocationValues::new();
        for path in paths {
            values.insert(path.clone(), self.backend.get(path).await?);
        }
        Ok(values)
    }
}

impl fmt::Debug for DatabaseConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConnection")
            .field("backend", &self.backend.kind())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

fn select_backend(
    options: &FirebaseOptions,
    defaults: &FirebaseDefaults,
    auth_provider: Option<TokenProviderArc>,
) -> DatabaseResult<Arc<dyn TreeBackend>> {
    let url = match defaults.emulator_host("database") {
        Some(host) => Some(emulator_url(&host, options)?),
        None => options.database_url.clone(),
    };

    let Some(url) = url else {
        return Ok(Arc::new(InMemoryTreeBackend::new()));
    };

    let mut builder = RestTreeBackend::builder(url);
    if let Some(provider) = auth_provider {
        builder = builder.with_auth_provider(provider);
    }
    let backend = builder.build().map_err(|err| {
        internal_error(format!(
            "Unable to connect to the Realtime Database: {}",
            err.message()
        ))
        .with_cause(err)
    })?;
    Ok(Arc::new(backend))
}

/// Emulator URL for `host`; the namespace comes from the database URL's
/// first host label, or `{project_id}-default-rtdb`.
fn emulator_url(host: &str, options: &FirebaseOptions) -> DatabaseResult<String> {
    let namespace = options
        .database_url
        .as_deref()
        .and_then(|raw| Url::parse(raw).ok())
        .and_then(|url| {
            url.host_str()
                .and_then(|host| host.split('.').next())
                .map(str::to_string)
        })
        .or_else(|| {
            options
                .project_id
                .as_ref()
                .map(|project| format!("{project}-default-rtdb"))
        })
        .ok_or_else(|| {
            invalid_argument("Database emulator requires database_url or project_id")
        })?;
    Ok(format!("http://{host}/?ns={namespace}"))
}
