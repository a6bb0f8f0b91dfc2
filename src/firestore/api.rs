use std::fmt;
use std::future::Future;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::app::{AdapterState, FirebaseOptions, StateCell};
use crate::firestore::document::{FirestoreCollection, FirestoreDocument};
use crate::firestore::error::{
    internal_error, missing_project_id, not_initialized, FirestoreAdapterError, FirestoreResult,
};
use crate::firestore::listeners::{DocumentStream, QueryStream, Snapshot, WatchRegistry, WatchTarget};
use crate::firestore::model::{CollectionPath, DocumentKey, FieldPath};
use crate::firestore::query::{Query, QueryModifier};
use crate::firestore::remote::datastore::{Datastore, HttpDatastore, InMemoryDatastore};
use crate::firestore::settings::{FirestoreBackendKind, FirestoreSettings};
use crate::platform::token::TokenProviderArc;
use crate::util::subscribe::listener_channel;
use crate::util::Subscription;

/// Adapter over a document store addressed by `(collection, id)` pairs.
///
/// Collections may be nested (`users/u1/posts`). Every operation fails with
/// `NotInitialized` until [`initialize`](Self::initialize) succeeds.
pub struct FirestoreAdapter {
    state: StateCell<FirestoreConnection>,
    auth_provider: Option<TokenProviderArc>,
}

/// Live connection owned by a ready [`FirestoreAdapter`].
pub struct FirestoreConnection {
    datastore: Arc<dyn Datastore>,
    watches: Arc<WatchRegistry>,
}

impl FirestoreAdapter {
    pub fn new() -> Self {
        Self {
            state: StateCell::new(),
            auth_provider: None,
        }
    }

    /// Credentials sent as a bearer token by the HTTP datastore.
    pub fn with_auth_provider(mut self, provider: TokenProviderArc) -> Self {
        self.auth_provider = Some(provider);
        self
    }

    /// Connects using [`FirestoreSettings::from_environment`].
    pub async fn initialize(&self, options: &FirebaseOptions) -> FirestoreResult<()> {
        self.initialize_with_settings(options, FirestoreSettings::from_environment())
            .await
    }

    /// Requires `options.project_id`. Once the adapter is ready, further
    /// calls are no-ops and `options` is not inspected.
    pub async fn initialize_with_settings(
        &self,
        options: &FirebaseOptions,
        settings: FirestoreSettings,
    ) -> FirestoreResult<()> {
        let auth_provider = self.auth_provider.clone();
        self.connect(move || async move {
            let project_id = options
                .project_id
                .clone()
                .filter(|project| !project.trim().is_empty())
                .ok_or_else(missing_project_id)?;
            select_datastore(project_id, settings, auth_provider)
        })
        .await
    }

    pub async fn initialize_with_datastore(
        &self,
        datastore: Arc<dyn Datastore>,
    ) -> FirestoreResult<()> {
        self.connect(move || async move { Ok(datastore) }).await
    }

    async fn connect<F, Fut>(&self, datastore: F) -> FirestoreResult<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FirestoreResult<Arc<dyn Datastore>>>,
    {
        let connected = self
            .state
            .initialize_with(move || async move {
                let datastore = datastore().await?;
                log::debug!("Firestore adapter connected to {} datastore", datastore.kind());
                Ok::<_, FirestoreAdapterError>(FirestoreConnection {
                    datastore,
                    watches: Arc::new(WatchRegistry::default()),
                })
            })
            .await?;
        if !connected {
            log::warn!("Firestore adapter already initialized; ignoring initialize()");
        }
        Ok(())
    }

    pub async fn state(&self) -> AdapterState<FirestoreConnection> {
        self.state.snapshot().await
    }

    pub async fn is_initialized(&self) -> bool {
        self.state.snapshot().await.is_ready()
    }

    async fn connection(&self) -> FirestoreResult<Arc<FirestoreConnection>> {
        self.state.connection().await.ok_or_else(not_initialized)
    }

    /// Creates the document or replaces all of its fields.
    pub async fn set(
        &self,
        collection: &str,
        id: &str,
        fields: Map<String, Value>,
    ) -> FirestoreResult<()> {
        let connection = self.connection().await?;
        let key = CollectionPath::parse(collection)?.document(id)?;
        connection
            .write(&key, connection.datastore.set_document(&key, fields))
            .await
    }

    /// Creates a document with a store-generated id and returns the id.
    pub async fn add(&self, collection: &str, fields: Map<String, Value>) -> FirestoreResult<String> {
        let connection = self.connection().await?;
        let path = CollectionPath::parse(collection)?;
        let id = connection
            .datastore
            .add_document(&path, fields)
            .await?
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                internal_error(format!("Datastore did not return an id for a new document in '{path}'"))
            })?;
        if let Ok(key) = path.document(&id) {
            connection.notify(&key).await;
        }
        Ok(id)
    }

    /// Updates only the given fields; dotted keys (`profile.city`) address
    /// nested fields. Fails with `NotFound` when the document is missing.
    pub async fn merge(
        &self,
        collection: &str,
        id: &str,
        fields: Map<String, Value>,
    ) -> FirestoreResult<()> {
        let connection = self.connection().await?;
        let key = CollectionPath::parse(collection)?.document(id)?;
        let mut updates = Vec::with_capacity(fields.len());
        for (field, value) in fields {
            updates.push((FieldPath::from_dot_separated(&field)?, value));
        }
        connection
            .write(&key, connection.datastore.update_document(&key, updates))
            .await
    }

    /// Deletes the document; nested collections are left in place.
    pub async fn remove(&self, collection: &str, id: &str) -> FirestoreResult<()> {
        let connection = self.connection().await?;
        let key = CollectionPath::parse(collection)?.document(id)?;
        connection
            .write(&key, connection.datastore.delete_document(&key))
            .await
    }

    pub async fn get_one(
        &self,
        collection: &str,
        id: &str,
    ) -> FirestoreResult<Option<FirestoreDocument>> {
        let connection = self.connection().await?;
        let key = CollectionPath::parse(collection)?.document(id)?;
        connection.datastore.get_document(&key).await
    }

    /// Like [`Self::get_one`], with every nested collection loaded into
    /// `subcollections`.
    pub async fn get_one_with_subcollections(
        &self,
        collection: &str,
        id: &str,
    ) -> FirestoreResult<Option<FirestoreDocument>> {
        let connection = self.connection().await?;
        let key = CollectionPath::parse(collection)?.document(id)?;
        let Some(mut document) = connection.datastore.get_document(&key).await? else {
            return Ok(None);
        };
        let mut subcollections = Vec::new();
        for collection_id in connection.datastore.list_collection_ids(&key).await? {
            let query = Query::new(key.child_collection(&collection_id));
            let documents = connection.datastore.run_query(&query).await?;
            subcollections.push(FirestoreCollection::new(collection_id, documents));
        }
        document.subcollections = Some(subcollections);
        Ok(Some(document))
    }

    /// Documents of `collection`, optionally refined by `modifier`.
    pub async fn get_many(
        &self,
        collection: &str,
        modifier: Option<QueryModifier>,
    ) -> FirestoreResult<Vec<FirestoreDocument>> {
        let connection = self.connection().await?;
        let query = build_query(collection, modifier)?;
        connection.datastore.run_query(&query).await
    }

    pub async fn get_collection(
        &self,
        collection: &str,
        modifier: Option<QueryModifier>,
    ) -> FirestoreResult<FirestoreCollection> {
        let connection = self.connection().await?;
        let query = build_query(collection, modifier)?;
        let documents = connection.datastore.run_query(&query).await?;
        Ok(FirestoreCollection::new(query.collection().id(), documents))
    }

    /// Streams the document: its current state first, then every change made
    /// through this adapter. `None` marks a missing document.
    pub async fn watch_one(&self, collection: &str, id: &str) -> FirestoreResult<DocumentStream> {
        let connection = self.connection().await?;
        let key = CollectionPath::parse(collection)?.document(id)?;
        let (sender, receiver) = listener_channel();
        let watch_id = connection.watches.register_document(key.clone(), sender);
        let subscription = connection.subscription(watch_id, receiver);

        let initial = connection.read(&WatchTarget::Document(key)).await?;
        connection.watches.deliver_initial(watch_id, Ok(initial));
        Ok(subscription)
    }

    /// Streams the complete result set of the query, re-evaluated after every
    /// write to the collection made through this adapter.
    pub async fn watch_many(
        &self,
        collection: &str,
        modifier: Option<QueryModifier>,
    ) -> FirestoreResult<QueryStream> {
        let connection = self.connection().await?;
        let query = build_query(collection, modifier)?;
        let (sender, receiver) = listener_channel();
        let watch_id = connection.watches.register_query(query.clone(), sender);
        let subscription = connection.subscription(watch_id, receiver);

        let initial = connection.read(&WatchTarget::Query(query)).await?;
        connection.watches.deliver_initial(watch_id, Ok(initial));
        Ok(subscription)
    }
}

impl Default for FirestoreAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FirestoreAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FirestoreAdapter").finish_non_exhaustive()
    }
}

impl FirestoreConnection {
    pub fn datastore_kind(&self) -> &'static str {
        self.datastore.kind()
    }

    /// Number of live watches.
    pub fn watch_count(&self) -> usize {
        self.watches.len()
    }

    fn subscription<T>(&self, id: u64, receiver: async_channel::Receiver<T>) -> Subscription<T> {
        let watches = Arc::clone(&self.watches);
        Subscription::new(receiver, Box::new(move || watches.remove(id)))
    }

    /// Runs `operation`, then refreshes the watches affected by `key`.
    async fn write<T, F>(&self, key: &DocumentKey, operation: F) -> FirestoreResult<T>
    where
        F: Future<Output = FirestoreResult<T>>,
    {
        let result = operation.await?;
        self.notify(key).await;
        Ok(result)
    }

    async fn notify(&self, key: &DocumentKey) {
        for (id, target) in self.watches.affected(key) {
            let snapshot = self.read(&target).await;
            self.watches.deliver(id, snapshot);
        }
    }

    async fn read(&self, target: &WatchTarget) -> FirestoreResult<Snapshot> {
        match target {
            WatchTarget::Document(key) => self
                .datastore
                .get_document(key)
                .await
                .map(Snapshot::Document),
            WatchTarget::Query(query) => self.datastore.run_query(query).await.map(Snapshot::Query),
        }
    }
}

impl fmt::Debug for FirestoreConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FirestoreConnection")
            .field("datastore", &self.datastore.kind())
            .field("watches", &self.watches.len())
            .finish()
    }
}

fn build_query(collection: &str, modifier: Option<QueryModifier>) -> FirestoreResult<Query> {
    let mut query = Query::new(CollectionPath::parse(collection)?);
    if let Some(modifier) = modifier {
        query = modifier(query);
    }
    query.validate()?;
    Ok(query)
}

fn select_datastore(
    project_id: String,
    settings: FirestoreSettings,
    auth_provider: Option<TokenProviderArc>,
) -> FirestoreResult<Arc<dyn Datastore>> {
    match settings.backend {
        FirestoreBackendKind::InMemory => Ok(Arc::new(InMemoryDatastore::new())),
        FirestoreBackendKind::Http { host, ssl } => {
            let mut builder = HttpDatastore::builder(project_id)
                .with_database(settings.database)
                .with_host(host, ssl);
            if let Some(provider) = auth_provider {
                builder = builder.with_auth_provider(provider);
            }
            let datastore = builder.build().map_err(|err| {
                internal_error(format!("Unable to connect to Firestore: {}", err.message()))
                    .with_cause(err)
            })?;
            Ok(Arc::new(datastore))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firestore::error::FirestoreAdapterErrorCode;
    use crate::firestore::query::{FilterOperator, OrderDirection};
    use futures::StreamExt;
    use serde_json::json;

    fn fields(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn options() -> FirebaseOptions {
        FirebaseOptions {
            project_id: Some("demo".into()),
            ..Default::default()
        }
    }

    async fn ready_adapter() -> FirestoreAdapter {
        let adapter = FirestoreAdapter::new();
        adapter
            .initialize_with_settings(&options(), FirestoreSettings::in_memory())
            .await
            .unwrap();
        adapter
    }

    #[tokio::test]
    async fn initialize_requires_project_id() {
        let adapter = FirestoreAdapter::new();
        let err = adapter
            .initialize_with_settings(&FirebaseOptions::default(), FirestoreSettings::in_memory())
            .await
            .unwrap_err();
        assert_eq!(err.code, FirestoreAdapterErrorCode::MissingProjectId);
        assert!(!adapter.is_initialized().await);
    }

    #[tokio::test]
    async fn http_settings_select_http_datastore() {
        let adapter = FirestoreAdapter::new();
        adapter
            .initialize_with_settings(&options(), FirestoreSettings::emulator("127.0.0.1:8080"))
            .await
            .unwrap();
        let state = adapter.state().await;
        assert_eq!(state.connection().unwrap().datastore_kind(), "http");
    }

    #[tokio::test]
    async fn operations_fail_before_initialize() {
        let adapter = FirestoreAdapter::new();
        let err = adapter.get_one("users", "u1").await.unwrap_err();
        assert_eq!(err.code, FirestoreAdapterErrorCode::NotInitialized);
        assert!(adapter.watch_many("users", None).await.is_err());
    }

    #[tokio::test]
    async fn invalid_addresses_are_rejected() {
        let adapter = ready_adapter().await;
        let err = adapter.get_one("users/u1", "x").await.unwrap_err();
        assert_eq!(err.code, FirestoreAdapterErrorCode::InvalidArgument);
        let err = adapter.set("users", "", Map::new()).await.unwrap_err();
        assert_eq!(err.code, FirestoreAdapterErrorCode::InvalidArgument);
        let err = adapter.set("users", "a/b", Map::new()).await.unwrap_err();
        assert_eq!(err.code, FirestoreAdapterErrorCode::InvalidArgument);
    }

    #[tokio::test]
    async fn merge_updates_nested_fields() {
        let adapter = ready_adapter().await;
        adapter
            .set("users", "u1", fields(json!({"name": "Ada", "profile": {"city": "London"}})))
            .await
            .unwrap();
        adapter
            .merge("users", "u1", fields(json!({"profile.zip": "N1", "age": 36})))
            .await
            .unwrap();
        let document = adapter.get_one("users", "u1").await.unwrap().unwrap();
        assert_eq!(
            Value::Object(document.data.unwrap()),
            json!({"name": "Ada", "age": 36, "profile": {"city": "London", "zip": "N1"}})
        );
    }

    #[tokio::test]
    async fn get_many_applies_modifier() {
        let adapter = ready_adapter().await;
        for (id, age) in [("a", 30), ("b", 17), ("c", 45)] {
            adapter
                .set("users", id, fields(json!({ "age": age })))
                .await
                .unwrap();
        }
        let adults = adapter
            .get_collection(
                "users",
                Some(Box::new(|query: Query| {
                    query
                        .where_field("age", FilterOperator::GreaterThanOrEqual, 18)
                        .order_by("age", OrderDirection::Descending)
                })),
            )
            .await
            .unwrap();
        assert_eq!(adults.name, "users");
        let ids: Vec<&str> = adults.documents.iter().map(FirestoreDocument::id).collect();
        assert_eq!(ids, vec!["c", "a"]);

        let err = adapter
            .get_many("users", Some(Box::new(|query: Query| query.limit(0))))
            .await
            .unwrap_err();
        assert_eq!(err.code, FirestoreAdapterErrorCode::InvalidArgument);
    }

    #[tokio::test]
    async fn subcollections_are_loaded_on_request() {
        let adapter = ready_adapter().await;
        adapter.set("users", "u1", fields(json!({"name": "Ada"}))).await.unwrap();
        adapter
            .set("users/u1/posts", "p1", fields(json!({"title": "Notes"})))
            .await
            .unwrap();

        let plain = adapter.get_one("users", "u1").await.unwrap().unwrap();
        assert!(plain.subcollections.is_none());

        let rich = adapter
            .get_one_with_subcollections("users", "u1")
            .await
            .unwrap()
            .unwrap();
        let subcollections = rich.subcollections.unwrap();
        assert_eq!(subcollections.len(), 1);
        assert_eq!(subcollections[0].name, "posts");
        assert_eq!(subcollections[0].documents[0].id(), "p1");

        adapter.remove("users", "u1").await.unwrap();
        assert!(adapter.get_one("users", "u1").await.unwrap().is_none());
        assert!(adapter.get_one("users/u1/posts", "p1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn watch_one_follows_writes() {
        let adapter = ready_adapter().await;
        let mut stream = adapter.watch_one("users", "u1").await.unwrap();
        assert_eq!(stream.next().await.unwrap().unwrap(), None);

        adapter.set("users", "u1", fields(json!({"n": 1}))).await.unwrap();
        adapter.set("users", "u2", fields(json!({"n": 9}))).await.unwrap();
        adapter.merge("users", "u1", fields(json!({"n": 2}))).await.unwrap();
        adapter.remove("users", "u1").await.unwrap();

        let first = stream.next().await.unwrap().unwrap().unwrap();
        assert_eq!(first.get("n"), Some(&json!(1)));
        let second = stream.next().await.unwrap().unwrap().unwrap();
        assert_eq!(second.get("n"), Some(&json!(2)));
        assert_eq!(stream.next().await.unwrap().unwrap(), None);
        assert_eq!(stream.pending(), 0);
    }

    #[tokio::test]
    async fn dropping_watch_releases_it() {
        let adapter = ready_adapter().await;
        let stream = adapter.watch_many("users", None).await.unwrap();
        let state = adapter.state().await;
        let connection = state.connection().unwrap();
        assert_eq!(connection.watch_count(), 1);
        drop(stream);
        assert_eq!(connection.watch_count(), 0);
    }
}
