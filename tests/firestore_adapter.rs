use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use firebase_adapters::app::FirebaseOptions;
use firebase_adapters::firestore::{
    CollectionPath, Datastore, DocumentKey, FieldPath, FilterOperator, FirestoreAdapter,
    FirestoreAdapterErrorCode, FirestoreDocument, FirestoreResult, FirestoreSettings,
    InMemoryDatastore, OrderDirection, Query,
};
use futures::StreamExt;
use serde_json::{json, Map, Value};

fn options() -> FirebaseOptions {
    FirebaseOptions {
        project_id: Some("demo-project".into()),
        ..Default::default()
    }
}

fn fields(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
}

/// Datastore that counts requests and delegates to an in-memory store.
struct CountingDatastore {
    inner: InMemoryDatastore,
    calls: AtomicUsize,
}

impl CountingDatastore {
    fn new() -> Self {
        Self {
            inner: InMemoryDatastore::new(),
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn hit(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Datastore for CountingDatastore {
    async fn get_document(&self, key: &DocumentKey) -> FirestoreResult<Option<FirestoreDocument>> {
        self.hit();
        self.inner.get_document(key).await
    }

    async fn set_document(
        &self,
        key: &DocumentKey,
        fields: Map<String, Value>,
    ) -> FirestoreResult<()> {
        self.hit();
        self.inner.set_document(key, fields).await
    }

    async fn add_document(
        &self,
        collection: &CollectionPath,
        fields: Map<String, Value>,
    ) -> FirestoreResult<Option<String>> {
        self.hit();
        self.inner.add_document(collection, fields).await
    }

    async fn update_document(
        &self,
        key: &DocumentKey,
        updates: Vec<(FieldPath, Value)>,
    ) -> FirestoreResult<()> {
        self.hit();
        self.inner.update_document(key, updates).await
    }

    async fn delete_document(&self, key: &DocumentKey) -> FirestoreResult<()> {
        self.hit();
        self.inner.delete_document(key).await
    }

    async fn run_query(&self, query: &Query) -> FirestoreResult<Vec<FirestoreDocument>> {
        self.hit();
        self.inner.run_query(query).await
    }

    async fn list_collection_ids(&self, key: &DocumentKey) -> FirestoreResult<Vec<String>> {
        self.hit();
        self.inner.list_collection_ids(key).await
    }

    fn kind(&self) -> &'static str {
        "counting"
    }
}

async fn in_memory_adapter() -> FirestoreAdapter {
    let adapter = FirestoreAdapter::new();
    adapter
        .initialize_with_settings(&options(), FirestoreSettings::in_memory())
        .await
        .unwrap();
    adapter
}

#[tokio::test]
async fn set_merge_remove_lifecycle() {
    let adapter = in_memory_adapter().await;
    adapter
        .set("users", "u1", fields(json!({"name": "An", "age": 30})))
        .await
        .unwrap();

    let document = adapter.get_one("users", "u1").await.unwrap().unwrap();
    assert_eq!(document.id(), "u1");
    assert_eq!(document.data(), Some(&fields(json!({"name": "An", "age": 30}))));

    adapter
        .merge("users", "u1", fields(json!({"age": 31})))
        .await
        .unwrap();
    let document = adapter.get_one("users", "u1").await.unwrap().unwrap();
    assert_eq!(document.data(), Some(&fields(json!({"name": "An", "age": 31}))));

    adapter.remove("users", "u1").await.unwrap();
    assert!(adapter.get_one("users", "u1").await.unwrap().is_none());
}

#[tokio::test]
async fn get_many_returns_every_document_once() {
    let adapter = in_memory_adapter().await;
    for (id, age) in [("a", 20), ("b", 35), ("c", 50)] {
        adapter
            .set("users", id, fields(json!({"age": age})))
            .await
            .unwrap();
    }
    adapter
        .set("teams", "t1", fields(json!({"age": 1})))
        .await
        .unwrap();

    let all = adapter.get_many("users", None).await.unwrap();
    let ids: HashSet<String> = all.iter().map(|doc| doc.id().to_string()).collect();
    assert_eq!(ids, HashSet::from(["a".into(), "b".into(), "c".into()]));

    let older = adapter
        .get_many(
            "users",
            Some(Box::new(|query: Query| {
                query
                    .where_field("age", FilterOperator::GreaterThan, 25)
                    .order_by("age", OrderDirection::Descending)
                    .limit(1)
            })),
        )
        .await
        .unwrap();
    assert_eq!(older.len(), 1);
    assert_eq!(older[0].id(), "c");

    let collection = adapter.get_collection("users", None).await.unwrap();
    assert_eq!(collection.name, "users");
    assert_eq!(collection.len(), 3);
}

#[tokio::test]
async fn merge_on_missing_document_is_not_found() {
    let adapter = in_memory_adapter().await;
    let err = adapter
        .merge("users", "ghost", fields(json!({"age": 1})))
        .await
        .unwrap_err();
    assert_eq!(err.code, FirestoreAdapterErrorCode::NotFound);
    assert!(adapter.get_one("users", "ghost").await.unwrap().is_none());
}

#[tokio::test]
async fn added_documents_get_unique_ids() {
    let adapter = in_memory_adapter().await;
    let mut ids = HashSet::new();
    for index in 0..100 {
        let id = adapter
            .add("events", fields(json!({"seq": index})))
            .await
            .unwrap();
        assert!(!id.is_empty());
        ids.insert(id);
    }
    assert_eq!(ids.len(), 100);
    assert_eq!(adapter.get_many("events", None).await.unwrap().len(), 100);
}

#[tokio::test]
async fn watch_many_follows_writes() {
    let adapter = in_memory_adapter().await;
    adapter
        .set("tasks", "t1", fields(json!({"done": false})))
        .await
        .unwrap();

    let mut open = adapter
        .watch_many(
            "tasks",
            Some(Box::new(|query: Query| {
                query.where_field("done", FilterOperator::Equal, false)
            })),
        )
        .await
        .unwrap();
    let initial = open.next().await.unwrap().unwrap();
    assert_eq!(initial.len(), 1);

    adapter
        .set("tasks", "t2", fields(json!({"done": false})))
        .await
        .unwrap();
    let after_add = open.next().await.unwrap().unwrap();
    assert_eq!(after_add.len(), 2);

    adapter
        .merge("tasks", "t1", fields(json!({"done": true})))
        .await
        .unwrap();
    let after_merge = open.next().await.unwrap().unwrap();
    assert_eq!(after_merge.len(), 1);
    assert_eq!(after_merge[0].id(), "t2");

    // Writes elsewhere do not produce a snapshot.
    adapter
        .set("notes", "n1", fields(json!({"done": false})))
        .await
        .unwrap();
    assert_eq!(open.pending(), 0);

    let state = adapter.state().await;
    assert_eq!(state.connection().unwrap().watch_count(), 1);
    drop(open);
    assert_eq!(state.connection().unwrap().watch_count(), 0);
}

#[tokio::test]
async fn watch_one_reports_removal() {
    let adapter = in_memory_adapter().await;
    adapter
        .set("users", "u1", fields(json!({"name": "An"})))
        .await
        .unwrap();
    let mut watch = adapter.watch_one("users", "u1").await.unwrap();
    assert!(watch.next().await.unwrap().unwrap().is_some());

    adapter.remove("users", "u1").await.unwrap();
    assert!(watch.next().await.unwrap().unwrap().is_none());
}

#[tokio::test]
async fn operations_before_initialize_never_reach_datastore() {
    let datastore = Arc::new(CountingDatastore::new());
    let adapter = FirestoreAdapter::new();

    let err = adapter.get_one("users", "u1").await.unwrap_err();
    assert_eq!(err.code, FirestoreAdapterErrorCode::NotInitialized);
    assert!(adapter.set("users", "u1", Map::new()).await.is_err());
    assert!(adapter.add("users", Map::new()).await.is_err());
    assert!(adapter.merge("users", "u1", Map::new()).await.is_err());
    assert!(adapter.remove("users", "u1").await.is_err());
    assert!(adapter.get_many("users", None).await.is_err());
    assert!(adapter.get_one_with_subcollections("users", "u1").await.is_err());
    assert!(adapter.watch_one("users", "u1").await.is_err());
    assert!(adapter.watch_many("users", None).await.is_err());
    assert!(!adapter.is_initialized().await);
    assert_eq!(datastore.calls(), 0);

    adapter.initialize_with_datastore(datastore.clone()).await.unwrap();
    adapter.get_one("users", "u1").await.unwrap();
    assert_eq!(datastore.calls(), 1);
}

#[tokio::test]
async fn second_initialize_is_a_no_op() {
    let datastore = Arc::new(CountingDatastore::new());
    let adapter = FirestoreAdapter::new();
    adapter.initialize_with_datastore(datastore.clone()).await.unwrap();

    adapter.initialize(&FirebaseOptions::default()).await.unwrap();
    adapter
        .initialize_with_settings(&options(), FirestoreSettings::in_memory())
        .await
        .unwrap();

    let state = adapter.state().await;
    assert_eq!(state.connection().unwrap().datastore_kind(), "counting");
    adapter
        .set("users", "u1", fields(json!({"name": "An"})))
        .await
        .unwrap();
    assert_eq!(datastore.calls(), 1);
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
