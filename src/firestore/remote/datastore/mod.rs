use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::firestore::document::FirestoreDocument;
use crate::firestore::error::FirestoreResult;
use crate::firestore::model::{CollectionPath, DocumentKey, FieldPath};
use crate::firestore::query::Query;

pub mod http;
pub mod in_memory;

/// Document storage behind a [`FirestoreAdapter`](crate::firestore::FirestoreAdapter).
///
/// Each method maps to one request against the store.
#[async_trait]
pub trait Datastore: Send + Sync + 'static {
    /// `None` when the document does not exist.
    async fn get_document(&self, key: &DocumentKey) -> FirestoreResult<Option<FirestoreDocument>>;

    /// Creates or fully overwrites the document.
    async fn set_document(&self, key: &DocumentKey, fields: Map<String, Value>)
        -> FirestoreResult<()>;

    /// Creates a document with a store-generated id and returns that id.
    async fn add_document(
        &self,
        collection: &CollectionPath,
        fields: Map<String, Value>,
    ) -> FirestoreResult<Option<String>>;

    /// Sets the given fields of an existing document; `NotFound` when it is
    /// missing.
    async fn update_document(
        &self,
        key: &DocumentKey,
        updates: Vec<(FieldPath, Value)>,
    ) -> FirestoreResult<()>;

    async fn delete_document(&self, key: &DocumentKey) -> FirestoreResult<()>;

    async fn run_query(&self, query: &Query) -> FirestoreResult<Vec<FirestoreDocument>>;

    /// Ids of the collections nested directly under `key`.
    async fn list_collection_ids(&self, key: &DocumentKey) -> FirestoreResult<Vec<String>>;

    /// Short label used in logs.
    fn kind(&self) -> &'static str;
}

pub use http::{HttpDatastore, HttpDatastoreBuilder};
pub use in_memory::InMemoryDatastore;
