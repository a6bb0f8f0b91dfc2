use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::{Map, Value};

use crate::firestore::document::FirestoreDocument;
use crate::firestore::error::{not_found, FirestoreResult};
use crate::firestore::model::{set_value_at_field_path, CollectionPath, DocumentKey, FieldPath};
use crate::firestore::query::Query;
use crate::firestore::query_evaluator::apply_query_to_documents;

use super::Datastore;

const AUTO_ID_LENGTH: usize = 20;

/// Process-local store; documents live as long as the datastore.
#[derive(Clone, Default)]
pub struct InMemoryDatastore {
    documents: Arc<Mutex<BTreeMap<DocumentKey, Map<String, Value>>>>,
}

impl InMemoryDatastore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents across all collections.
    pub fn len(&self) -> usize {
        self.documents.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for InMemoryDatastore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryDatastore")
            .field("documents", &self.len())
            .finish()
    }
}

pub(crate) fn generate_auto_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(AUTO_ID_LENGTH)
        .map(char::from)
        .collect()
}

#[async_trait]
impl Datastore for InMemoryDatastore {
    async fn get_document(&self, key: &DocumentKey) -> FirestoreResult<Option<FirestoreDocument>> {
        let store = self.documents.lock().unwrap();
        Ok(store
            .get(key)
            .map(|fields| FirestoreDocument::new(key.id(), Some(fields.clone()))))
    }

    async fn set_document(
        &self,
        key: &DocumentKey,
        fields: Map<String, Value>,
    ) -> FirestoreResult<()> {
        self.documents.lock().unwrap().insert(key.clone(), fields);
        Ok(())
    }

    async fn add_document(
        &self,
        collection: &CollectionPath,
        fields: Map<String, Value>,
    ) -> FirestoreResult<Option<String>> {
        let mut store = self.documents.lock().unwrap();
        loop {
            let key = collection.document(&generate_auto_id())?;
            if !store.contains_key(&key) {
                let id = key.id().to_string();
                store.insert(key, fields);
                return Ok(Some(id));
            }
        }
    }

    async fn update_document(
        &self,
        key: &DocumentKey,
        updates: Vec<(FieldPath, Value)>,
    ) -> FirestoreResult<()> {
        let mut store = self.documents.lock().unwrap();
        let fields = store.get_mut(key).ok_or_else(|| {
            not_found(format!("Document {} does not exist", key.canonical_string()))
        })?;
        for (path, value) in updates {
            set_value_at_field_path(fields, &path, value);
        }
        Ok(())
    }

    async fn delete_document(&self, key: &DocumentKey) -> FirestoreResult<()> {
        self.documents.lock().unwrap().remove(key);
        Ok(())
    }

    async fn run_query(&self, query: &Query) -> FirestoreResult<Vec<FirestoreDocument>> {
        query.validate()?;
        let candidates: Vec<FirestoreDocument> = {
            let store = self.documents.lock().unwrap();
            store
                .iter()
                .filter(|(key, _)| key.collection() == query.collection())
                .map(|(key, fields)| FirestoreDocument::new(key.id(), Some(fields.clone())))
                .collect()
        };
        Ok(apply_query_to_documents(candidates, query))
    }

    async fn list_collection_ids(&self, key: &DocumentKey) -> FirestoreResult<Vec<String>> {
        let prefix = format!("{}/", key.canonical_string());
        let store = self.documents.lock().unwrap();
        let ids: BTreeSet<String> = store
            .keys()
            .filter_map(|stored| {
                let collection = stored.collection().canonical_string();
                let nested = collection.strip_prefix(&prefix)?;
                nested.split('/').next().map(str::to_string)
            })
            .collect();
        Ok(ids.into_iter().collect())
    }

    fn kind(&self) -> &'static str {
        "in-memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firestore::error::FirestoreAdapterErrorCode;
    use crate::firestore::query::{FilterOperator, OrderDirection};
    use serde_json::json;

    fn fields(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn set_get_and_delete() {
        let store = InMemoryDatastore::new();
        let key = DocumentKey::from_string("users/u1").unwrap();
        assert!(store.get_document(&key).await.unwrap().is_none());

        store
            .set_document(&key, fields(json!({"name": "Ada"})))
            .await
            .unwrap();
        let document = store.get_document(&key).await.unwrap().unwrap();
        assert_eq!(document.id(), "u1");
        assert_eq!(document.get("name"), Some(&json!("Ada")));

        store.delete_document(&key).await.unwrap();
        assert!(store.get_document(&key).await.unwrap().is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn update_requires_existing_document() {
        let store = InMemoryDatastore::new();
        let key = DocumentKey::from_string("users/u1").unwrap();
        let updates = vec![(FieldPath::from_dot_separated("age").unwrap(), json!(1))];

        let err = store
            .update_document(&key, updates.clone())
            .await
            .unwrap_err();
        assert_eq!(err.code, FirestoreAdapterErrorCode::NotFound);

        store
            .set_document(&key, fields(json!({"name": "Ada", "profile": {"city": "London"}})))
            .await
            .unwrap();
        store
            .update_document(
                &key,
                vec![
                    (FieldPath::from_dot_separated("age").unwrap(), json!(37)),
                    (FieldPath::from_dot_separated("profile.zip").unwrap(), json!("N1")),
                ],
            )
            .await
            .unwrap();
        let document = store.get_document(&key).await.unwrap().unwrap();
        assert_eq!(
            Value::Object(document.data.unwrap()),
            json!({"name": "Ada", "age": 37, "profile": {"city": "London", "zip": "N1"}})
        );
    }

    #[tokio::test]
    async fn add_generates_twenty_character_ids() {
        let store = InMemoryDatastore::new();
        let users = CollectionPath::parse("users").unwrap();
        let id = store
            .add_document(&users, fields(json!({"n": 1})))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(id.len(), AUTO_ID_LENGTH);
        assert!(id.chars().all(|ch| ch.is_ascii_alphanumeric()));
    }

    #[tokio::test]
    async fn queries_stay_within_collection() {
        let store = InMemoryDatastore::new();
        for (path, age) in [("users/a", 30), ("users/b", 20), ("users/a/pets/p", 5), ("admins/c", 40)] {
            let key = DocumentKey::from_string(path).unwrap();
            store
                .set_document(&key, fields(json!({ "age": age })))
                .await
                .unwrap();
        }

        let users = CollectionPath::parse("users").unwrap();
        let query = Query::new(users)
            .where_field("age", FilterOperator::GreaterThan, 10)
            .order_by("age", OrderDirection::Ascending);
        let ids: Vec<String> = store
            .run_query(&query)
            .await
            .unwrap()
            .into_iter()
            .map(|document| document.id)
            .collect();
        assert_eq!(ids, vec!["b", "a"]);

        let invalid = Query::new(CollectionPath::parse("users").unwrap()).limit(0);
        assert!(store.run_query(&invalid).await.is_err());
    }

    #[tokio::test]
    async fn lists_nested_collection_ids() {
        let store = InMemoryDatastore::new();
        for path in ["users/u1/posts/p1", "users/u1/posts/p2/comments/c1", "users/u1/likes/l1", "users/u2/posts/p3"] {
            let key = DocumentKey::from_string(path).unwrap();
            store.set_document(&key, Map::new()).await.unwrap();
        }
        let u1 = DocumentKey::from_string("users/u1").unwrap();
        assert_eq!(
            store.list_collection_ids(&u1).await.unwrap(),
            vec!["likes".to_string(), "posts".to_string()]
        );
    }
}
