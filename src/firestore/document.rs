use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::firestore::error::{invalid_argument, FirestoreResult};

/// A document read from the store.
///
/// `data` is `None` only when the store reports the document without any
/// field map; a document with no fields normally carries an empty map.
#[derive(Clone, Debug, PartialEq)]
pub struct FirestoreDocument {
    pub id: String,
    pub data: Option<Map<String, Value>>,
    /// Filled by [`FirestoreAdapter::get_one_with_subcollections`](crate::firestore::FirestoreAdapter::get_one_with_subcollections).
    pub subcollections: Option<Vec<FirestoreCollection>>,
}

impl FirestoreDocument {
    pub fn new(id: impl Into<String>, data: Option<Map<String, Value>>) -> Self {
        Self {
            id: id.into(),
            data,
            subcollections: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn data(&self) -> Option<&Map<String, Value>> {
        self.data.as_ref()
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.data.as_ref()?.get(field)
    }

    /// Deserializes the field map into `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> FirestoreResult<T> {
        let fields = self.data.clone().unwrap_or_default();
        serde_json::from_value(Value::Object(fields)).map_err(|err| {
            invalid_argument(format!(
                "Document '{}' does not match the requested type: {err}",
                self.id
            ))
            .with_cause(err)
        })
    }
}

/// Documents of one collection, in the order the store returned them.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FirestoreCollection {
    pub name: String,
    pub documents: Vec<FirestoreDocument>,
}

impl FirestoreCollection {
    pub fn new(name: impl Into<String>, documents: Vec<FirestoreDocument>) -> Self {
        Self {
            name: name.into(),
            documents,
        }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}
