use std::fmt;

use serde_json::{Map, Value};

use crate::firestore::error::{invalid_argument, FirestoreResult};

/// Slash-separated path of a collection, e.g. `users` or `users/u1/posts`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionPath {
    segments: Vec<String>,
}

impl CollectionPath {
    pub fn parse(path: &str) -> FirestoreResult<Self> {
        let segments = split_segments(path)?;
        if segments.len() % 2 == 0 {
            return Err(invalid_argument(format!(
                "Collection path '{path}' must have an odd number of segments"
            )));
        }
        Ok(Self { segments })
    }

    /// Collection id (last segment).
    pub fn id(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or_default()
    }

    /// Path of the document that owns this collection, empty for root
    /// collections.
    pub fn parent(&self) -> &[String] {
        &self.segments[..self.segments.len() - 1]
    }

    pub fn canonical_string(&self) -> String {
        self.segments.join("/")
    }

    pub fn document(&self, id: &str) -> FirestoreResult<DocumentKey> {
        validate_document_id(id)?;
        Ok(DocumentKey {
            collection: self.clone(),
            id: id.to_string(),
        })
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical_string())
    }
}

/// Address of one document: its collection plus an id.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentKey {
    collection: CollectionPath,
    id: String,
}

impl DocumentKey {
    /// Parses `collection/.../id`.
    pub fn from_string(path: &str) -> FirestoreResult<Self> {
        let mut segments = split_segments(path)?;
        if segments.len() % 2 != 0 {
            return Err(invalid_argument(format!(
                "Document path '{path}' must have an even number of segments"
            )));
        }
        let id = segments.pop().unwrap_or_default();
        Ok(Self {
            collection: CollectionPath { segments },
            id,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn collection(&self) -> &CollectionPath {
        &self.collection
    }

    pub fn canonical_string(&self) -> String {
        format!("{}/{}", self.collection.canonical_string(), self.id)
    }

    /// Child collection `collection_id` of this document.
    pub fn child_collection(&self, collection_id: &str) -> CollectionPath {
        let mut segments = self.collection.segments.clone();
        segments.push(self.id.clone());
        segments.push(collection_id.to_string());
        CollectionPath { segments }
    }
}

pub(crate) fn validate_document_id(id: &str) -> FirestoreResult<()> {
    if id.is_empty() {
        return Err(invalid_argument("Document id cannot be empty"));
    }
    if id.contains('/') {
        return Err(invalid_argument(format!(
            "Document id '{id}' cannot contain '/'"
        )));
    }
    if id == "." || id == ".." || (id.starts_with("__") && id.ends_with("__")) {
        return Err(invalid_argument(format!("Document id '{id}' is reserved")));
    }
    Ok(())
}

fn split_segments(path: &str) -> FirestoreResult<Vec<String>> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return Err(invalid_argument("Firestore path cannot be empty"));
    }
    trimmed
        .split('/')
        .map(|segment| {
            if segment.is_empty() {
                Err(invalid_argument(format!(
                    "Firestore path '{path}' contains an empty segment"
                )))
            } else {
                Ok(segment.to_string())
            }
        })
        .collect()
}

/// Dotted path to a (possibly nested) field.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FieldPath {
    segments: Vec<String>,
}

impl FieldPath {
    pub fn from_dot_separated(path: &str) -> FirestoreResult<Self> {
        if path.trim().is_empty() {
            return Err(invalid_argument("Field path cannot be empty"));
        }
        let segments: Vec<String> = path.split('.').map(str::to_string).collect();
        if segments.iter().any(String::is_empty) {
            return Err(invalid_argument(format!(
                "Field path '{path}' contains an empty segment"
            )));
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Canonical form for update masks and structured queries; segments that
    /// are not simple identifiers are backtick-quoted.
    pub fn canonical_string(&self) -> String {
        self.segments
            .iter()
            .map(|segment| {
                let simple = segment
                    .chars()
                    .next()
                    .is_some_and(|first| first.is_ascii_alphabetic() || first == '_')
                    && segment
                        .chars()
                        .all(|ch| ch.is_ascii_alphanumeric() || ch == '_');
                if simple {
                    segment.clone()
                } else {
                    format!("`{}`", segment.replace('\\', "\\\\").replace('`', "\\`"))
                }
            })
            .collect::<Vec<_>>()
            .join(".")
    }
}

pub(crate) fn value_for_field_path<'a>(
    fields: &'a Map<String, Value>,
    path: &FieldPath,
) -> Option<&'a Value> {
    let (first, rest) = path.segments().split_first()?;
    rest.iter()
        .try_fold(fields.get(first)?, |current, segment| current.as_object()?.get(segment))
}

pub(crate) fn set_value_at_field_path(
    fields: &mut Map<String, Value>,
    path: &FieldPath,
    value: Value,
) {
    let Some((last, parents)) = path.segments().split_last() else {
        return;
    };
    let mut current = fields;
    for segment in parents {
        let entry = current
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        let Value::Object(next) = entry else {
            return;
        };
        current = next;
    }
    current.insert(last.clone(), value);
}
