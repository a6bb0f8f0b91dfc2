use std::str::FromStr;

use serde_json::{json, Map, Number, Value};

use crate::firestore::document::FirestoreDocument;
use crate::firestore::error::{invalid_argument, FirestoreResult};
use crate::firestore::model::{set_value_at_field_path, CollectionPath, DocumentKey, FieldPath};
use crate::firestore::query::{FieldFilter, Query};

/// Converts between plain JSON field maps and the typed values of the
/// Firestore v1 REST API.
#[derive(Clone, Debug)]
pub struct RestSerializer {
    project_id: String,
    database: String,
}

impl RestSerializer {
    pub fn new(project_id: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            database: database.into(),
        }
    }

    pub fn database_name(&self) -> String {
        format!("projects/{}/databases/{}", self.project_id, self.database)
    }

    pub fn document_name(&self, key: &DocumentKey) -> String {
        format!(
            "{}/documents/{}",
            self.database_name(),
            key.canonical_string()
        )
    }

    pub fn encode_fields(&self, fields: &Map<String, Value>) -> Value {
        Value::Object(encode_map_fields(fields))
    }

    pub fn encode_set_write(&self, key: &DocumentKey, fields: &Map<String, Value>) -> Value {
        json!({
            "update": {
                "name": self.document_name(key),
                "fields": encode_map_fields(fields),
            }
        })
    }

    /// Update write touching only `updates`; fails server side when the
    /// document does not exist.
    pub fn encode_update_write(&self, key: &DocumentKey, updates: &[(FieldPath, Value)]) -> Value {
        let mut fields = Map::new();
        for (path, value) in updates {
            set_value_at_field_path(&mut fields, path, value.clone());
        }
        let mask: Vec<String> = updates
            .iter()
            .map(|(path, _)| path.canonical_string())
            .collect();
        json!({
            "update": {
                "name": self.document_name(key),
                "fields": encode_map_fields(&fields),
            },
            "updateMask": { "fieldPaths": mask },
            "currentDocument": { "exists": true },
        })
    }

    pub fn encode_delete_write(&self, key: &DocumentKey) -> Value {
        json!({ "delete": self.document_name(key) })
    }

    /// `structuredQuery` body for `query`, scoped to its collection id under
    /// the parent returned by [`Self::query_parent`].
    pub fn encode_structured_query(&self, query: &Query) -> Value {
        let mut structured = Map::new();
        structured.insert(
            "from".to_string(),
            json!([{ "collectionId": query.collection().id() }]),
        );

        let filters: Vec<Value> = query.filters().iter().map(encode_field_filter).collect();
        match filters.len() {
            0 => {}
            1 => {
                structured.insert("where".to_string(), filters[0].clone());
            }
            _ => {
                structured.insert(
                    "where".to_string(),
                    json!({ "compositeFilter": { "op": "AND", "filters": filters } }),
                );
            }
        }

        if !query.order_by_clauses().is_empty() {
            let orders: Vec<Value> = query
                .order_by_clauses()
                .iter()
                .map(|order| {
                    json!({
                        "field": { "fieldPath": order.field().canonical_string() },
                        "direction": order.direction().as_str(),
                    })
                })
                .collect();
            structured.insert("orderBy".to_string(), Value::Array(orders));
        }

        if let Some(limit) = query.limit_value() {
            structured.insert("limit".to_string(), json!(limit));
        }

        json!({ "structuredQuery": structured })
    }

    /// Relative resource path that owns `collection`: `documents` for root
    /// collections, `documents/{parent}` otherwise.
    pub fn query_parent(&self, collection: &CollectionPath) -> String {
        if collection.parent().is_empty() {
            "documents".to_string()
        } else {
            format!("documents/{}", collection.parent().join("/"))
        }
    }

    pub fn decode_document(&self, value: &Value) -> FirestoreResult<FirestoreDocument> {
        let name = value
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid_argument("Document is missing its 'name'"))?;
        let id = document_id_from_name(name)?;
        let fields = match value.get("fields") {
            Some(fields) => decode_map_fields(fields)?,
            None => Map::new(),
        };
        Ok(FirestoreDocument::new(id, Some(fields)))
    }

    pub fn decode_value(&self, value: &Value) -> FirestoreResult<Value> {
        decode_value(value)
    }
}

fn document_id_from_name(name: &str) -> FirestoreResult<String> {
    let (_, path) = name
        .split_once("/documents/")
        .ok_or_else(|| invalid_argument(format!("Invalid document name '{name}'")))?;
    let key = DocumentKey::from_string(path)?;
    Ok(key.id().to_string())
}

fn encode_field_filter(filter: &FieldFilter) -> Value {
    json!({
        "fieldFilter": {
            "field": { "fieldPath": filter.field().canonical_string() },
            "op": filter.operator().as_str(),
            "value": encode_value(filter.value()),
        }
    })
}

fn encode_map_fields(fields: &Map<String, Value>) -> Map<String, Value> {
    fields
        .iter()
        .map(|(key, value)| (key.clone(), encode_value(value)))
        .collect()
}

fn encode_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": Value::Null }),
        Value::Bool(boolean) => json!({ "booleanValue": boolean }),
        Value::Number(number) => {
            if let Some(integer) = number.as_i64() {
                json!({ "integerValue": integer.to_string() })
            } else {
                json!({ "doubleValue": number.as_f64().unwrap_or_default() })
            }
        }
        Value::String(string) => json!({ "stringValue": string }),
        Value::Array(values) => {
            let values: Vec<Value> = values.iter().map(encode_value).collect();
            json!({ "arrayValue": { "values": values } })
        }
        Value::Object(fields) => json!({
            "mapValue": { "fields": encode_map_fields(fields) }
        }),
    }
}

fn decode_map_fields(value: &Value) -> FirestoreResult<Map<String, Value>> {
    let fields = value
        .as_object()
        .ok_or_else(|| invalid_argument("Expected 'fields' to be an object"))?;
    let mut decoded = Map::new();
    for (key, value) in fields {
        decoded.insert(key.clone(), decode_value(value)?);
    }
    Ok(decoded)
}

fn decode_value(value: &Value) -> FirestoreResult<Value> {
    let object = value
        .as_object()
        .ok_or_else(|| invalid_argument("Expected Firestore value object"))?;

    if object.contains_key("nullValue") {
        return Ok(Value::Null);
    }
    if let Some(boolean) = object.get("booleanValue") {
        let boolean = boolean
            .as_bool()
            .ok_or_else(|| invalid_argument("booleanValue must be bool"))?;
        return Ok(Value::Bool(boolean));
    }
    if let Some(integer) = object.get("integerValue") {
        let parsed = match integer {
            Value::String(raw) => i64::from_str(raw)
                .map_err(|err| invalid_argument(format!("Invalid integerValue: {err}")))?,
            Value::Number(number) => number
                .as_i64()
                .ok_or_else(|| invalid_argument("Integer out of range"))?,
            _ => return Err(invalid_argument("integerValue must be a string or number")),
        };
        return Ok(Value::from(parsed));
    }
    if let Some(double) = object.get("doubleValue") {
        let parsed = match double {
            Value::Number(number) => number
                .as_f64()
                .ok_or_else(|| invalid_argument("Invalid doubleValue"))?,
            Value::String(raw) => raw
                .parse::<f64>()
                .map_err(|err| invalid_argument(format!("Invalid doubleValue: {err}")))?,
            _ => return Err(invalid_argument("doubleValue must be a number or string")),
        };
        // NaN and infinities have no JSON form.
        return Ok(Number::from_f64(parsed).map_or(Value::Null, Value::Number));
    }
    for key in ["stringValue", "timestampValue", "referenceValue", "bytesValue"] {
        if let Some(string) = object.get(key) {
            let string = string
                .as_str()
                .ok_or_else(|| invalid_argument(format!("{key} must be string")))?;
            return Ok(Value::String(string.to_string()));
        }
    }
    if let Some(point) = object.get("geoPointValue") {
        let coordinate = |name: &str| {
            point
                .get(name)
                .and_then(Value::as_f64)
                .unwrap_or_default()
        };
        return Ok(json!({
            "latitude": coordinate("latitude"),
            "longitude": coordinate("longitude"),
        }));
    }
    if let Some(array) = object.get("arrayValue") {
        let values = match array.get("values").and_then(Value::as_array) {
            Some(entries) => entries
                .iter()
                .map(decode_value)
                .collect::<FirestoreResult<Vec<_>>>()?,
            None => Vec::new(),
        };
        return Ok(Value::Array(values));
    }
    if let Some(map) = object.get("mapValue") {
        let fields = match map.get("fields") {
            Some(fields) => decode_map_fields(fields)?,
            None => Map::new(),
        };
        return Ok(Value::Object(fields));
    }

    Err(invalid_argument("Unknown Firestore value type"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firestore::query::{FilterOperator, OrderDirection};

    fn serializer() -> RestSerializer {
        RestSerializer::new("demo", "(default)")
    }

    #[test]
    fn encodes_every_json_kind() {
        let fields = json!({
            "nothing": null,
            "flag": true,
            "count": 42,
            "ratio": 0.5,
            "name": "Ada",
            "tags": ["a", 1],
            "profile": {"city": "London"}
        });
        let encoded = serializer().encode_fields(fields.as_object().unwrap());
        assert_eq!(encoded["nothing"], json!({"nullValue": null}));
        assert_eq!(encoded["flag"], json!({"booleanValue": true}));
        assert_eq!(encoded["count"], json!({"integerValue": "42"}));
        assert_eq!(encoded["ratio"], json!({"doubleValue": 0.5}));
        assert_eq!(encoded["name"], json!({"stringValue": "Ada"}));
        assert_eq!(
            encoded["tags"],
            json!({"arrayValue": {"values": [{"stringValue": "a"}, {"integerValue": "1"}]}})
        );
        assert_eq!(
            encoded["profile"],
            json!({"mapValue": {"fields": {"city": {"stringValue": "London"}}}})
        );
    }

    #[test]
    fn decodes_documents_and_special_values() {
        let document = json!({
            "name": "projects/demo/databases/(default)/documents/users/u1/posts/p1",
            "fields": {
                "count": {"integerValue": "7"},
                "score": {"doubleValue": "1.5"},
                "at": {"timestampValue": "2024-01-01T00:00:00Z"},
                "owner": {"referenceValue": "projects/demo/databases/(default)/documents/users/u1"},
                "where": {"geoPointValue": {"latitude": 1.0, "longitude": 2.0}},
                "empty": {"arrayValue": {}},
                "nested": {"mapValue": {"fields": {"ok": {"booleanValue": false}}}}
            }
        });
        let decoded = serializer().decode_document(&document).unwrap();
        assert_eq!(decoded.id(), "p1");
        let data = decoded.data().unwrap();
        assert_eq!(data["count"], json!(7));
        assert_eq!(data["score"], json!(1.5));
        assert_eq!(data["at"], json!("2024-01-01T00:00:00Z"));
        assert_eq!(data["where"], json!({"latitude": 1.0, "longitude": 2.0}));
        assert_eq!(data["empty"], json!([]));
        assert_eq!(data["nested"], json!({"ok": false}));

        let bare = json!({"name": "projects/demo/databases/(default)/documents/users/u2"});
        assert_eq!(serializer().decode_document(&bare).unwrap().data(), Some(&Map::new()));

        assert!(serializer().decode_value(&json!({"mystery": 1})).is_err());
    }

    #[test]
    fn update_write_carries_mask_and_precondition() {
        let key = DocumentKey::from_string("users/u1").unwrap();
        let updates = vec![
            (FieldPath::from_dot_separated("age").unwrap(), json!(37)),
            (FieldPath::from_dot_separated("profile.city").unwrap(), json!("Paris")),
        ];
        let write = serializer().encode_update_write(&key, &updates);
        assert_eq!(
            write["update"]["name"],
            json!("projects/demo/databases/(default)/documents/users/u1")
        );
        assert_eq!(
            write["update"]["fields"]["profile"],
            json!({"mapValue": {"fields": {"city": {"stringValue": "Paris"}}}})
        );
        assert_eq!(write["updateMask"]["fieldPaths"], json!(["age", "profile.city"]));
        assert_eq!(write["currentDocument"], json!({"exists": true}));
    }

    #[test]
    fn structured_query_uses_composite_filter() {
        let posts = CollectionPath::parse("users/u1/posts").unwrap();
        let query = Query::new(posts.clone())
            .where_field("likes", FilterOperator::GreaterThan, 10)
            .where_field("draft", FilterOperator::Equal, false)
            .order_by("likes", OrderDirection::Descending)
            .limit(5);
        let body = serializer().encode_structured_query(&query);
        let structured = &body["structuredQuery"];
        assert_eq!(structured["from"], json!([{"collectionId": "posts"}]));
        assert_eq!(structured["where"]["compositeFilter"]["op"], json!("AND"));
        assert_eq!(
            structured["where"]["compositeFilter"]["filters"][0]["fieldFilter"]["op"],
            json!("GREATER_THAN")
        );
        assert_eq!(structured["orderBy"][0]["direction"], json!("DESCENDING"));
        assert_eq!(structured["limit"], json!(5));
        assert_eq!(serializer().query_parent(&posts), "documents/users/u1");

        let users = CollectionPath::parse("users").unwrap();
        let single = Query::new(users.clone()).where_field("age", FilterOperator::Equal, 1);
        let body = serializer().encode_structured_query(&single);
        assert!(body["structuredQuery"]["where"].get("fieldFilter").is_some());
        assert_eq!(serializer().query_parent(&users), "documents");
    }
}
