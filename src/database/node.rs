use std::cmp::Ordering;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::database::error::{unexpected_value, DatabaseResult};

/// A point-in-time read of one location in the tree.
///
/// A missing location is reported structurally: `exists` is `false` and both
/// `key` and `value` are `None`.
#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    pub key: Option<String>,
    pub exists: bool,
    pub value: Option<Value>,
}

impl Node {
    pub(crate) fn from_value(key: Option<&String>, value: Value) -> Self {
        if value.is_null() {
            return Self::missing();
        }
        Self {
            key: key.cloned(),
            exists: true,
            value: Some(value),
        }
    }

    pub fn missing() -> Self {
        Self {
            key: None,
            exists: false,
            value: None,
        }
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn exists(&self) -> bool {
        self.exists
    }

    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    /// Deserializes the value into `T`; `Ok(None)` for a missing node.
    pub fn decode<T: DeserializeOwned>(&self) -> DatabaseResult<Option<T>> {
        let Some(value) = &self.value else {
            return Ok(None);
        };
        serde_json::from_value(value.clone())
            .map(Some)
            .map_err(|err| {
                unexpected_value(format!(
                    "Value at '{}' does not match the requested type: {err}",
                    self.key.as_deref().unwrap_or("/")
                ))
                .with_cause(err)
            })
    }
}

/// Key order of the Realtime Database: keys that parse as 32-bit integers
/// come first in numeric order, then the rest lexicographically.
pub(crate) fn compare_keys(left: &str, right: &str) -> Ordering {
    match (parse_int_key(left), parse_int_key(right)) {
        (Some(a), Some(b)) => a.cmp(&b).then_with(|| left.len().cmp(&right.len())),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => left.cmp(right),
    }
}

fn parse_int_key(key: &str) -> Option<i32> {
    if key == "-0" || (key.len() > 1 && key.starts_with('0')) {
        return None;
    }
    key.parse::<i32>().ok()
}

/// Direct children of `value` sorted by key. `None` when `value` cannot have
/// children; a null value has none.
pub(crate) fn ordered_children(value: &Value) -> Option<Vec<(String, Value)>> {
    match value {
        Value::Null => Some(Vec::new()),
        Value::Object(map) => {
            let mut children: Vec<(String, Value)> = map
                .iter()
                .map(|(key, child)| (key.clone(), child.clone()))
                .collect();
            children.sort_by(|(a, _), (b, _)| compare_keys(a, b));
            Some(children)
        }
        _ => None,
    }
}

pub(crate) fn previous_key(keys: &[&str], key: &str) -> Option<String> {
    let position = keys.iter().position(|candidate| *candidate == key)?;
    position
        .checked_sub(1)
        .map(|index| keys[index].to_string())
}
