use serde_json::{Map, Number, Value};

use crate::database::error::{invalid_argument, DatabaseResult};

const SERVER_VALUE_KEY: &str = ".sv";

/// Placeholder resolved by the store to its clock, in milliseconds since the
/// Unix epoch.
pub fn server_timestamp() -> Value {
    serde_json::json!({ SERVER_VALUE_KEY: "timestamp" })
}

/// Placeholder resolved by the store to the current numeric value plus
/// `delta` (missing or non-numeric values count as zero).
pub fn increment(delta: f64) -> Value {
    serde_json::json!({ SERVER_VALUE_KEY: { "increment": delta } })
}

pub(crate) fn contains_server_value(value: &Value) -> bool {
    match value {
        Value::Object(map) => {
            map.contains_key(SERVER_VALUE_KEY) || map.values().any(contains_server_value)
        }
        Value::Array(items) => items.iter().any(contains_server_value),
        _ => false,
    }
}

/// Replaces every placeholder in `value`, using `current` (the value already
/// stored at the same location) as the base for increments.
pub(crate) fn resolve_server_values(
    value: Value,
    current: Option<&Value>,
    now_millis: i64,
) -> DatabaseResult<Value> {
    match value {
        Value::Object(mut map) => {
            if let Some(placeholder) = map.remove(SERVER_VALUE_KEY) {
                return resolve_placeholder(placeholder, current, now_millis);
            }
            let mut resolved = Map::with_capacity(map.len());
            for (key, child) in map {
                let child_current = current.and_then(|curr| curr.get(&key));
                resolved.insert(key, resolve_server_values(child, child_current, now_millis)?);
            }
            Ok(Value::Object(resolved))
        }
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(index, child)| {
                let child_current = current.and_then(|curr| curr.get(index));
                resolve_server_values(child, child_current, now_millis)
            })
            .collect::<DatabaseResult<Vec<_>>>()
            .map(Value::Array),
        other => Ok(other),
    }
}

fn resolve_placeholder(
    placeholder: Value,
    current: Option<&Value>,
    now_millis: i64,
) -> DatabaseResult<Value> {
    match placeholder {
        Value::String(token) if token == "timestamp" => Ok(Value::Number(Number::from(now_millis))),
        Value::Object(mut map) => {
            let delta = map
                .remove("increment")
                .ok_or_else(|| invalid_argument("Unsupported server value placeholder"))?;
            let Some(delta_number) = delta.as_number() else {
                return Err(invalid_argument("Server increment delta must be numeric"));
            };
            let base = current.and_then(Value::as_number);
            Ok(Value::Number(add_numbers(base, delta_number)?))
        }
        _ => Err(invalid_argument("Unsupported server value placeholder")),
    }
}

fn add_numbers(base: Option<&Number>, delta: &Number) -> DatabaseResult<Number> {
    let integral = |number: &Number| number.as_i64().filter(|_| !number.is_f64());
    if let Some(delta_int) = integral(delta) {
        let base_int = match base {
            None => Some(0),
            Some(number) => integral(number),
        };
        if let Some(sum) = base_int.and_then(|base| base.checked_add(delta_int)) {
            return Ok(Number::from(sum));
        }
    }
    let total = base.and_then(Number::as_f64).unwrap_or(0.0) + delta.as_f64().unwrap_or(0.0);
    Number::from_f64(total)
        .ok_or_else(|| invalid_argument("Server increment produced a non-finite number"))
}
