//! Environment-provided defaults: app options and emulator hosts.
//!
//! The defaults object is read from `__FIREBASE_DEFAULTS__` (inline JSON) or
//! from the file named by `__FIREBASE_DEFAULTS_PATH`. When neither is set,
//! `FIREBASE_CONFIG` / `FIREBASE_OPTIONS` may carry the app options alone,
//! either as JSON, as a path to a JSON file, or as `key=value` pairs.

use std::env;
use std::fs;
use std::path::Path;

use serde_json::{Map, Value};

pub(crate) const DEFAULTS_ENV: &str = "__FIREBASE_DEFAULTS__";
pub(crate) const DEFAULTS_PATH_ENV: &str = "__FIREBASE_DEFAULTS_PATH";

/// Parsed `__FIREBASE_DEFAULTS__` object.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FirebaseDefaults {
    pub config: Option<Map<String, Value>>,
    pub emulator_hosts: Map<String, Value>,
}

impl FirebaseDefaults {
    /// Loads the defaults from the process environment.
    pub fn load() -> Self {
        match defaults_from_env().or_else(defaults_from_path) {
            Some(value) => Self::from_json(&value),
            None => Self {
                config: firebase_config_from_env().and_then(|value| value.as_object().cloned()),
                emulator_hosts: Map::new(),
            },
        }
    }

    pub(crate) fn from_json(value: &Value) -> Self {
        let config = value.get("config").and_then(Value::as_object).cloned();
        let emulator_hosts = value
            .get("emulatorHosts")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        Self {
            config,
            emulator_hosts,
        }
    }

    /// Returns the `host:port` configured for the named emulator (`"database"`, `"firestore"`).
    pub fn emulator_host(&self, product: &str) -> Option<String> {
        self.emulator_hosts
            .get(product)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|host| !host.is_empty())
            .map(str::to_string)
    }
}

fn defaults_from_env() -> Option<Value> {
    let raw = env::var(DEFAULTS_ENV).ok()?;
    parse_json_object(&raw)
}

fn defaults_from_path() -> Option<Value> {
    let path = env::var(DEFAULTS_PATH_ENV).ok()?;
    let content = fs::read_to_string(path).ok()?;
    parse_json_object(&content)
}

fn parse_json_object(raw: &str) -> Option<Value> {
    serde_json::from_str::<Value>(raw)
        .ok()
        .filter(Value::is_object)
}

fn firebase_config_from_env() -> Option<Value> {
    ["FIREBASE_CONFIG", "FIREBASE_OPTIONS"]
        .iter()
        .filter_map(|name| env::var(name).ok())
        .find_map(|raw| parse_config_source(&raw))
}

fn parse_config_source(raw: &str) -> Option<Value> {
    if let Some(json) = parse_json_object(raw) {
        return Some(json);
    }

    if let Some(path) = treat_as_path(raw) {
        if let Some(json) = fs::read_to_string(path)
            .ok()
            .and_then(|contents| parse_json_object(&contents))
        {
            return Some(json);
        }
    }

    parse_key_value_config(raw)
}

fn treat_as_path(raw: &str) -> Option<&str> {
    if raw.contains('=') {
        return None;
    }
    let trimmed = raw.trim();
    Path::new(trimmed).exists().then_some(trimmed)
}

fn parse_key_value_config(raw: &str) -> Option<Value> {
    let mut map = Map::new();
    for entry in raw.split(',') {
        let Some((key, value)) = entry.split_once('=') else {
            continue;
        };
        let (key, value) = (key.trim(), value.trim());
        if key.is_empty() || value.is_empty() {
            continue;
        }
        map.insert(key.to_string(), Value::String(value.to_string()));
    }
    (!map.is_empty()).then_some(Value::Object(map))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_key_value_configs() {
        let value = parse_key_value_config("apiKey=foo,projectId=my-proj").unwrap();
        let map = value.as_object().unwrap();
        assert_eq!(map.get("apiKey").unwrap().as_str(), Some("foo"));
        assert_eq!(map.get("projectId").unwrap().as_str(), Some("my-proj"));
    }

    #[test]
    fn key_value_config_skips_malformed_entries() {
        assert!(parse_key_value_config("no-separator,=value").is_none());
    }

    #[test]
    fn parse_config_source_accepts_files_and_json() {
        let json = parse_config_source("{\"apiKey\":\"foo\"}").unwrap();
        assert_eq!(json["apiKey"], "foo");

        let mut path = std::env::temp_dir();
        path.push(format!(
            "firebase_adapters_test_{}.json",
            chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));
        fs::write(&path, "{\"projectId\":\"demo\"}").unwrap();
        let path_str = path.to_string_lossy().to_string();
        let file_json = parse_config_source(&path_str).unwrap();
        assert_eq!(file_json["projectId"], "demo");
        let _ = fs::remove_file(path);
    }

    #[test]
    fn defaults_expose_config_and_emulator_hosts() {
        let defaults = FirebaseDefaults::from_json(&json!({
            "config": { "projectId": "demo" },
            "emulatorHosts": { "firestore": "127.0.0.1:8080", "database": "  " }
        }));
        assert_eq!(defaults.config.as_ref().unwrap()["projectId"], "demo");
        assert_eq!(
            defaults.emulator_host("firestore").as_deref(),
            Some("127.0.0.1:8080")
        );
        assert_eq!(defaults.emulator_host("database"), None);
        assert_eq!(defaults.emulator_host("auth"), None);
    }
}
