use serde::Deserialize;
use serde_json::{Map, Value};

use crate::platform::FirebaseDefaults;

/// Connection options shared by every adapter.
///
/// Field names follow the Firebase console's web-app config; the JSON form
/// (`apiKey`, `databaseURL`, ...) is accepted by [`FirebaseOptions::from_json`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FirebaseOptions {
    pub api_key: Option<String>,
    pub auth_domain: Option<String>,
    #[serde(rename = "databaseURL", alias = "databaseUrl")]
    pub database_url: Option<String>,
    pub project_id: Option<String>,
    pub storage_bucket: Option<String>,
    pub messaging_sender_id: Option<String>,
    pub app_id: Option<String>,
    pub measurement_id: Option<String>,
}

impl FirebaseOptions {
    /// Builds options from a web-app config object.
    ///
    /// Unknown keys are ignored; values that are not strings are skipped.
    /// `databaseURL` wins over its `databaseUrl` spelling.
    pub fn from_json(config: &Map<String, Value>) -> Self {
        let mut strings: Map<String, Value> = config
            .iter()
            .filter(|(_, value)| value.is_string())
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        if strings.contains_key("databaseURL") {
            strings.remove("databaseUrl");
        }
        match serde_json::from_value(Value::Object(strings)) {
            Ok(options) => options,
            Err(err) => {
                log::warn!("ignoring unreadable Firebase config: {err}");
                Self::default()
            }
        }
    }

    /// Reads the options supplied through `__FIREBASE_DEFAULTS__`,
    /// `__FIREBASE_DEFAULTS_PATH` or `FIREBASE_CONFIG`.
    pub fn from_defaults() -> Option<Self> {
        FirebaseDefaults::load()
            .config
            .map(|config| Self::from_json(&config))
    }
}
