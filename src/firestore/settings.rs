use std::env;

use crate::firestore::remote::connection::FIRESTORE_API_HOST;
use crate::platform::FirebaseDefaults;

pub(crate) const EMULATOR_HOST_ENV: &str = "FIRESTORE_EMULATOR_HOST";
pub const DEFAULT_DATABASE_ID: &str = "(default)";

/// Where a [`FirestoreAdapter`](crate::firestore::FirestoreAdapter) keeps its
/// documents.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FirestoreBackendKind {
    InMemory,
    Http { host: String, ssl: bool },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FirestoreSettings {
    pub database: String,
    pub backend: FirestoreBackendKind,
}

impl Default for FirestoreSettings {
    fn default() -> Self {
        Self {
            database: DEFAULT_DATABASE_ID.to_string(),
            backend: FirestoreBackendKind::Http {
                host: FIRESTORE_API_HOST.to_string(),
                ssl: true,
            },
        }
    }
}

impl FirestoreSettings {
    pub fn in_memory() -> Self {
        Self {
            backend: FirestoreBackendKind::InMemory,
            ..Self::default()
        }
    }

    /// Plain-HTTP connection to an emulator at `host` (`host:port`).
    pub fn emulator(host: impl Into<String>) -> Self {
        Self {
            backend: FirestoreBackendKind::Http {
                host: host.into(),
                ssl: false,
            },
            ..Self::default()
        }
    }

    /// Production settings unless a `firestore` emulator host is configured
    /// in the environment defaults or `FIRESTORE_EMULATOR_HOST`.
    pub fn from_environment() -> Self {
        Self::from_sources(&FirebaseDefaults::load(), env::var(EMULATOR_HOST_ENV).ok())
    }

    pub(crate) fn from_sources(defaults: &FirebaseDefaults, env_host: Option<String>) -> Self {
        let host = defaults.emulator_host("firestore").or_else(|| {
            env_host
                .map(|host| host.trim().to_string())
                .filter(|host| !host.is_empty())
        });
        match host {
            Some(host) => Self::emulator(host),
            None => Self::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_to_production_host() {
        let settings = FirestoreSettings::from_sources(&FirebaseDefaults::default(), None);
        assert_eq!(settings, FirestoreSettings::default());
        assert_eq!(settings.database, "(default)");
    }

    #[test]
    fn emulator_host_from_defaults_wins_over_env() {
        let defaults =
            FirebaseDefaults::from_json(&json!({"emulatorHosts": {"firestore": "127.0.0.1:8080"}}));
        let settings = FirestoreSettings::from_sources(&defaults, Some("other:1".into()));
        assert_eq!(
            settings.backend,
            FirestoreBackendKind::Http {
                host: "127.0.0.1:8080".into(),
                ssl: false
            }
        );

        let settings =
            FirestoreSettings::from_sources(&FirebaseDefaults::default(), Some("localhost:9000".into()));
        assert_eq!(settings, FirestoreSettings::emulator("localhost:9000"));
    }
}
