use std::fmt;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reqwest::{Client, Method, Response, StatusCode};
use serde_json::{Map, Value};
use url::Url;

use crate::database::error::{
    internal_error, invalid_argument, permission_denied, DatabaseAdapterError, DatabaseResult,
};
use crate::database::path::{is_prefix, join_path, validate_key};
use crate::database::push_id::PushIdGenerator;
use crate::database::server_value::{contains_server_value, resolve_server_values};
use crate::platform::token::{NoopTokenProvider, TokenProviderArc};

/// Storage behind a [`DatabaseAdapter`](crate::database::DatabaseAdapter).
///
/// Paths arrive already split into segments. Every method is a single call;
/// implementations must not retry.
#[async_trait]
pub trait TreeBackend: Send + Sync {
    async fn set(&self, path: &[String], value: Value) -> DatabaseResult<()>;

    /// Stores `value` under a freshly generated child key of `path` and
    /// returns that key. `None` means the store did not report a key.
    async fn push(&self, path: &[String], value: Value) -> DatabaseResult<Option<String>>;

    /// Applies every `(absolute path, value)` pair atomically. All paths lie
    /// below `base_path`.
    async fn update(
        &self,
        base_path: &[String],
        updates: Vec<(Vec<String>, Value)>,
    ) -> DatabaseResult<()>;

    async fn delete(&self, path: &[String]) -> DatabaseResult<()>;

    /// Returns the value stored at `path`, or `Value::Null` when absent.
    async fn get(&self, path: &[String]) -> DatabaseResult<Value>;

    /// Short label used in log lines.
    fn kind(&self) -> &'static str;
}

/// Process-local tree. Values vanish with the process.
pub struct InMemoryTreeBackend {
    state: Mutex<MemoryTree>,
}

#[derive(Default)]
struct MemoryTree {
    root: Value,
    push_ids: PushIdGenerator,
}

impl InMemoryTreeBackend {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryTree::default()),
        }
    }

    /// Snapshot of the whole tree.
    pub fn dump(&self) -> Value {
        self.state.lock().unwrap().root.clone()
    }
}

impl Default for InMemoryTreeBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for InMemoryTreeBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryTreeBackend").finish_non_exhaustive()
    }
}

impl MemoryTree {
    fn write(&mut self, path: &[String], value: Value) -> DatabaseResult<()> {
        validate_segments(path)?;
        let value = if contains_server_value(&value) {
            let now = chrono::Utc::now().timestamp_millis();
            resolve_server_values(value, get_at_path(&self.root, path), now)?
        } else {
            value
        };
        set_at_path(&mut self.root, path, value);
        prune(&mut self.root);
        Ok(())
    }
}

#[async_trait]
impl TreeBackend for InMemoryTreeBackend {
    async fn set(&self, path: &[String], value: Value) -> DatabaseResult<()> {
        self.state.lock().unwrap().write(path, value)
    }

    async fn push(&self, path: &[String], value: Value) -> DatabaseResult<Option<String>> {
        let mut state = self.state.lock().unwrap();
        let key = state.push_ids.next_id();
        let mut child_path = path.to_vec();
        child_path.push(key.clone());
        state.write(&child_path, value)?;
        Ok(Some(key))
    }

    async fn update(
        &self,
        base_path: &[String],
        updates: Vec<(Vec<String>, Value)>,
    ) -> DatabaseResult<()> {
        let mut state = self.state.lock().unwrap();
        for (path, _) in &updates {
            if !is_prefix(base_path, path) {
                return Err(internal_error(
                    "Database update contained a path outside the target location",
                ));
            }
            validate_segments(path)?;
        }
        // Work on a copy so a failing placeholder leaves the tree untouched.
        let mut staged = MemoryTree {
            root: state.root.clone(),
            push_ids: PushIdGenerator::default(),
        };
        for (path, value) in updates {
            staged.write(&path, value)?;
        }
        state.root = staged.root;
        Ok(())
    }

    async fn delete(&self, path: &[String]) -> DatabaseResult<()> {
        let mut state = self.state.lock().unwrap();
        delete_at_path(&mut state.root, path);
        prune(&mut state.root);
        Ok(())
    }

    async fn get(&self, path: &[String]) -> DatabaseResult<Value> {
        let state = self.state.lock().unwrap();
        Ok(get_at_path(&state.root, path).cloned().unwrap_or(Value::Null))
    }

    fn kind(&self) -> &'static str {
        "in-memory"
    }
}

/// Realtime Database REST API client.
pub struct RestTreeBackend {
    client: Client,
    base_url: Url,
    base_query: Vec<(String, String)>,
    auth_provider: TokenProviderArc,
}

/// Builder for [`RestTreeBackend`].
pub struct RestTreeBackendBuilder {
    url: String,
    client: Option<Client>,
    auth_provider: TokenProviderArc,
}

impl RestTreeBackendBuilder {
    pub fn with_auth_provider(mut self, provider: TokenProviderArc) -> Self {
        self.auth_provider = provider;
        self
    }

    pub fn with_client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    pub fn build(self) -> DatabaseResult<RestTreeBackend> {
        let mut url = Url::parse(&self.url).map_err(|err| {
            invalid_argument(format!("Invalid database URL '{}': {err}", self.url)).with_cause(err)
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid_argument(format!(
                "Database URL '{}' must use http or https",
                self.url
            )));
        }

        if !url.path().ends_with('/') {
            let mut path = url.path().trim_end_matches('/').to_owned();
            path.push('/');
            url.set_path(&path);
        }

        let base_query: Vec<(String, String)> = url
            .query_pairs()
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();
        url.set_query(None);

        let client = match self.client {
            Some(client) => client,
            None => Client::builder().build().map_err(|err| {
                internal_error(format!("Failed to build HTTP client: {err}")).with_cause(err)
            })?,
        };

        Ok(RestTreeBackend {
            client,
            base_url: url,
            base_query,
            auth_provider: self.auth_provider,
        })
    }
}

impl RestTreeBackend {
    /// Starts a builder for the database at `url`, e.g.
    /// `https://demo-default-rtdb.firebaseio.com` or
    /// `http://127.0.0.1:9000/?ns=demo` for the emulator.
    pub fn builder(url: impl Into<String>) -> RestTreeBackendBuilder {
        RestTreeBackendBuilder {
            url: url.into(),
            client: None,
            auth_provider: Arc::new(NoopTokenProvider),
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url_for_path(&self, path: &[String], query: &[(String, String)]) -> DatabaseResult<Url> {
        let mut url = self.base_url.clone();
        {
            // Segments are percent-encoded, so '?', '%' and ':' stay inside the key.
            let mut segments = url.path_segments_mut().map_err(|_| {
                internal_error(format!("Database URL '{}' cannot carry a path", self.base_url))
            })?;
            segments.pop_if_empty();
            match path.split_last() {
                Some((last, parents)) => {
                    segments.extend(parents);
                    segments.push(&format!("{last}.json"));
                }
                None => {
                    segments.push(".json");
                }
            }
        }

        url.set_query(None);
        if !(self.base_query.is_empty() && query.is_empty()) {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in self.base_query.iter().chain(query.iter()) {
                pairs.append_pair(key, value);
            }
        }

        Ok(url)
    }

    async fn send_request(
        &self,
        method: Method,
        path: &[String],
        mut query: Vec<(String, String)>,
        body: Option<&Value>,
    ) -> DatabaseResult<Response> {
        let token = self.auth_provider.get_token(false).await.map_err(|err| {
            internal_error(format!("Failed to obtain auth token: {err}")).with_cause(err)
        })?;
        if let Some(token) = token.filter(|token| !token.is_empty()) {
            query.push(("auth".to_string(), token));
        }

        let url = self.url_for_path(path, &query)?;
        log::debug!("Realtime Database {method} {}", url.path());
        let mut request = self.client.request(method, url);
        if let Some(payload) = body {
            request = request.json(payload);
        }

        request.send().await.map_err(handle_reqwest_error)
    }

    async fn ensure_success(&self, response: Response) -> DatabaseResult<Response> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.ok();
            Err(handle_http_error(status, body))
        }
    }
}

impl fmt::Debug for RestTreeBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestTreeBackend")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

fn silent() -> Vec<(String, String)> {
    vec![("print".to_string(), "silent".to_string())]
}

#[async_trait]
impl TreeBackend for RestTreeBackend {
    async fn set(&self, path: &[String], value: Value) -> DatabaseResult<()> {
        let response = self
            .send_request(Method::PUT, path, silent(), Some(&value))
            .await?;
        self.ensure_success(response).await.map(|_| ())
    }

    async fn push(&self, path: &[String], value: Value) -> DatabaseResult<Option<String>> {
        let response = self
            .send_request(Method::POST, path, Vec::new(), Some(&value))
            .await?;
        let response = self.ensure_success(response).await?;
        let body: Value = response.json().await.map_err(|err| {
            internal_error(format!("Failed to decode push response: {err}")).with_cause(err)
        })?;
        Ok(body
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    async fn update(
        &self,
        base_path: &[String],
        updates: Vec<(Vec<String>, Value)>,
    ) -> DatabaseResult<()> {
        if updates.is_empty() {
            return Ok(());
        }

        let mut payload = Map::with_capacity(updates.len());
        for (absolute_path, value) in updates {
            if !is_prefix(base_path, &absolute_path) {
                return Err(internal_error(
                    "Database update contained a path outside the target location",
                ));
            }
            let relative = &absolute_path[base_path.len()..];
            if relative.is_empty() {
                return Err(invalid_argument(
                    "Database update path cannot be empty relative to the target location",
                ));
            }
            payload.insert(join_path(relative), value);
        }

        let body = Value::Object(payload);
        let response = self
            .send_request(Method::PATCH, base_path, silent(), Some(&body))
            .await?;
        self.ensure_success(response).await.map(|_| ())
    }

    async fn delete(&self, path: &[String]) -> DatabaseResult<()> {
        let response = self
            .send_request(Method::DELETE, path, silent(), None)
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        self.ensure_success(response).await.map(|_| ())
    }

    async fn get(&self, path: &[String]) -> DatabaseResult<Value> {
        let query = vec![("format".to_string(), "export".to_string())];
        let response = self.send_request(Method::GET, path, query, None).await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Value::Null);
        }

        let response = self.ensure_success(response).await?;
        let exported: Value = response.json().await.map_err(|err| {
            internal_error(format!("Failed to decode database response: {err}")).with_cause(err)
        })?;
        Ok(strip_export_metadata(exported))
    }

    fn kind(&self) -> &'static str {
        "rest"
    }
}

fn handle_reqwest_error(err: reqwest::Error) -> DatabaseAdapterError {
    if let Some(status) = err.status() {
        return handle_http_error(status, None).with_cause(err);
    }
    internal_error(format!("Database request failed: {err}")).with_cause(err)
}

fn handle_http_error(status: StatusCode, body: Option<String>) -> DatabaseAdapterError {
    let message = body.as_deref().and_then(extract_error_message);

    match status {
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            invalid_argument(message.unwrap_or_else(|| "Invalid data payload".to_string()))
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            permission_denied(message.unwrap_or_else(|| "Permission denied".to_string()))
        }
        _ => internal_error(format!(
            "Database request failed with status {}{}",
            status.as_str(),
            message.map(|m| format!(": {m}")).unwrap_or_default()
        )),
    }
}

fn extract_error_message(raw: &str) -> Option<String> {
    if raw.is_empty() {
        return None;
    }
    if let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(raw) {
        if let Some(Value::String(message)) = obj.get("error") {
            return Some(message.clone());
        }
    }
    Some(raw.to_string())
}

/// Drops the `.priority` annotations that `format=export` adds and unwraps
/// `{".value": v}` leaves.
fn strip_export_metadata(value: Value) -> Value {
    match value {
        Value::Object(mut map) => {
            if let Some(inner) = map.remove(".value") {
                return strip_export_metadata(inner);
            }
            map.remove(".priority");
            Value::Object(
                map.into_iter()
                    .map(|(key, child)| (key, strip_export_metadata(child)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(strip_export_metadata).collect()),
        other => other,
    }
}

fn validate_segments(path: &[String]) -> DatabaseResult<()> {
    path.iter().try_for_each(|segment| validate_key(segment))
}

fn set_at_path(root: &mut Value, path: &[String], value: Value) {
    let Some((last, parents)) = path.split_last() else {
        *root = value;
        return;
    };

    let mut current = root;
    for segment in parents {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        let Value::Object(map) = current else {
            return;
        };
        current = map
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Map::new()));
    }

    if !current.is_object() {
        *current = Value::Object(Map::new());
    }
    if let Value::Object(map) = current {
        map.insert(last.clone(), value);
    }
}

fn get_at_path<'a>(root: &'a Value, path: &[String]) -> Option<&'a Value> {
    path.iter()
        .try_fold(root, |current, segment| current.as_object()?.get(segment))
}

fn delete_at_path(root: &mut Value, path: &[String]) {
    let Some((last, parents)) = path.split_last() else {
        *root = Value::Null;
        return;
    };

    let mut current = root;
    for segment in parents {
        match current {
            Value::Object(map) => match map.get_mut(segment) {
                Some(next) => current = next,
                None => return,
            },
            _ => return,
        }
    }

    if let Value::Object(map) = current {
        map.remove(last);
    }
}

/// Nulls and empty objects do not exist in the tree; removes them so that
/// emptied parents read as absent.
fn prune(value: &mut Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => {
            map.retain(|_, child| !prune(child));
            if map.is_empty() {
                *value = Value::Null;
                true
            } else {
                false
            }
        }
        _ => false,
    }
}
