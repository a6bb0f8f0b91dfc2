use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde_json::Value as JsonValue;

use crate::firestore::error::{internal_error, invalid_argument, FirestoreResult};

use super::rpc_error::map_http_error;

pub(crate) const FIRESTORE_API_HOST: &str = "firestore.googleapis.com";
const FIRESTORE_API_VERSION: &str = "v1";

/// HTTP client bound to one database's REST root.
#[derive(Clone, Debug)]
pub struct Connection {
    client: Client,
    base_url: String,
}

#[derive(Clone, Debug)]
pub struct ConnectionBuilder {
    project_id: String,
    database: String,
    host: String,
    ssl: bool,
    client: Option<Client>,
}

#[derive(Default, Clone, Debug)]
pub struct RequestContext {
    pub auth_token: Option<String>,
}

impl ConnectionBuilder {
    pub fn new(project_id: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            database: database.into(),
            host: FIRESTORE_API_HOST.to_string(),
            ssl: true,
            client: None,
        }
    }

    pub fn with_client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Targets `host` (`host[:port]`), e.g. a local emulator with `ssl = false`.
    pub fn with_host(mut self, host: impl Into<String>, ssl: bool) -> Self {
        self.host = host.into();
        self.ssl = ssl;
        self
    }

    pub fn build(self) -> FirestoreResult<Connection> {
        let host = self
            .host
            .trim()
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_end_matches('/');
        if host.is_empty() {
            return Err(invalid_argument("Firestore host cannot be empty"));
        }
        let client = match self.client {
            Some(client) => client,
            None => Client::builder()
                .build()
                .map_err(|err| internal_error(err.to_string()).with_cause(err))?,
        };
        let scheme = if self.ssl { "https" } else { "http" };
        let base_url = format!(
            "{scheme}://{host}/{FIRESTORE_API_VERSION}/projects/{}/databases/{}",
            self.project_id, self.database
        );
        Ok(Connection { client, base_url })
    }
}

impl Connection {
    pub fn builder(project_id: impl Into<String>, database: impl Into<String>) -> ConnectionBuilder {
        ConnectionBuilder::new(project_id, database)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn invoke_json(
        &self,
        method: Method,
        path: &str,
        body: Option<JsonValue>,
        context: &RequestContext,
    ) -> FirestoreResult<JsonValue> {
        let (status, text) = self.send(method, path, body, context).await?;
        if status.is_success() {
            parse_body(&text)
        } else {
            Err(map_http_error(status, &text))
        }
    }

    /// Like [`Self::invoke_json`], but a `404` yields `None`.
    pub async fn invoke_json_optional(
        &self,
        method: Method,
        path: &str,
        body: Option<JsonValue>,
        context: &RequestContext,
    ) -> FirestoreResult<Option<JsonValue>> {
        let (status, text) = self.send(method, path, body, context).await?;
        if status.is_success() {
            parse_body(&text).map(Some)
        } else if status == StatusCode::NOT_FOUND {
            Ok(None)
        } else {
            Err(map_http_error(status, &text))
        }
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<JsonValue>,
        context: &RequestContext,
    ) -> FirestoreResult<(StatusCode, String)> {
        let mut request = self.build_request(method.clone(), path, context);
        if let Some(body) = body {
            request = request.json(&body);
        }
        log::debug!("Firestore {method} {path}");
        let response = request
            .send()
            .await
            .map_err(|err| internal_error(format!("Firestore request failed: {err}")).with_cause(err))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| internal_error(err.to_string()).with_cause(err))?;
        Ok((status, text))
    }

    fn build_request(&self, method: Method, path: &str, context: &RequestContext) -> RequestBuilder {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let mut builder = self.client.request(method, url);
        if let Some(token) = context.auth_token.as_deref() {
            builder = builder.bearer_auth(token);
        }
        builder.header("Content-Type", "application/json")
    }
}

fn parse_body(text: &str) -> FirestoreResult<JsonValue> {
    if text.is_empty() {
        Ok(JsonValue::Null)
    } else {
        serde_json::from_str(text).map_err(|err| internal_error(err.to_string()).with_cause(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_for_production_and_emulator() {
        let production = Connection::builder("demo", "(default)").build().unwrap();
        assert_eq!(
            production.base_url(),
            "https://firestore.googleapis.com/v1/projects/demo/databases/(default)"
        );

        let emulator = Connection::builder("demo", "(default)")
            .with_host("http://localhost:8080/", false)
            .build()
            .unwrap();
        assert_eq!(
            emulator.base_url(),
            "http://localhost:8080/v1/projects/demo/databases/(default)"
        );

        assert!(Connection::builder("demo", "(default)")
            .with_host(" ", false)
            .build()
            .is_err());
    }
}
