use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::{json, Map, Value as JsonValue};

use crate::firestore::document::FirestoreDocument;
use crate::firestore::error::{internal_error, invalid_argument, FirestoreResult};
use crate::firestore::model::{CollectionPath, DocumentKey, FieldPath};
use crate::firestore::query::Query;
use crate::firestore::remote::connection::{Connection, ConnectionBuilder, RequestContext};
use crate::firestore::remote::serializer::RestSerializer;
use crate::platform::token::{NoopTokenProvider, TokenProviderArc};

use super::Datastore;

const LIST_COLLECTIONS_PAGE_SIZE: u32 = 300;

/// Datastore speaking the Firestore v1 REST API.
#[derive(Clone)]
pub struct HttpDatastore {
    connection: Connection,
    serializer: RestSerializer,
    auth_provider: TokenProviderArc,
}

#[derive(Clone)]
pub struct HttpDatastoreBuilder {
    project_id: String,
    database: String,
    host: Option<(String, bool)>,
    client: Option<Client>,
    auth_provider: TokenProviderArc,
}

impl HttpDatastoreBuilder {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            database: "(default)".to_string(),
            host: None,
            client: None,
            auth_provider: Arc::new(NoopTokenProvider),
        }
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    pub fn with_host(mut self, host: impl Into<String>, ssl: bool) -> Self {
        self.host = Some((host.into(), ssl));
        self
    }

    pub fn with_client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    pub fn with_auth_provider(mut self, provider: TokenProviderArc) -> Self {
        self.auth_provider = provider;
        self
    }

    pub fn build(self) -> FirestoreResult<HttpDatastore> {
        if self.project_id.trim().is_empty() {
            return Err(invalid_argument("Firestore project id cannot be empty"));
        }
        if self.database.trim().is_empty() {
            return Err(invalid_argument("Firestore database id cannot be empty"));
        }
        let mut builder = ConnectionBuilder::new(self.project_id.clone(), self.database.clone());
        if let Some((host, ssl)) = self.host {
            builder = builder.with_host(host, ssl);
        }
        if let Some(client) = self.client {
            builder = builder.with_client(client);
        }
        Ok(HttpDatastore {
            connection: builder.build()?,
            serializer: RestSerializer::new(self.project_id, self.database),
            auth_provider: self.auth_provider,
        })
    }
}

impl HttpDatastore {
    pub fn builder(project_id: impl Into<String>) -> HttpDatastoreBuilder {
        HttpDatastoreBuilder::new(project_id)
    }

    pub fn base_url(&self) -> &str {
        self.connection.base_url()
    }

    async fn request_context(&self) -> FirestoreResult<RequestContext> {
        let auth_token = self.auth_provider.get_token(false).await.map_err(|err| {
            internal_error(format!("Failed to obtain auth token: {err}")).with_cause(err)
        })?;
        Ok(RequestContext {
            auth_token: auth_token.filter(|token| !token.is_empty()),
        })
    }

    async fn commit(&self, write: JsonValue) -> FirestoreResult<()> {
        let context = self.request_context().await?;
        self.connection
            .invoke_json(
                Method::POST,
                "documents:commit",
                Some(json!({ "writes": [write] })),
                &context,
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Datastore for HttpDatastore {
    async fn get_document(&self, key: &DocumentKey) -> FirestoreResult<Option<FirestoreDocument>> {
        let context = self.request_context().await?;
        let path = format!("documents/{}", key.canonical_string());
        let response = self
            .connection
            .invoke_json_optional(Method::GET, &path, None, &context)
            .await?;
        match response {
            Some(json) => {
                let mut document = self.serializer.decode_document(&json)?;
                document.id = key.id().to_string();
                Ok(Some(document))
            }
            None => Ok(None),
        }
    }

    async fn set_document(
        &self,
        key: &DocumentKey,
        fields: Map<String, JsonValue>,
    ) -> FirestoreResult<()> {
        self.commit(self.serializer.encode_set_write(key, &fields))
            .await
    }

    async fn add_document(
        &self,
        collection: &CollectionPath,
        fields: Map<String, JsonValue>,
    ) -> FirestoreResult<Option<String>> {
        let context = self.request_context().await?;
        let path = format!(
            "{}/{}",
            self.serializer.query_parent(collection),
            collection.id()
        );
        let body = json!({ "fields": self.serializer.encode_fields(&fields) });
        let response = self
            .connection
            .invoke_json(Method::POST, &path, Some(body), &context)
            .await?;
        if response.get("name").is_none() {
            return Ok(None);
        }
        let document = self.serializer.decode_document(&response)?;
        Ok(Some(document.id))
    }

    async fn update_document(
        &self,
        key: &DocumentKey,
        updates: Vec<(FieldPath, JsonValue)>,
    ) -> FirestoreResult<()> {
        self.commit(self.serializer.encode_update_write(key, &updates))
            .await
    }

    async fn delete_document(&self, key: &DocumentKey) -> FirestoreResult<()> {
        self.commit(self.serializer.encode_delete_write(key)).await
    }

    async fn run_query(&self, query: &Query) -> FirestoreResult<Vec<FirestoreDocument>> {
        query.validate()?;
        let context = self.request_context().await?;
        let path = format!(
            "{}:runQuery",
            self.serializer.query_parent(query.collection())
        );
        let body = self.serializer.encode_structured_query(query);
        let response = self
            .connection
            .invoke_json(Method::POST, &path, Some(body), &context)
            .await?;
        let results = match response {
            JsonValue::Array(results) => results,
            JsonValue::Null => Vec::new(),
            other => vec![other],
        };
        results
            .iter()
            .filter_map(|result| result.get("document"))
            .map(|document| self.serializer.decode_document(document))
            .collect()
    }

    async fn list_collection_ids(&self, key: &DocumentKey) -> FirestoreResult<Vec<String>> {
        let path = format!("documents/{}:listCollectionIds", key.canonical_string());
        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let context = self.request_context().await?;
            let mut body = json!({ "pageSize": LIST_COLLECTIONS_PAGE_SIZE });
            if let Some(token) = page_token.take() {
                body["pageToken"] = JsonValue::String(token);
            }
            let response = self
                .connection
                .invoke_json(Method::POST, &path, Some(body), &context)
                .await?;
            if let Some(page) = response.get("collectionIds").and_then(JsonValue::as_array) {
                ids.extend(page.iter().filter_map(JsonValue::as_str).map(str::to_string));
            }
            match response.get("nextPageToken").and_then(JsonValue::as_str) {
                Some(token) if !token.is_empty() => page_token = Some(token.to_string()),
                _ => return Ok(ids),
            }
        }
    }

    fn kind(&self) -> &'static str {
        "http"
    }
}
