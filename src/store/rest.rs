//! PostgREST-backed document store

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::broadcast;

use crate::error::{Error, Result};
use crate::fetch::{AccessToken, Fetch, FetchBuilder};
use crate::store::{
    ChangeEvent, ChangeKind, DocumentStore, Precondition, Query, CHANGE_CHANNEL_CAPACITY,
};

/// Document store talking to `/rest/v1/<collection>`
#[derive(Clone)]
pub struct RestStore {
    /// The base URL for the backend project
    url: String,

    /// The anonymous (or service role) API key
    key: String,

    /// HTTP client
    client: Client,

    /// Database schema; anything other than `public` is sent as a profile header
    schema: String,

    request_timeout: Option<Duration>,

    /// Signed-in user's token, falls back to the API key when absent
    access_token: AccessToken,

    changes: broadcast::Sender<ChangeEvent>,
}

impl RestStore {
    /// Create a new RestStore
    pub fn new(url: &str, key: &str, client: Client) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            url: url.trim_end_matches('/').to_string(),
            key: key.to_string(),
            client,
            schema: "public".to_string(),
            request_timeout: None,
            access_token: AccessToken::new(),
            changes,
        }
    }

    pub fn with_schema(mut self, schema: &str) -> Self {
        self.schema = schema.to_string();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Read the user token from a cell shared with other services
    pub fn with_access_token(mut self, token: AccessToken) -> Self {
        self.access_token = token;
        self
    }

    /// Use the signed-in user's token for row level security; `None` reverts
    /// to the API key
    pub fn set_access_token(&self, token: Option<String>) {
        self.access_token.set(token);
    }

    /// Sender used by the realtime listener to forward remote changes
    pub fn change_publisher(&self) -> broadcast::Sender<ChangeEvent> {
        self.changes.clone()
    }

    fn collection_url(&self, collection: &str) -> String {
        format!("{}/rest/v1/{}", self.url, collection)
    }

    fn bearer(&self) -> String {
        self.access_token.bearer_or(&self.key)
    }

    /// Common headers for every request against `collection`
    fn prepare<'a>(&'a self, builder: FetchBuilder<'a>, write: bool) -> FetchBuilder<'a> {
        let mut builder = builder
            .api_key(&self.key)
            .bearer_auth(&self.bearer())
            .timeout(self.request_timeout);

        if self.schema != "public" {
            let profile = if write { "Content-Profile" } else { "Accept-Profile" };
            builder = builder.header(profile, &self.schema);
        }
        builder
    }

    fn publish(&self, collection: &str, kind: ChangeKind, id: Option<String>) {
        // No receivers simply means nobody is subscribed yet
        let _ = self.changes.send(ChangeEvent::new(collection, kind, id));
    }
}

fn first_row(body: Option<Value>) -> Option<Value> {
    match body {
        Some(Value::Array(mut rows)) => {
            if rows.is_empty() {
                None
            } else {
                Some(rows.swap_remove(0))
            }
        }
        Some(Value::Null) | None => None,
        Some(other) => Some(other),
    }
}

fn document_id(document: &Value) -> Option<String> {
    match document.get("id") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

#[async_trait]
impl DocumentStore for RestStore {
    async fn insert(&self, collection: &str, document: Value) -> Result<Value> {
        let url = self.collection_url(collection);
        let body = self
            .prepare(Fetch::post(&self.client, &url), true)
            .header("Prefer", "return=representation")
            .json(&document)?
            .execute_optional::<Value>()
            .await?;

        let stored = first_row(body).ok_or_else(|| {
            Error::general(format!("No document returned after insert into {}", collection))
        })?;
        log::debug!("Inserted document into {}", collection);
        self.publish(collection, ChangeKind::Insert, document_id(&stored));
        Ok(stored)
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        patch: Value,
        precondition: Option<&Precondition>,
    ) -> Result<Option<Value>> {
        let url = self.collection_url(collection);
        let mut builder = self
            .prepare(Fetch::patch(&self.client, &url), true)
            .header("Prefer", "return=representation")
            .query_param("id", &format!("eq.{}", id));
        if let Some(pre) = precondition {
            builder = builder.query_param(&pre.column, &format!("eq.{}", pre.value));
        }

        let body = builder.json(&patch)?.execute_optional::<Value>().await?;
        let updated = first_row(body);
        if updated.is_some() {
            self.publish(collection, ChangeKind::Update, Some(id.to_string()));
        }
        Ok(updated)
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool> {
        let url = self.collection_url(collection);
        let body = self
            .prepare(Fetch::delete(&self.client, &url), true)
            .header("Prefer", "return=representation")
            .query_param("id", &format!("eq.{}", id))
            .execute_optional::<Value>()
            .await?;

        let removed = first_row(body).is_some();
        if removed {
            self.publish(collection, ChangeKind::Delete, Some(id.to_string()));
        }
        Ok(removed)
    }

    async fn fetch(&self, collection: &str, id: &str) -> Result<Option<Value>> {
        let url = self.collection_url(collection);
        let rows = self
            .prepare(Fetch::get(&self.client, &url), false)
            .query_param("select", "*")
            .query_param("id", &format!("eq.{}", id))
            .query_param("limit", "1")
            .execute::<Vec<Value>>()
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Value>> {
        let url = self.collection_url(collection);
        let rows = self
            .prepare(Fetch::get(&self.client, &url), false)
            .query(query.to_params())
            .execute::<Vec<Value>>()
            .await?;
        log::debug!("Fetched {} documents from {}", rows.len(), collection);
        Ok(rows)
    }

    fn changes(&self) -> broadcast::Receiver<ChangeEvent> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SortOrder;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store(server: &MockServer) -> RestStore {
        RestStore::new(&server.uri(), "fake-key", Client::new())
    }

    #[tokio::test]
    async fn query_encodes_filters_and_order() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/archived_specimens"))
            .and(query_param("select", "*"))
            .and(query_param("archivedBy", "eq.admin-1"))
            .and(query_param("order", "archivedAt.desc"))
            .and(query_param("limit", "5"))
            .and(header("apikey", "fake-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "id": "a", "archivedAt": "2024-05-01T00:00:00Z" }
            ])))
            .mount(&mock_server)
            .await;

        let query = Query::new()
            .eq("archivedBy", "admin-1")
            .order("archivedAt", SortOrder::Descending)
            .limit(5);
        let rows = store(&mock_server)
            .query("archived_specimens", &query)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn insert_returns_stored_row_and_publishes_change() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/specimens"))
            .and(header("Prefer", "return=representation"))
            .and(body_json(json!({ "family": "Fagaceae" })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!([
                { "id": "sp-1", "family": "Fagaceae", "createdAt": "2024-01-01T00:00:00Z" }
            ])))
            .mount(&mock_server)
            .await;

        let store = store(&mock_server);
        let mut changes = store.changes();
        let stored = store
            .insert("specimens", json!({ "family": "Fagaceae" }))
            .await
            .unwrap();

        assert_eq!(stored["id"], "sp-1");
        let event = changes.try_recv().unwrap();
        assert_eq!(event.kind, ChangeKind::Insert);
        assert_eq!(event.id.as_deref(), Some("sp-1"));
    }

    #[tokio::test]
    async fn update_with_precondition_adds_filter_and_reports_no_match() {
        let mock_server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/specimens"))
            .and(query_param("id", "eq.sp-1"))
            .and(query_param("updatedAt", "eq.2024-01-01T00:00:00.000000Z"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&mock_server)
            .await;

        let pre = Precondition::new("updatedAt", "2024-01-01T00:00:00.000000Z");
        let result = store(&mock_server)
            .update("specimens", "sp-1", json!({ "notes": "x" }), Some(&pre))
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn user_token_replaces_api_key_as_bearer() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/specimens"))
            .and(header("Authorization", "Bearer user-jwt"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&mock_server)
            .await;

        let store = store(&mock_server);
        store.set_access_token(Some("user-jwt".to_string()));
        let row = store.fetch("specimens", "missing").await.unwrap();
        assert!(row.is_none());
    }

    #[tokio::test]
    async fn delete_of_unknown_id_is_false() {
        let mock_server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/rest/v1/specimens"))
            .and(query_param("id", "eq.nope"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&mock_server)
            .await;

        assert!(!store(&mock_server).delete("specimens", "nope").await.unwrap());
    }

    #[tokio::test]
    async fn server_error_propagates_as_api_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/specimens"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&mock_server)
            .await;

        let result = store(&mock_server).query("specimens", &Query::new()).await;
        assert!(matches!(result, Err(Error::Api { .. })));
    }
}
