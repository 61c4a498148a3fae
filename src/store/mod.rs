//! Document storage behind the access layers
//!
//! Every collection (specimens, archive, users, posts) is reached through the
//! [`DocumentStore`] trait. [`RestStore`] speaks PostgREST to the managed
//! backend; [`MemoryStore`] keeps documents in process for tests and offline
//! work. Both publish a [`ChangeEvent`] for every mutation so snapshot
//! listeners can refresh.

mod filter;
mod memory;
mod query;
mod rest;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tokio::sync::broadcast;

use crate::error::Result;

pub use filter::*;
pub use memory::MemoryStore;
pub use query::*;
pub use rest::RestStore;

/// Capacity of the change broadcast before slow listeners start lagging
pub(crate) const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Kind of mutation observed on a collection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    /// Parses the realtime wire names (`INSERT`, `UPDATE`, `DELETE`)
    pub fn from_wire(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "INSERT" => Some(ChangeKind::Insert),
            "UPDATE" => Some(ChangeKind::Update),
            "DELETE" => Some(ChangeKind::Delete),
            _ => None,
        }
    }
}

/// A document changed in `collection`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub collection: String,
    pub kind: ChangeKind,
    pub id: Option<String>,
}

impl ChangeEvent {
    pub fn new(collection: &str, kind: ChangeKind, id: Option<String>) -> Self {
        Self {
            collection: collection.to_string(),
            kind,
            id,
        }
    }
}

/// Compare-and-set guard for updates: the stored `column` must still equal `value`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Precondition {
    pub column: String,
    pub value: String,
}

impl Precondition {
    pub fn new(column: &str, value: impl ToString) -> Self {
        Self {
            column: column.to_string(),
            value: value.to_string(),
        }
    }
}

/// A collection-oriented JSON document store.
///
/// Writes are atomic per document only. Implementations must publish a
/// [`ChangeEvent`] on [`DocumentStore::changes`] after each successful
/// mutation.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a document and return it as stored, including its id
    async fn insert(&self, collection: &str, document: Value) -> Result<Value>;

    /// Merge `patch` into the document. `Ok(None)` means nothing matched:
    /// either the id is unknown or the precondition failed.
    async fn update(
        &self,
        collection: &str,
        id: &str,
        patch: Value,
        precondition: Option<&Precondition>,
    ) -> Result<Option<Value>>;

    /// Remove a document; `Ok(false)` when the id was unknown
    async fn delete(&self, collection: &str, id: &str) -> Result<bool>;

    /// Read one document; `Ok(None)` when the id is unknown
    async fn fetch(&self, collection: &str, id: &str) -> Result<Option<Value>>;

    /// Read every document matching `query`
    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Value>>;

    /// Subscribe to mutation notifications for all collections
    fn changes(&self) -> broadcast::Receiver<ChangeEvent>;
}

/// Timestamp format used for `createdAt`/`updatedAt`
pub(crate) fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Field deserializer treating JSON `null` like a missing key; nullable
/// columns come back as `null` from the REST API
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// Decode a stored document into a typed record
pub(crate) fn decode<T: DeserializeOwned>(document: Value) -> Result<T> {
    Ok(serde_json::from_value(document)?)
}

/// Decode a list of stored documents, failing on the first malformed one
pub(crate) fn decode_all<T: DeserializeOwned>(documents: Vec<Value>) -> Result<Vec<T>> {
    documents.into_iter().map(decode).collect()
}
