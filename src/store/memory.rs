//! In-process document store

use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::store::filter::compare_values;
use crate::store::{
    timestamp_now, ChangeEvent, ChangeKind, DocumentStore, Precondition, Query, SortOrder,
    CHANGE_CHANNEL_CAPACITY,
};

type Collection = IndexMap<String, Value>;

/// Keeps every collection in memory, in insertion order.
///
/// Mirrors the server-side behaviour the access layers rely on: ids are
/// assigned on insert, `createdAt`/`updatedAt` are stamped, and every
/// mutation is broadcast.
#[derive(Clone)]
pub struct MemoryStore {
    collections: Arc<RwLock<HashMap<String, Collection>>>,
    changes: broadcast::Sender<ChangeEvent>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            collections: Arc::new(RwLock::new(HashMap::new())),
            changes,
        }
    }

    /// Number of documents currently held in `collection`
    pub async fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map(|c| c.len())
            .unwrap_or(0)
    }

    fn publish(&self, collection: &str, kind: ChangeKind, id: &str) {
        let _ = self
            .changes
            .send(ChangeEvent::new(collection, kind, Some(id.to_string())));
    }
}

fn as_object(value: Value, what: &str) -> Result<Map<String, Value>> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(Error::general(format!(
            "{} must be a JSON object, got {}",
            what, other
        ))),
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert(&self, collection: &str, document: Value) -> Result<Value> {
        let mut doc = as_object(document, "document")?;

        let id = match doc.get("id") {
            Some(Value::String(id)) if !id.is_empty() => id.clone(),
            _ => Uuid::new_v4().to_string(),
        };
        let now = timestamp_now();
        doc.insert("id".to_string(), Value::String(id.clone()));
        doc.entry("createdAt".to_string())
            .or_insert_with(|| Value::String(now.clone()));
        doc.insert("updatedAt".to_string(), Value::String(now));

        let stored = Value::Object(doc);
        {
            let mut collections = self.collections.write().await;
            let docs = collections.entry(collection.to_string()).or_default();
            if docs.contains_key(&id) {
                return Err(Error::conflict(format!(
                    "document {} already exists in {}",
                    id, collection
                )));
            }
            docs.insert(id.clone(), stored.clone());
        }

        self.publish(collection, ChangeKind::Insert, &id);
        Ok(stored)
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        patch: Value,
        precondition: Option<&Precondition>,
    ) -> Result<Option<Value>> {
        let patch = as_object(patch, "patch")?;

        let updated = {
            let mut collections = self.collections.write().await;
            let Some(existing) = collections.get_mut(collection).and_then(|c| c.get_mut(id))
            else {
                return Ok(None);
            };

            if let Some(pre) = precondition {
                let current = existing
                    .get(&pre.column)
                    .map(crate::store::filter::scalar_text);
                if current.as_deref() != Some(pre.value.as_str()) {
                    return Ok(None);
                }
            }

            if let Value::Object(fields) = existing {
                for (key, value) in patch {
                    if key != "id" && key != "createdAt" {
                        fields.insert(key, value);
                    }
                }
                fields.insert("updatedAt".to_string(), Value::String(timestamp_now()));
            }
            existing.clone()
        };

        self.publish(collection, ChangeKind::Update, id);
        Ok(Some(updated))
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool> {
        let removed = {
            let mut collections = self.collections.write().await;
            collections
                .get_mut(collection)
                .and_then(|c| c.shift_remove(id))
                .is_some()
        };
        if removed {
            self.publish(collection, ChangeKind::Delete, id);
        }
        Ok(removed)
    }

    async fn fetch(&self, collection: &str, id: &str) -> Result<Option<Value>> {
        let collections = self.collections.read().await;
        Ok(collections.get(collection).and_then(|c| c.get(id)).cloned())
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Value>> {
        let mut rows: Vec<Value> = {
            let collections = self.collections.read().await;
            match collections.get(collection) {
                Some(docs) => docs
                    .values()
                    .filter(|doc| query.filters().iter().all(|f| f.matches(doc)))
                    .cloned()
                    .collect(),
                None => Vec::new(),
            }
        };

        if let Some((column, order)) = query.ordering() {
            // Stable, so equal keys keep insertion order
            rows.sort_by(|a, b| {
                let ord = compare_values(a.get(column), b.get(column));
                match order {
                    SortOrder::Ascending => ord,
                    SortOrder::Descending => ord.reverse(),
                }
            });
        }
        if let Some(limit) = query.row_limit() {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    fn changes(&self) -> broadcast::Receiver<ChangeEvent> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn insert_assigns_id_and_timestamps() {
        let store = MemoryStore::new();
        let stored = store
            .insert("specimens", json!({ "family": "Fagaceae" }))
            .await
            .unwrap();

        assert!(stored["id"].as_str().map(|s| !s.is_empty()).unwrap_or(false));
        assert!(stored["createdAt"].is_string());
        assert_eq!(stored["createdAt"], stored["updatedAt"]);
        assert_eq!(store.len("specimens").await, 1);
    }

    #[tokio::test]
    async fn update_merges_and_keeps_identity() {
        let store = MemoryStore::new();
        let stored = store
            .insert("specimens", json!({ "id": "s1", "family": "Fagaceae", "notes": "a" }))
            .await
            .unwrap();

        let updated = store
            .update("specimens", "s1", json!({ "notes": "b", "id": "hijack" }), None)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated["id"], "s1");
        assert_eq!(updated["family"], "Fagaceae");
        assert_eq!(updated["notes"], "b");
        assert_eq!(updated["createdAt"], stored["createdAt"]);
    }

    #[tokio::test]
    async fn failed_precondition_leaves_document_untouched() {
        let store = MemoryStore::new();
        store
            .insert("specimens", json!({ "id": "s1", "notes": "a" }))
            .await
            .unwrap();

        let pre = Precondition::new("updatedAt", "1999-01-01T00:00:00.000000Z");
        let result = store
            .update("specimens", "s1", json!({ "notes": "b" }), Some(&pre))
            .await
            .unwrap();
        assert!(result.is_none());

        let doc = store.fetch("specimens", "s1").await.unwrap().unwrap();
        assert_eq!(doc["notes"], "a");
    }

    #[tokio::test]
    async fn query_filters_orders_and_limits() {
        let store = MemoryStore::new();
        for (id, owner, at) in [
            ("a", "u1", "2024-01-01"),
            ("b", "u2", "2024-03-01"),
            ("c", "u1", "2024-02-01"),
            ("d", "u1", "2023-12-01"),
        ] {
            store
                .insert("archive", json!({ "id": id, "owner": owner, "archivedAt": at }))
                .await
                .unwrap();
        }

        let query = Query::new()
            .eq("owner", "u1")
            .order("archivedAt", SortOrder::Descending)
            .limit(2);
        let rows = store.query("archive", &query).await.unwrap();
        let ids: Vec<&str> = rows.iter().filter_map(|r| r["id"].as_str()).collect();
        assert_eq!(ids, vec!["c", "a"]);
    }

    #[tokio::test]
    async fn every_mutation_is_broadcast() {
        let store = MemoryStore::new();
        let mut changes = store.changes();

        store.insert("posts", json!({ "id": "p1" })).await.unwrap();
        store
            .update("posts", "p1", json!({ "content": "hi" }), None)
            .await
            .unwrap();
        assert!(store.delete("posts", "p1").await.unwrap());
        assert!(!store.delete("posts", "p1").await.unwrap());

        let kinds: Vec<ChangeKind> = (0..3).map(|_| changes.try_recv().unwrap().kind).collect();
        assert_eq!(
            kinds,
            vec![ChangeKind::Insert, ChangeKind::Update, ChangeKind::Delete]
        );
        assert!(changes.try_recv().is_err());
    }

    #[tokio::test]
    async fn unknown_collection_is_empty() {
        let store = MemoryStore::new();
        assert!(store.query("nothing", &Query::new()).await.unwrap().is_empty());
        assert!(store.fetch("nothing", "x").await.unwrap().is_none());
    }
}
