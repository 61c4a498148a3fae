//! Typed specimen operations over a [`DocumentStore`]

use serde_json::Value;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::specimen::subscription::{spawn_listener, Subscription};
use crate::specimen::{ArchivedSpecimen, Fetched, NewSpecimen, Specimen, SpecimenPatch};
use crate::store::{
    decode, decode_all, timestamp_now, DocumentStore, Precondition, Query, SortOrder,
};

/// Specimen CRUD, archive and snapshot listeners.
///
/// Writes return `Result` and log failures. Collection reads absorb store
/// failures into [`Fetched`] so the caller can show an explicit
/// "could not load" state.
pub struct SpecimenAccess<S: DocumentStore + ?Sized> {
    store: Arc<S>,
    specimens: String,
    archive: String,
}

impl<S: DocumentStore + ?Sized> Clone for SpecimenAccess<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            specimens: self.specimens.clone(),
            archive: self.archive.clone(),
        }
    }
}

impl<S: DocumentStore + ?Sized + 'static> SpecimenAccess<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            specimens: "specimens".to_string(),
            archive: "archived_specimens".to_string(),
        }
    }

    /// Override the active and archive collection names
    pub fn with_collections(mut self, specimens: &str, archive: &str) -> Self {
        self.specimens = specimens.to_string();
        self.archive = archive.to_string();
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Write a new record and return the id the store assigned.
    /// Field validation belongs to the form layer; nothing is checked here.
    pub async fn add_specimen(&self, specimen: NewSpecimen) -> Result<String> {
        let document = serde_json::to_value(&specimen)?;
        let stored = self
            .store
            .insert(&self.specimens, document)
            .await
            .map_err(|e| {
                log::error!("Failed to add specimen to {}: {}", self.specimens, e);
                e
            })?;

        match stored.get("id") {
            Some(Value::String(id)) => Ok(id.clone()),
            Some(Value::Number(id)) => Ok(id.to_string()),
            _ => Err(Error::general("Store did not assign a specimen id")),
        }
    }

    /// Merge `patch` into the record and refresh `updatedAt`.
    /// Concurrent updates are last-write-wins; see
    /// [`SpecimenAccess::update_specimen_if_unchanged`].
    pub async fn update_specimen(&self, id: &str, patch: SpecimenPatch) -> Result<()> {
        match self.write_patch(id, &patch, None).await? {
            true => Ok(()),
            false => Err(Error::not_found(format!("specimen {}", id))),
        }
    }

    /// Compare-and-set update: fails with [`Error::Conflict`] when the stored
    /// `updatedAt` no longer equals `expected_updated_at`.
    pub async fn update_specimen_if_unchanged(
        &self,
        id: &str,
        patch: SpecimenPatch,
        expected_updated_at: &str,
    ) -> Result<()> {
        let precondition = Precondition::new("updatedAt", expected_updated_at);
        if self.write_patch(id, &patch, Some(&precondition)).await? {
            return Ok(());
        }

        // Nothing matched: tell a vanished record apart from a stale read
        match self.store.fetch(&self.specimens, id).await? {
            Some(_) => {
                log::warn!("Specimen {} changed since {}", id, expected_updated_at);
                Err(Error::conflict(format!(
                    "specimen {} was modified by someone else",
                    id
                )))
            }
            None => Err(Error::not_found(format!("specimen {}", id))),
        }
    }

    async fn write_patch(
        &self,
        id: &str,
        patch: &SpecimenPatch,
        precondition: Option<&Precondition>,
    ) -> Result<bool> {
        let mut document = serde_json::to_value(patch)?;
        if let Value::Object(fields) = &mut document {
            fields.insert("updatedAt".to_string(), Value::String(timestamp_now()));
        }

        let updated = self
            .store
            .update(&self.specimens, id, document, precondition)
            .await
            .map_err(|e| {
                log::error!("Failed to update specimen {}: {}", id, e);
                e
            })?;
        Ok(updated.is_some())
    }

    /// Remove the record permanently
    pub async fn delete_specimen(&self, id: &str) -> Result<()> {
        let removed = self
            .store
            .delete(&self.specimens, id)
            .await
            .map_err(|e| {
                log::error!("Failed to delete specimen {}: {}", id, e);
                e
            })?;
        if removed {
            log::info!("Deleted specimen {}", id);
            Ok(())
        } else {
            Err(Error::not_found(format!("specimen {}", id)))
        }
    }

    /// Copy the record into the archive collection, then remove it from the
    /// active one. The two writes are independent: if the delete fails the
    /// record exists in both places and the error is returned.
    pub async fn archive_specimen(&self, id: &str, archived_by: &str, reason: &str) -> Result<()> {
        let specimen = self
            .get_specimen(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("specimen {}", id)))?;

        let archived = ArchivedSpecimen {
            specimen,
            archived_at: timestamp_now(),
            archived_by: archived_by.to_string(),
            reason: reason.to_string(),
        };
        self.store
            .insert(&self.archive, serde_json::to_value(&archived)?)
            .await
            .map_err(|e| {
                log::error!("Failed to archive specimen {}: {}", id, e);
                e
            })?;

        if !self.store.delete(&self.specimens, id).await? {
            log::warn!("Specimen {} was already gone after archiving", id);
        }
        log::info!("Archived specimen {} by {}", id, archived_by);
        Ok(())
    }

    /// `Ok(None)` when no record has this id
    pub async fn get_specimen(&self, id: &str) -> Result<Option<Specimen>> {
        let document = self
            .store
            .fetch(&self.specimens, id)
            .await
            .map_err(|e| {
                log::error!("Failed to read specimen {}: {}", id, e);
                e
            })?;
        document.map(decode).transpose()
    }

    /// Full collection scan. Unpaginated, sized for thousands of records.
    pub async fn get_all_specimens(&self) -> Fetched<Vec<Specimen>> {
        self.load(&self.specimens, &Query::new()).await
    }

    pub async fn get_user_specimens(&self, user_id: &str) -> Fetched<Vec<Specimen>> {
        self.load(&self.specimens, &Query::new().eq("researcherId", user_id))
            .await
    }

    /// Most recently archived first
    pub async fn list_archived(&self, limit: usize) -> Fetched<Vec<ArchivedSpecimen>> {
        let query = Query::new()
            .order("archivedAt", SortOrder::Descending)
            .limit(limit);
        self.load(&self.archive, &query).await
    }

    async fn load<T: serde::de::DeserializeOwned>(
        &self,
        collection: &str,
        query: &Query,
    ) -> Fetched<Vec<T>> {
        match self
            .store
            .query(collection, query)
            .await
            .and_then(decode_all::<T>)
        {
            Ok(rows) => Fetched::ok(rows),
            Err(e) => {
                log::error!("Failed to load {}: {}", collection, e);
                Fetched::failed(e)
            }
        }
    }

    /// Deliver every specimen now and after each change to the collection
    pub fn subscribe_all_specimens<F>(&self, callback: F) -> Subscription
    where
        F: FnMut(Fetched<Vec<Specimen>>) + Send + 'static,
    {
        spawn_listener(
            Arc::clone(&self.store),
            self.specimens.clone(),
            Query::new(),
            callback,
        )
    }

    /// Deliver one researcher's specimens now and after each change to the
    /// collection, including records moving out of their set
    pub fn subscribe_user_specimens<F>(&self, user_id: &str, callback: F) -> Subscription
    where
        F: FnMut(Fetched<Vec<Specimen>>) + Send + 'static,
    {
        spawn_listener(
            Arc::clone(&self.store),
            self.specimens.clone(),
            Query::new().eq("researcherId", user_id),
            callback,
        )
    }
}
