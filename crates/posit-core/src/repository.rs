//! Unified storage interface
//!
//! The `Repository` opens the database, wires the record, attachment, and
//! sync stores to one shared handle, and hands out [`Entity`] façades.
//!
//! ## Usage
//!
//! ```ignore
//! let repo = Repository::open()?;  // Creates or loads existing
//!
//! let find = repo.create(Attributes::new().with("name", "Frog"), vec![])?;
//! let pending = repo.unsynced()?;
//! ```

use std::sync::Arc;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::attachments::AttachmentStore;
use crate::config::Config;
use crate::entity::Entity;
use crate::models::{AttributeValue, Attributes, EntitySnapshot, PayloadRef, RecordId};
use crate::payload::{FilePayloads, PayloadStore, RetainPayloads};
use crate::records::RecordStore;
use crate::storage::{Database, StoreError, StoreResult};
use crate::sync::SyncState;

/// Counts reported by [`Repository::stats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub finds: usize,
    pub unsynced: usize,
    pub attachments: usize,
}

/// Entry point for callers working with many finds
#[derive(Clone)]
pub struct Repository {
    records: RecordStore,
    attachments: AttachmentStore,
    sync: SyncState,
}

impl Repository {
    /// Open the repository from the default configuration
    pub fn open() -> anyhow::Result<Self> {
        let config = Config::load().context("Failed to load configuration")?;
        Self::open_with_config(&config).context("Failed to open repository")
    }

    /// Open the repository described by `config`
    ///
    /// Attachment files under the configured attachments directory are
    /// deleted along with their attachments.
    pub fn open_with_config(config: &Config) -> StoreResult<Self> {
        let db = Database::open(config)?;
        let payloads = FilePayloads::new(config.attachments_path());
        Ok(Self::with_database(db, Arc::new(payloads)))
    }

    /// In-memory repository that never touches payload content
    pub fn open_in_memory() -> StoreResult<Self> {
        Ok(Self::with_database(
            Database::open_in_memory()?,
            Arc::new(RetainPayloads),
        ))
    }

    /// Build on an existing engine handle
    pub fn with_database(db: Database, payloads: Arc<dyn PayloadStore>) -> Self {
        let records = RecordStore::new(db.clone());
        let attachments = AttachmentStore::new(db, payloads);
        let sync = SyncState::new(records.clone());
        Self {
            records,
            attachments,
            sync,
        }
    }

    pub fn records(&self) -> &RecordStore {
        &self.records
    }

    pub fn attachments(&self) -> &AttachmentStore {
        &self.attachments
    }

    pub fn sync(&self) -> &SyncState {
        &self.sync
    }

    // ==================== Entities ====================

    /// A transient find, not yet stored
    pub fn new_entity(&self) -> Entity {
        Entity::transient(
            self.records.clone(),
            self.attachments.clone(),
            self.sync.clone(),
        )
    }

    /// Handle to an existing find
    pub fn entity(&self, id: RecordId) -> StoreResult<Entity> {
        if !self.records.exists(id)? {
            return Err(StoreError::find_not_found(id));
        }
        Ok(self.handle(id))
    }

    fn handle(&self, id: RecordId) -> Entity {
        Entity::persisted(
            id,
            self.records.clone(),
            self.attachments.clone(),
            self.sync.clone(),
        )
    }

    /// Store a new find with its attachments
    pub fn create(
        &self,
        attributes: Attributes,
        payloads: Vec<PayloadRef>,
    ) -> StoreResult<Entity> {
        let mut entity = self.new_entity();
        entity.create(Some(attributes), payloads)?;
        Ok(entity)
    }

    /// Update a find through the sync rules; `false` if it does not exist
    pub fn update(&self, id: RecordId, attributes: Attributes) -> StoreResult<bool> {
        self.handle(id).update(attributes)
    }

    /// Delete a find and its attachments; `false` if nothing was deleted
    pub fn delete(&self, id: RecordId) -> StoreResult<bool> {
        self.handle(id).delete()
    }

    // ==================== Queries ====================

    pub fn get(&self, id: RecordId) -> StoreResult<EntitySnapshot> {
        self.handle(id).content()
    }

    /// Every find, ordered by id
    pub fn list(&self) -> StoreResult<Vec<EntitySnapshot>> {
        self.records
            .ids()?
            .into_iter()
            .map(|id| self.get(id))
            .collect()
    }

    pub fn find_by_attribute(
        &self,
        name: &str,
        value: &AttributeValue,
    ) -> StoreResult<Vec<RecordId>> {
        self.records.ids_with_attribute(name, value)
    }

    /// Finds with local changes the server has not acknowledged
    pub fn unsynced(&self) -> StoreResult<Vec<RecordId>> {
        self.records.ids_by_synced(false)
    }

    pub fn count(&self) -> StoreResult<usize> {
        self.records.count()
    }

    pub fn stats(&self) -> StoreResult<StoreStats> {
        Ok(StoreStats {
            finds: self.records.count()?,
            unsynced: self.records.ids_by_synced(false)?.len(),
            attachments: self.attachments.count()?,
        })
    }
}
