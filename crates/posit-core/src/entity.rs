//! The find façade
//!
//! An `Entity` ties one row id to the record, attachment, and sync stores.
//! It starts transient (no id) and becomes persisted once `create` gets a
//! row id; the id never changes after that.
//!
//! ## Usage
//!
//! ```ignore
//! let mut find = repo.new_entity();
//! let id = find.create(Some(Attributes::new().with("name", "Frog")), vec![])?;
//!
//! find.update(Attributes::new().with("name", "Bullfrog"))?;
//! find.delete()?;
//! ```

use std::collections::HashMap;

use tracing::{info, warn};

use crate::attachments::{AttachmentStore, Attachments};
use crate::models::{AttachmentId, Attributes, EntitySnapshot, PayloadRef, RecordId};
use crate::records::RecordStore;
use crate::storage::{StoreError, StoreResult};
use crate::sync::{SyncState, SyncStatus};

/// One addressable find
#[derive(Clone)]
pub struct Entity {
    id: Option<RecordId>,
    records: RecordStore,
    attachments: AttachmentStore,
    sync: SyncState,
}

impl Entity {
    /// A find with no row yet
    pub fn transient(records: RecordStore, attachments: AttachmentStore, sync: SyncState) -> Self {
        Self {
            id: None,
            records,
            attachments,
            sync,
        }
    }

    /// A handle to an existing row
    pub fn persisted(
        id: RecordId,
        records: RecordStore,
        attachments: AttachmentStore,
        sync: SyncState,
    ) -> Self {
        Self {
            id: Some(id),
            records,
            attachments,
            sync,
        }
    }

    /// Row id, once persisted
    pub fn id(&self) -> Option<RecordId> {
        self.id
    }

    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }

    fn require_id(&self, op: &str) -> StoreResult<RecordId> {
        self.id.ok_or_else(|| {
            StoreError::InvariantViolation(format!("cannot {} a find that has no id yet", op))
        })
    }

    // ==================== Lifecycle ====================

    /// Insert the row and attach each payload in order, in one transaction
    ///
    /// With `attributes = None` nothing is inserted: a persisted find just
    /// gets the payloads attached and its id returned; a transient one fails.
    /// Creating a second row for an already persisted find is refused. On
    /// error nothing is stored and a transient find stays transient.
    pub fn create(
        &mut self,
        attributes: Option<Attributes>,
        payloads: Vec<PayloadRef>,
    ) -> StoreResult<RecordId> {
        match (attributes, self.id) {
            (Some(_), Some(existing)) => Err(StoreError::InvariantViolation(format!(
                "find {} already has a row",
                existing
            ))),
            (Some(attributes), None) => {
                let id = self
                    .records
                    .create_with_attachments(&attributes, &payloads)?;
                self.id = Some(id);
                info!(id, attachments = payloads.len(), "created find");
                Ok(id)
            }
            (None, Some(existing)) => {
                self.attachments.add_all(existing, &payloads)?;
                Ok(existing)
            }
            (None, None) => self.require_id("attach to"),
        }
    }

    /// Write attributes through the sync rules
    ///
    /// Returns `false` if the row no longer exists.
    pub fn update(&self, attributes: Attributes) -> StoreResult<bool> {
        let id = self.require_id("update")?;

        let status = match self.sync.status(id) {
            Ok(status) => status,
            Err(e) if e.is_not_found() => return Ok(false),
            Err(e) => return Err(e),
        };

        SyncState::check_revision(status.revision, &attributes)?;
        let to_write = SyncState::prepare_mutation(status.revision, status.synced, attributes);
        self.records.update(id, &to_write)
    }

    /// Delete attachments, then the row
    ///
    /// If any attachment cannot be removed, the row and every attachment
    /// are left in place and `false` is returned.
    pub fn delete(&self) -> StoreResult<bool> {
        let id = self.require_id("delete")?;

        if !self.attachments.delete_all_by_owner(id)? {
            warn!(id, "attachment removal failed, keeping find row");
            return Ok(false);
        }

        let deleted = self.records.delete(id)?;
        if deleted {
            info!(id, "deleted find");
        }
        Ok(deleted)
    }

    // ==================== Content ====================

    /// Full attribute map
    pub fn attributes(&self) -> StoreResult<Attributes> {
        self.records.fetch(self.require_id("read")?)
    }

    /// Attributes, attachments, and timestamps together
    pub fn content(&self) -> StoreResult<EntitySnapshot> {
        let id = self.require_id("read")?;
        let attributes = self.records.fetch(id)?;
        let attachments = self.attachments.all_by_owner(id)?;
        let (created_at, updated_at) = self.records.timestamps(id)?;

        Ok(EntitySnapshot {
            id,
            attributes,
            attachments,
            created_at,
            updated_at,
        })
    }

    /// Every attribute rendered as a string
    pub fn content_map(&self) -> StoreResult<HashMap<String, String>> {
        Ok(self.attributes()?.to_string_map())
    }

    // ==================== Attachments ====================

    pub fn add_attachment(&self, payload: PayloadRef) -> StoreResult<AttachmentId> {
        self.attachments.add(self.require_id("attach to")?, payload)
    }

    /// Live cursor over this find's attachments
    pub fn attachments(&self) -> StoreResult<Attachments> {
        Ok(self.attachments.list_by_owner(self.require_id("read")?))
    }

    pub fn attachment_count(&self) -> StoreResult<usize> {
        self.attachments.count_by_owner(self.require_id("read")?)
    }

    pub fn has_attachments(&self) -> StoreResult<bool> {
        Ok(self.attachment_count()? > 0)
    }

    pub fn get_attachment_by_position(&self, position: usize) -> StoreResult<PayloadRef> {
        self.attachments
            .get_by_position(self.require_id("read")?, position)
    }

    /// Delete one of this find's attachments by its id
    pub fn delete_attachment(&self, attachment_id: AttachmentId) -> StoreResult<bool> {
        let id = self.require_id("detach from")?;

        match self.attachments.get(attachment_id) {
            Ok(attachment) if attachment.find_id != id => {
                Err(StoreError::InvariantViolation(format!(
                    "attachment {} belongs to find {}, not {}",
                    attachment_id, attachment.find_id, id
                )))
            }
            Ok(_) => self.attachments.delete_by_id(attachment_id),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn delete_attachment_by_position(&self, position: usize) -> StoreResult<bool> {
        self.attachments
            .delete_by_position(self.require_id("detach from")?, position)
    }

    // ==================== Sync ====================

    pub fn sync_status(&self) -> StoreResult<SyncStatus> {
        self.sync.status(self.require_id("read")?)
    }

    pub fn revision(&self) -> StoreResult<i64> {
        self.sync.get_revision(self.require_id("read")?)
    }

    pub fn is_synced(&self) -> StoreResult<bool> {
        self.sync.is_synced(self.require_id("read")?)
    }

    pub fn set_server_id(&self, server_id: i64) -> StoreResult<()> {
        self.sync
            .mark_server_accepted(self.require_id("update")?, server_id)
    }

    pub fn set_synced(&self, synced: bool) -> StoreResult<bool> {
        self.sync.set_synced(self.require_id("update")?, synced)
    }

    pub fn set_revision(&self, revision: i64) -> StoreResult<bool> {
        self.sync.set_revision(self.require_id("update")?, revision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{PayloadStore, RetainPayloads};
    use crate::storage::Database;
    use std::sync::Arc;

    struct FailingPayloads;

    impl PayloadStore for FailingPayloads {
        fn release(&self, payload: &PayloadRef) -> StoreResult<()> {
            Err(StoreError::PayloadRelease {
                payload: payload.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "disk unavailable"),
            })
        }
    }

    fn new_entity_with(payloads: Arc<dyn PayloadStore>) -> Entity {
        let db = Database::open_in_memory().unwrap();
        let records = RecordStore::new(db.clone());
        let attachments = AttachmentStore::new(db, payloads);
        let sync = SyncState::new(records.clone());
        Entity::transient(records, attachments, sync)
    }

    fn new_entity() -> Entity {
        new_entity_with(Arc::new(RetainPayloads))
    }

    #[test]
    fn test_frog_scenario() {
        let mut find = new_entity();

        let id = find
            .create(
                Some(Attributes::new().with("name", "Frog")),
                vec!["img-0".into(), "img-1".into()],
            )
            .unwrap();
        assert!(id >= 1);
        assert_eq!(find.id(), Some(id));

        let status = find.sync_status().unwrap();
        assert_eq!(status.revision, 1);
        assert_eq!(status.server_id, 0);
        assert!(!status.synced);
        assert_eq!(find.get_attachment_by_position(0).unwrap().as_str(), "img-0");
        assert_eq!(find.get_attachment_by_position(1).unwrap().as_str(), "img-1");

        // Dirty: no revision bump
        assert!(find.update(Attributes::new().with("name", "Bullfrog")).unwrap());
        assert_eq!(find.revision().unwrap(), 1);

        // Synced: first edit bumps and clears
        find.set_synced(true).unwrap();
        assert!(find.update(Attributes::new().with("name", "Toad")).unwrap());
        assert_eq!(find.revision().unwrap(), 2);
        assert!(!find.is_synced().unwrap());
        assert_eq!(find.attributes().unwrap().get_text("name"), Some("Toad"));
    }

    #[test]
    fn test_revision_never_decreases_across_updates() {
        let mut find = new_entity();
        find.create(Some(Attributes::new()), vec![]).unwrap();

        let mut last = find.revision().unwrap();
        for round in 0..6 {
            if round % 2 == 0 {
                find.set_synced(true).unwrap();
            }
            find.update(Attributes::new().with("round", round)).unwrap();
            let now = find.revision().unwrap();
            assert!(now >= last);
            assert!(now >= 1);
            last = now;
        }
        assert_eq!(last, 4);
    }

    #[test]
    fn test_update_rejects_revision_rollback() {
        let mut find = new_entity();
        find.create(Some(Attributes::new().with("revision", 3)), vec![])
            .unwrap();

        let err = find
            .update(Attributes::new().with("revision", 1))
            .unwrap_err();
        assert!(matches!(err, StoreError::InvariantViolation(_)));
        assert_eq!(find.revision().unwrap(), 3);
    }

    #[test]
    fn test_transient_operations_are_refused() {
        let find = new_entity();
        assert!(!find.is_persisted());

        let err = find.update(Attributes::new().with("name", "x")).unwrap_err();
        assert!(matches!(err, StoreError::InvariantViolation(_)));
        assert!(matches!(
            find.delete().unwrap_err(),
            StoreError::InvariantViolation(_)
        ));
        assert!(matches!(
            find.add_attachment("img".into()).unwrap_err(),
            StoreError::InvariantViolation(_)
        ));
    }

    #[test]
    fn test_create_without_attributes() {
        let mut find = new_entity();

        // Transient with nothing to insert
        let err = find.create(None, vec!["img".into()]).unwrap_err();
        assert!(matches!(err, StoreError::InvariantViolation(_)));

        // Empty but explicit attribute set still inserts
        let id = find.create(Some(Attributes::new()), vec![]).unwrap();

        // Persisted: attaches and returns the existing id
        assert_eq!(find.create(None, vec!["img".into()]).unwrap(), id);
        assert_eq!(find.attachment_count().unwrap(), 1);

        // A second row is refused
        assert!(find.create(Some(Attributes::new()), vec![]).is_err());
        assert_eq!(find.id(), Some(id));
    }

    #[test]
    fn test_delete_without_attachments() {
        let mut find = new_entity();
        let id = find.create(Some(Attributes::new()), vec![]).unwrap();

        assert!(find.delete().unwrap());
        assert!(find.attributes().unwrap_err().is_not_found());
        assert_eq!(find.id(), Some(id));
    }

    #[test]
    fn test_delete_removes_attachments_and_row() {
        let mut find = new_entity();
        find.create(Some(Attributes::new()), vec!["a".into(), "b".into()])
            .unwrap();

        assert!(find.delete().unwrap());
        assert!(find.attributes().unwrap_err().is_not_found());
        assert_eq!(find.attachment_count().unwrap(), 0);
    }

    #[test]
    fn test_failed_attachment_removal_keeps_row() {
        let mut find = new_entity_with(Arc::new(FailingPayloads));
        find.create(
            Some(Attributes::new().with("name", "Frog")),
            vec!["img".into()],
        )
        .unwrap();

        assert!(!find.delete().unwrap());
        assert_eq!(find.attributes().unwrap().get_text("name"), Some("Frog"));
        assert!(find.has_attachments().unwrap());
    }

    #[test]
    fn test_partly_failed_removal_keeps_all_attachments() {
        struct LockedPayloads;

        impl PayloadStore for LockedPayloads {
            fn release(&self, payload: &PayloadRef) -> StoreResult<()> {
                if payload.as_str() == "locked" {
                    return Err(StoreError::PayloadRelease {
                        payload: payload.to_string(),
                        source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "locked"),
                    });
                }
                Ok(())
            }
        }

        let mut find = new_entity_with(Arc::new(LockedPayloads));
        find.create(
            Some(Attributes::new()),
            vec!["p0".into(), "locked".into(), "p2".into()],
        )
        .unwrap();

        assert!(!find.delete().unwrap());
        assert!(find.attributes().is_ok());
        assert_eq!(find.attachment_count().unwrap(), 3);
        assert_eq!(find.get_attachment_by_position(2).unwrap().as_str(), "p2");
    }

    #[test]
    fn test_failed_create_stores_nothing() {
        let mut find = new_entity();

        let err = find
            .create(
                Some(Attributes::new().with("name", "Frog")),
                vec!["img".into(), "".into()],
            )
            .unwrap_err();

        assert!(matches!(err, StoreError::InvariantViolation(_)));
        assert!(!find.is_persisted());
        assert_eq!(find.records.count().unwrap(), 0);
    }

    #[test]
    fn test_update_after_delete_is_false() {
        let mut find = new_entity();
        find.create(Some(Attributes::new()), vec![]).unwrap();
        find.delete().unwrap();

        assert!(!find.update(Attributes::new().with("name", "x")).unwrap());
    }

    #[test]
    fn test_attachment_ops() {
        let mut find = new_entity();
        find.create(Some(Attributes::new()), vec![]).unwrap();
        assert!(!find.has_attachments().unwrap());

        let first = find.add_attachment("p0".into()).unwrap();
        find.add_attachment("p1".into()).unwrap();
        find.add_attachment("p2".into()).unwrap();

        assert!(find.delete_attachment(first).unwrap());
        assert!(!find.delete_attachment(first).unwrap());
        assert!(find.delete_attachment_by_position(1).unwrap());

        let left: Vec<String> = find
            .attachments()
            .unwrap()
            .map(|a| a.unwrap().payload.to_string())
            .collect();
        assert_eq!(left, vec!["p1".to_string()]);
    }

    #[test]
    fn test_attachment_mutations_do_not_dirty() {
        let mut find = new_entity();
        find.create(Some(Attributes::new()), vec![]).unwrap();
        find.set_synced(true).unwrap();

        find.add_attachment("p0".into()).unwrap();
        find.delete_attachment_by_position(0).unwrap();

        assert!(find.is_synced().unwrap());
        assert_eq!(find.revision().unwrap(), 1);
    }

    #[test]
    fn test_content_and_content_map() {
        let mut find = new_entity();
        let id = find
            .create(
                Some(Attributes::new().with("name", "Frog").with("legs", 4)),
                vec!["img".into()],
            )
            .unwrap();
        find.set_server_id(77).unwrap();

        let snapshot = find.content().unwrap();
        assert_eq!(snapshot.id, id);
        assert_eq!(snapshot.server_id(), 77);
        assert_eq!(snapshot.revision(), 1);
        assert_eq!(snapshot.attachments.len(), 1);
        assert!(snapshot.updated_at >= snapshot.created_at);

        let map = find.content_map().unwrap();
        assert_eq!(map.get("legs").map(String::as_str), Some("4"));
        assert_eq!(map.get("sid").map(String::as_str), Some("77"));
        assert_eq!(map.get("synced").map(String::as_str), Some("0"));
    }
}
