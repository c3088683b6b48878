//! Revision and synced-flag bookkeeping
//!
//! The rule: the first local edit after a sync clears `synced` and bumps
//! `revision` by one, in the same write. Further edits while dirty leave the
//! revision alone; the server reconciles one revision per sync round.
//!
//! The remote protocol reads [`SyncState::status`], pushes the entity, and on
//! success calls [`SyncState::mark_server_accepted`] and
//! [`SyncState::set_synced`].

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::models::{Attributes, RecordId, COLUMN_REVISION, COLUMN_SID, COLUMN_SYNCED};
use crate::records::RecordStore;
use crate::storage::{StoreError, StoreResult};

/// Sync bookkeeping of one find
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub revision: i64,
    pub server_id: i64,
    pub synced: bool,
}

impl SyncStatus {
    /// Whether the remote authority has accepted this find at least once
    pub fn has_server_id(&self) -> bool {
        self.server_id != 0
    }
}

/// Dirty-tracking rules layered over [`RecordStore`]
#[derive(Clone)]
pub struct SyncState {
    records: RecordStore,
}

impl SyncState {
    pub fn new(records: RecordStore) -> Self {
        Self { records }
    }

    /// Decide what an attribute write must carry
    ///
    /// A synced find gets `synced = 0` and `revision = current + 1` laid over
    /// the incoming attributes. A dirty find's write passes through as is.
    pub fn prepare_mutation(
        current_revision: i64,
        current_synced: bool,
        incoming: Attributes,
    ) -> Attributes {
        if current_synced {
            incoming
                .with(COLUMN_SYNCED, false)
                .with(COLUMN_REVISION, current_revision + 1)
        } else {
            incoming
        }
    }

    /// Reject writes that would move the revision backwards
    pub fn check_revision(current_revision: i64, incoming: &Attributes) -> StoreResult<()> {
        match incoming.revision() {
            Some(r) if r < current_revision => Err(StoreError::InvariantViolation(format!(
                "revision cannot go from {} back to {}",
                current_revision, r
            ))),
            _ => Ok(()),
        }
    }

    pub fn is_synced(&self, id: RecordId) -> StoreResult<bool> {
        Ok(self.status(id)?.synced)
    }

    pub fn get_revision(&self, id: RecordId) -> StoreResult<i64> {
        Ok(self.status(id)?.revision)
    }

    pub fn get_server_id(&self, id: RecordId) -> StoreResult<i64> {
        Ok(self.status(id)?.server_id)
    }

    /// Read all three reserved columns without loading the full row
    pub fn status(&self, id: RecordId) -> StoreResult<SyncStatus> {
        let cols = self
            .records
            .fetch_columns(id, &[COLUMN_REVISION, COLUMN_SID, COLUMN_SYNCED])?;

        Ok(SyncStatus {
            revision: cols.revision().unwrap_or(1),
            server_id: cols.server_id().unwrap_or(0),
            synced: cols.synced().unwrap_or(false),
        })
    }

    /// Record the id the remote authority assigned
    ///
    /// Revision and synced flag are left as they are.
    pub fn mark_server_accepted(&self, id: RecordId, server_id: i64) -> StoreResult<()> {
        let updated = self
            .records
            .update(id, &Attributes::new().with(COLUMN_SID, server_id))?;
        if !updated {
            return Err(StoreError::find_not_found(id));
        }

        debug!(id, server_id, "server accepted find");
        Ok(())
    }

    /// Set the synced flag directly
    pub fn set_synced(&self, id: RecordId, synced: bool) -> StoreResult<bool> {
        self.records
            .update(id, &Attributes::new().with(COLUMN_SYNCED, synced))
    }

    /// Overwrite the revision, refusing to lower it
    pub fn set_revision(&self, id: RecordId, revision: i64) -> StoreResult<bool> {
        let current = self.get_revision(id)?;
        let incoming = Attributes::new().with(COLUMN_REVISION, revision);
        if let Err(e) = Self::check_revision(current, &incoming) {
            warn!(id, current, revision, "rejected revision rollback");
            return Err(e);
        }
        self.records.update(id, &incoming)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;

    fn setup() -> (RecordStore, SyncState) {
        let records = RecordStore::new(Database::open_in_memory().unwrap());
        (records.clone(), SyncState::new(records))
    }

    #[test]
    fn test_prepare_mutation_when_synced() {
        let incoming = Attributes::new().with("name", "Toad");
        let out = SyncState::prepare_mutation(3, true, incoming.clone());

        assert_eq!(out.synced(), Some(false));
        assert_eq!(out.revision(), Some(4));
        assert_eq!(out.get_text("name"), Some("Toad"));
        // caller's map is untouched
        assert!(!incoming.contains("revision"));
    }

    #[test]
    fn test_prepare_mutation_when_dirty() {
        let incoming = Attributes::new().with("name", "Bullfrog");
        let out = SyncState::prepare_mutation(3, false, incoming.clone());
        assert_eq!(out, incoming);
    }

    #[test]
    fn test_prepare_mutation_overrides_incoming_flags() {
        let incoming = Attributes::new().with("synced", true).with("revision", 1);
        let out = SyncState::prepare_mutation(2, true, incoming);
        assert_eq!(out.synced(), Some(false));
        assert_eq!(out.revision(), Some(3));
    }

    #[test]
    fn test_check_revision() {
        assert!(SyncState::check_revision(3, &Attributes::new()).is_ok());
        assert!(SyncState::check_revision(3, &Attributes::new().with("revision", 3)).is_ok());
        assert!(SyncState::check_revision(3, &Attributes::new().with("revision", 2)).is_err());
    }

    #[test]
    fn test_status_defaults() {
        let (records, sync) = setup();
        let id = records.create(&Attributes::new()).unwrap();

        let status = sync.status(id).unwrap();
        assert_eq!(
            status,
            SyncStatus {
                revision: 1,
                server_id: 0,
                synced: false
            }
        );
        assert!(!status.has_server_id());
        assert!(!sync.is_synced(id).unwrap());
        assert_eq!(sync.get_revision(id).unwrap(), 1);
    }

    #[test]
    fn test_status_missing_is_not_found() {
        let (_records, sync) = setup();
        assert!(sync.is_synced(5).unwrap_err().is_not_found());
        assert!(sync.get_revision(5).unwrap_err().is_not_found());
    }

    #[test]
    fn test_mark_server_accepted_leaves_sync_columns() {
        let (records, sync) = setup();
        let id = records.create(&Attributes::new()).unwrap();
        sync.set_synced(id, true).unwrap();

        sync.mark_server_accepted(id, 314).unwrap();

        let status = sync.status(id).unwrap();
        assert_eq!(status.server_id, 314);
        assert_eq!(status.revision, 1);
        assert!(status.synced);
        assert!(sync.mark_server_accepted(999, 1).unwrap_err().is_not_found());
    }

    #[test]
    fn test_set_revision_is_monotonic() {
        let (records, sync) = setup();
        let id = records.create(&Attributes::new()).unwrap();

        assert!(sync.set_revision(id, 4).unwrap());
        assert_eq!(sync.get_revision(id).unwrap(), 4);

        let err = sync.set_revision(id, 2).unwrap_err();
        assert!(matches!(err, StoreError::InvariantViolation(_)));
        assert_eq!(sync.get_revision(id).unwrap(), 4);
    }
}
