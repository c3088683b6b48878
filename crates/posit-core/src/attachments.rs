//! Attachment lifecycle
//!
//! `AttachmentStore` adds, lists, and deletes the ordered attachments of a
//! find. Positions are zero-based and dense: every deletion path shifts the
//! attachments after it down by one.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, warn};

use crate::models::{Attachment, AttachmentId, PayloadRef, RecordId};
use crate::payload::PayloadStore;
use crate::storage::{Database, StoreError, StoreResult};

/// Attachment storage scoped by owning find
#[derive(Clone)]
pub struct AttachmentStore {
    db: Database,
    payloads: Arc<dyn PayloadStore>,
}

impl AttachmentStore {
    pub fn new(db: Database, payloads: Arc<dyn PayloadStore>) -> Self {
        Self { db, payloads }
    }

    /// Append an attachment at the owner's next free position
    ///
    /// The owner must already have a row.
    pub fn add(&self, owner: RecordId, payload: PayloadRef) -> StoreResult<AttachmentId> {
        let (id, position) = self
            .db
            .with_transaction(|tx| insert_attachment(tx, owner, &payload))?;

        debug!(owner, id, position, "added attachment");
        Ok(id)
    }

    /// Append several attachments in order, all or none
    pub fn add_all(
        &self,
        owner: RecordId,
        payloads: &[PayloadRef],
    ) -> StoreResult<Vec<AttachmentId>> {
        let ids = self.db.with_transaction(|tx| {
            payloads
                .iter()
                .map(|payload| insert_attachment(tx, owner, payload).map(|(id, _)| id))
                .collect::<StoreResult<Vec<_>>>()
        })?;

        debug!(owner, added = ids.len(), "added attachments");
        Ok(ids)
    }

    /// Lazily walk the owner's attachments in position order
    ///
    /// The sequence is live: each step re-queries the store, so attachments
    /// added or removed mid-walk are seen. Call [`Attachments::restart`] or
    /// this method again to re-evaluate from position 0.
    pub fn list_by_owner(&self, owner: RecordId) -> Attachments {
        Attachments {
            store: self.clone(),
            owner,
            last_seen: None,
            done: false,
        }
    }

    /// Collect the owner's attachments in position order
    pub fn all_by_owner(&self, owner: RecordId) -> StoreResult<Vec<Attachment>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, find_id, position, payload, created_at FROM attachments WHERE find_id = ? ORDER BY position",
            )?;
            let attachments = stmt
                .query_map(params![owner], attachment_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(attachments)
        })
    }

    pub fn count_by_owner(&self, owner: RecordId) -> StoreResult<usize> {
        self.db.with_conn(|conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM attachments WHERE find_id = ?",
                params![owner],
                |row| row.get(0),
            )?;
            Ok(n as usize)
        })
    }

    /// Total attachments across all owners
    pub fn count(&self) -> StoreResult<usize> {
        self.db.with_conn(|conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM attachments", [], |row| row.get(0))?;
            Ok(n as usize)
        })
    }

    /// Payload of the attachment at `position`
    pub fn get_by_position(&self, owner: RecordId, position: usize) -> StoreResult<PayloadRef> {
        self.db
            .with_conn(|conn| attachment_at(conn, owner, position))?
            .map(|a| a.payload)
            .ok_or_else(|| StoreError::attachment_not_found(format!("{}@{}", owner, position)))
    }

    /// Look up one attachment by id
    pub fn get(&self, id: AttachmentId) -> StoreResult<Attachment> {
        self.db
            .with_conn(|conn| {
                Ok(conn
                    .query_row(
                        "SELECT id, find_id, position, payload, created_at FROM attachments WHERE id = ?",
                        params![id],
                        attachment_from_row,
                    )
                    .optional()?)
            })?
            .ok_or_else(|| StoreError::attachment_not_found(id))
    }

    /// Delete one attachment, releasing its payload first
    ///
    /// Returns `false` when no such attachment exists.
    pub fn delete_by_id(&self, id: AttachmentId) -> StoreResult<bool> {
        match self.get(id) {
            Ok(attachment) => self.remove(&attachment),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Delete the attachment at `position` and re-pack the ones after it
    pub fn delete_by_position(&self, owner: RecordId, position: usize) -> StoreResult<bool> {
        match self.db.with_conn(|conn| attachment_at(conn, owner, position))? {
            Some(attachment) => self.remove(&attachment),
            None => Ok(false),
        }
    }

    /// Delete every attachment of `owner`, all or none
    ///
    /// Payloads are released from the highest position down inside one
    /// transaction. The first payload that cannot be released rolls back
    /// every row deletion and `false` is returned. Payloads released before
    /// the failure are gone, which a retry treats as already released. An
    /// owner with no attachments succeeds.
    pub fn delete_all_by_owner(&self, owner: RecordId) -> StoreResult<bool> {
        let mut attachments = self.all_by_owner(owner)?;
        attachments.reverse();

        let mut refused = None;
        let result = self.db.with_transaction(|tx| {
            for attachment in &attachments {
                if let Err(e) = self.payloads.release(&attachment.payload) {
                    refused = Some((attachment.id, e));
                    return Err(StoreError::StorageFailure(
                        "payload release failed".to_string(),
                    ));
                }
                tx.execute("DELETE FROM attachments WHERE id = ?", params![attachment.id])?;
            }
            Ok(())
        });

        if let Some((attachment, e)) = refused {
            warn!(owner, attachment, error = %e, "aborting attachment deletion");
            return Ok(false);
        }
        result?;

        debug!(owner, removed = attachments.len(), "deleted all attachments");
        Ok(true)
    }

    fn remove(&self, attachment: &Attachment) -> StoreResult<bool> {
        self.payloads.release(&attachment.payload)?;

        let removed = self.db.with_transaction(|tx| {
            let affected =
                tx.execute("DELETE FROM attachments WHERE id = ?", params![attachment.id])?;
            if affected != 1 {
                return Ok(false);
            }
            tx.execute(
                "UPDATE attachments SET position = position - 1 WHERE find_id = ? AND position > ?",
                params![attachment.find_id, attachment.position as i64],
            )?;
            Ok(true)
        })?;

        debug!(
            owner = attachment.find_id,
            id = attachment.id,
            position = attachment.position,
            removed,
            "deleted attachment"
        );
        Ok(removed)
    }
}

/// Live, restartable cursor over one owner's attachments
///
/// Within one owner, position order is insertion order and so follows
/// attachment id. The cursor resumes after the last id it yielded, so
/// deleting an attachment it already passed does not make it skip one.
pub struct Attachments {
    store: AttachmentStore,
    owner: RecordId,
    last_seen: Option<AttachmentId>,
    done: bool,
}

impl Attachments {
    /// Start over from position 0
    pub fn restart(&mut self) {
        self.last_seen = None;
        self.done = false;
    }

    pub fn owner(&self) -> RecordId {
        self.owner
    }
}

impl Iterator for Attachments {
    type Item = StoreResult<Attachment>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let owner = self.owner;
        let after = self.last_seen.unwrap_or(0);
        let step = self.store.db.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT id, find_id, position, payload, created_at FROM attachments WHERE find_id = ? AND id > ? ORDER BY position LIMIT 1",
                    params![owner, after],
                    attachment_from_row,
                )
                .optional()?)
        });

        match step {
            Ok(Some(attachment)) => {
                self.last_seen = Some(attachment.id);
                Some(Ok(attachment))
            }
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Append `payload` after the owner's last attachment
///
/// Returns the new id and its position. The owner must have a row and the
/// reference must not be empty.
pub(crate) fn insert_attachment(
    conn: &Connection,
    owner: RecordId,
    payload: &PayloadRef,
) -> StoreResult<(AttachmentId, usize)> {
    if payload.as_str().trim().is_empty() {
        return Err(StoreError::InvariantViolation(format!(
            "cannot attach an empty payload reference to find {}",
            owner
        )));
    }

    let owner_exists = conn
        .prepare("SELECT 1 FROM finds WHERE id = ?")?
        .exists(params![owner])?;
    if !owner_exists {
        return Err(StoreError::InvariantViolation(format!(
            "cannot attach to find {}: no such row",
            owner
        )));
    }

    let position: i64 = conn.query_row(
        "SELECT COALESCE(MAX(position) + 1, 0) FROM attachments WHERE find_id = ?",
        params![owner],
        |row| row.get(0),
    )?;

    conn.execute(
        "INSERT INTO attachments (find_id, position, payload, created_at) VALUES (?, ?, ?, ?)",
        params![owner, position, payload.as_str(), Utc::now().timestamp_millis()],
    )?;
    Ok((conn.last_insert_rowid(), position.max(0) as usize))
}

fn attachment_at(
    conn: &Connection,
    owner: RecordId,
    position: usize,
) -> StoreResult<Option<Attachment>> {
    Ok(conn
        .query_row(
            "SELECT id, find_id, position, payload, created_at FROM attachments WHERE find_id = ? AND position = ?",
            params![owner, position as i64],
            attachment_from_row,
        )
        .optional()?)
}

fn attachment_from_row(row: &Row<'_>) -> rusqlite::Result<Attachment> {
    let position: i64 = row.get(2)?;
    let payload: String = row.get(3)?;
    let created_at: i64 = row.get(4)?;
    Ok(Attachment {
        id: row.get(0)?,
        find_id: row.get(1)?,
        position: position.max(0) as usize,
        payload: PayloadRef::new(payload),
        created_at: DateTime::from_timestamp_millis(created_at).unwrap_or_else(Utc::now),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Attributes;
    use crate::payload::RetainPayloads;
    use crate::records::RecordStore;
    use std::sync::Mutex;

    /// Records every release and fails on payloads containing "locked"
    #[derive(Default)]
    struct RecordingPayloads {
        released: Mutex<Vec<String>>,
    }

    impl PayloadStore for RecordingPayloads {
        fn release(&self, payload: &PayloadRef) -> StoreResult<()> {
            if payload.as_str().contains("locked") {
                return Err(StoreError::PayloadRelease {
                    payload: payload.to_string(),
                    source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "locked"),
                });
            }
            self.released.lock().unwrap().push(payload.to_string());
            Ok(())
        }
    }

    fn setup() -> (RecordStore, AttachmentStore) {
        let db = Database::open_in_memory().unwrap();
        (
            RecordStore::new(db.clone()),
            AttachmentStore::new(db, Arc::new(RetainPayloads)),
        )
    }

    fn positions(store: &AttachmentStore, owner: RecordId) -> Vec<(usize, String)> {
        store
            .all_by_owner(owner)
            .unwrap()
            .into_iter()
            .map(|a| (a.position, a.payload.to_string()))
            .collect()
    }

    #[test]
    fn test_add_appends_positions() {
        let (records, attachments) = setup();
        let owner = records.create(&Attributes::new()).unwrap();

        attachments.add(owner, "img-a".into()).unwrap();
        attachments.add(owner, "img-b".into()).unwrap();

        assert_eq!(
            positions(&attachments, owner),
            vec![(0, "img-a".to_string()), (1, "img-b".to_string())]
        );
        assert_eq!(attachments.count_by_owner(owner).unwrap(), 2);
    }

    #[test]
    fn test_add_requires_existing_owner() {
        let (_records, attachments) = setup();
        let err = attachments.add(42, "img".into()).unwrap_err();
        assert!(matches!(err, StoreError::InvariantViolation(_)));
    }

    #[test]
    fn test_positions_are_per_owner() {
        let (records, attachments) = setup();
        let a = records.create(&Attributes::new()).unwrap();
        let b = records.create(&Attributes::new()).unwrap();

        attachments.add(a, "a0".into()).unwrap();
        attachments.add(b, "b0".into()).unwrap();
        attachments.add(a, "a1".into()).unwrap();

        assert_eq!(attachments.get_by_position(a, 1).unwrap().as_str(), "a1");
        assert_eq!(attachments.get_by_position(b, 0).unwrap().as_str(), "b0");
        assert!(attachments.get_by_position(b, 1).unwrap_err().is_not_found());
    }

    #[test]
    fn test_delete_by_position_repacks() {
        let (records, attachments) = setup();
        let owner = records.create(&Attributes::new()).unwrap();
        for name in ["p0", "p1", "p2", "p3"] {
            attachments.add(owner, name.into()).unwrap();
        }

        assert!(attachments.delete_by_position(owner, 1).unwrap());

        assert_eq!(
            positions(&attachments, owner),
            vec![
                (0, "p0".to_string()),
                (1, "p2".to_string()),
                (2, "p3".to_string())
            ]
        );
        assert!(!attachments.delete_by_position(owner, 3).unwrap());
    }

    #[test]
    fn test_delete_by_id_repacks() {
        let (records, attachments) = setup();
        let owner = records.create(&Attributes::new()).unwrap();
        let first = attachments.add(owner, "p0".into()).unwrap();
        attachments.add(owner, "p1".into()).unwrap();

        assert!(attachments.delete_by_id(first).unwrap());
        assert_eq!(positions(&attachments, owner), vec![(0, "p1".to_string())]);
        assert!(!attachments.delete_by_id(first).unwrap());
    }

    #[test]
    fn test_delete_all_with_no_attachments_succeeds() {
        let (records, attachments) = setup();
        let owner = records.create(&Attributes::new()).unwrap();
        assert!(attachments.delete_all_by_owner(owner).unwrap());
    }

    #[test]
    fn test_delete_all_releases_payloads() {
        let db = Database::open_in_memory().unwrap();
        let records = RecordStore::new(db.clone());
        let payloads = Arc::new(RecordingPayloads::default());
        let attachments = AttachmentStore::new(db, payloads.clone());

        let owner = records.create(&Attributes::new()).unwrap();
        attachments.add(owner, "p0".into()).unwrap();
        attachments.add(owner, "p1".into()).unwrap();

        assert!(attachments.delete_all_by_owner(owner).unwrap());
        assert_eq!(attachments.count_by_owner(owner).unwrap(), 0);
        assert_eq!(
            *payloads.released.lock().unwrap(),
            vec!["p1".to_string(), "p0".to_string()]
        );
    }

    #[test]
    fn test_delete_all_failed_release_keeps_every_attachment() {
        let db = Database::open_in_memory().unwrap();
        let records = RecordStore::new(db.clone());
        let payloads = Arc::new(RecordingPayloads::default());
        let attachments = AttachmentStore::new(db, payloads.clone());

        let owner = records.create(&Attributes::new()).unwrap();
        attachments.add(owner, "p0".into()).unwrap();
        attachments.add(owner, "locked".into()).unwrap();
        attachments.add(owner, "p2".into()).unwrap();

        assert!(!attachments.delete_all_by_owner(owner).unwrap());

        assert_eq!(
            positions(&attachments, owner),
            vec![
                (0, "p0".to_string()),
                (1, "locked".to_string()),
                (2, "p2".to_string())
            ]
        );
        // p2 was released before the failure; its row is back all the same
        assert_eq!(*payloads.released.lock().unwrap(), vec!["p2".to_string()]);
    }

    #[test]
    fn test_add_all_is_all_or_nothing() {
        let (records, attachments) = setup();
        let owner = records.create(&Attributes::new()).unwrap();

        let ids = attachments
            .add_all(owner, &["a".into(), "b".into()])
            .unwrap();
        assert_eq!(ids.len(), 2);

        let err = attachments
            .add_all(owner, &["c".into(), " ".into()])
            .unwrap_err();
        assert!(matches!(err, StoreError::InvariantViolation(_)));
        assert_eq!(
            positions(&attachments, owner),
            vec![(0, "a".to_string()), (1, "b".to_string())]
        );
    }

    #[test]
    fn test_failed_release_keeps_single_attachment() {
        let db = Database::open_in_memory().unwrap();
        let records = RecordStore::new(db.clone());
        let attachments =
            AttachmentStore::new(db, Arc::new(RecordingPayloads::default()));

        let owner = records.create(&Attributes::new()).unwrap();
        attachments.add(owner, "locked".into()).unwrap();

        let err = attachments.delete_by_position(owner, 0).unwrap_err();
        assert!(matches!(err, StoreError::PayloadRelease { .. }));
        assert_eq!(attachments.count_by_owner(owner).unwrap(), 1);
    }

    #[test]
    fn test_list_by_owner_is_lazy_and_live() {
        let (records, attachments) = setup();
        let owner = records.create(&Attributes::new()).unwrap();
        attachments.add(owner, "p0".into()).unwrap();
        attachments.add(owner, "p1".into()).unwrap();

        let mut cursor = attachments.list_by_owner(owner);
        let first = cursor.next().unwrap().unwrap();
        assert_eq!(first.payload.as_str(), "p0");

        // Added mid-walk, still visited
        attachments.add(owner, "p2".into()).unwrap();

        let rest: Vec<String> = cursor
            .by_ref()
            .map(|a| a.unwrap().payload.to_string())
            .collect();
        assert_eq!(rest, vec!["p1".to_string(), "p2".to_string()]);
        assert!(cursor.next().is_none());

        cursor.restart();
        assert_eq!(cursor.count(), 3);
    }

    #[test]
    fn test_list_by_owner_survives_deleting_visited_item() {
        let (records, attachments) = setup();
        let owner = records.create(&Attributes::new()).unwrap();
        for name in ["p0", "p1", "p2"] {
            attachments.add(owner, name.into()).unwrap();
        }

        let mut cursor = attachments.list_by_owner(owner);
        assert_eq!(cursor.next().unwrap().unwrap().payload.as_str(), "p0");

        // p1 shifts down to position 0 and must still be visited
        assert!(attachments.delete_by_position(owner, 0).unwrap());

        let rest: Vec<(usize, String)> = cursor
            .map(|a| {
                let a = a.unwrap();
                (a.position, a.payload.to_string())
            })
            .collect();
        assert_eq!(rest, vec![(0, "p1".to_string()), (1, "p2".to_string())]);
    }

    #[test]
    fn test_list_by_owner_empty() {
        let (records, attachments) = setup();
        let owner = records.create(&Attributes::new()).unwrap();
        assert_eq!(attachments.list_by_owner(owner).count(), 0);
    }

    #[test]
    fn test_owner_row_cannot_be_deleted_with_attachments() {
        let (records, attachments) = setup();
        let owner = records.create(&Attributes::new()).unwrap();
        attachments.add(owner, "p0".into()).unwrap();

        let err = records.delete(owner).unwrap_err();
        assert!(matches!(err, StoreError::InvariantViolation(_)));
        assert!(records.exists(owner).unwrap());
    }
}
