//! Row storage for finds
//!
//! `RecordStore` owns create/read/update/delete of find rows. Reserved sync
//! attributes are kept in columns of `finds`; all other attributes are rows
//! of `find_attributes`. Each call is atomic on its own; no transaction spans
//! two calls.

use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use tracing::debug;

use crate::attachments::insert_attachment;
use crate::models::{
    is_reserved, normalize_name, AttributeValue, Attributes, PayloadRef, RecordId,
    COLUMN_REVISION, COLUMN_SID, COLUMN_SYNCED,
};
use crate::storage::{Database, StoreError, StoreResult};

/// Durable storage of find rows keyed by id
#[derive(Clone)]
pub struct RecordStore {
    db: Database,
}

impl RecordStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a new row and return its permanent id
    ///
    /// Missing `revision` defaults to 1 and missing `sid` to 0.
    pub fn create(&self, attributes: &Attributes) -> StoreResult<RecordId> {
        self.create_with_attachments(attributes, &[])
    }

    /// Insert a new row and its first attachments in one transaction
    ///
    /// Either the row and every attachment are stored, or nothing is.
    pub fn create_with_attachments(
        &self,
        attributes: &Attributes,
        payloads: &[PayloadRef],
    ) -> StoreResult<RecordId> {
        let id = self.db.with_transaction(|tx| {
            let id = insert_row(tx, attributes)?;
            for payload in payloads {
                insert_attachment(tx, id, payload)?;
            }
            Ok(id)
        })?;

        debug!(id, attachments = payloads.len(), "created find row");
        Ok(id)
    }

    /// Fetch the full attribute map of a row
    pub fn fetch(&self, id: RecordId) -> StoreResult<Attributes> {
        self.db.with_conn(|conn| {
            let reserved = read_reserved(conn, id)?;

            let mut stmt = conn.prepare(
                "SELECT name, text_value, int_value FROM find_attributes WHERE find_id = ? ORDER BY name",
            )?;
            let rows = stmt
                .query_map(params![id], |row| {
                    let name: String = row.get(0)?;
                    let text: Option<String> = row.get(1)?;
                    let int: Option<i64> = row.get(2)?;
                    Ok((name, text, int))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            let attributes = rows
                .into_iter()
                .filter_map(|(name, text, int)| value_from_columns(text, int).map(|v| (name, v)))
                .fold(reserved, |attrs, (name, value)| attrs.with(name, value));
            Ok(attributes)
        })
    }

    /// Fetch only the named columns of a row
    ///
    /// Attributes that were never set are left out of the result; a missing
    /// row is `NotFound`.
    pub fn fetch_columns(&self, id: RecordId, names: &[&str]) -> StoreResult<Attributes> {
        self.db.with_conn(|conn| {
            let reserved = read_reserved(conn, id)?;
            let mut out = Attributes::new();

            for name in names {
                let name = normalize_name(name);
                if is_reserved(name) {
                    if let Some(value) = reserved.get(name) {
                        out = out.with(name, value.clone());
                    }
                    continue;
                }

                let value = conn
                    .query_row(
                        "SELECT text_value, int_value FROM find_attributes WHERE find_id = ? AND name = ?",
                        params![id, name],
                        |row| Ok((row.get::<_, Option<String>>(0)?, row.get::<_, Option<i64>>(1)?)),
                    )
                    .optional()?
                    .and_then(|(text, int)| value_from_columns(text, int));
                if let Some(value) = value {
                    out = out.with(name, value);
                }
            }

            Ok(out)
        })
    }

    /// Merge `attributes` into an existing row
    ///
    /// Returns whether exactly one row was affected; a missing row is `false`.
    pub fn update(&self, id: RecordId, attributes: &Attributes) -> StoreResult<bool> {
        let reserved = ReservedColumns::from_attributes(attributes)?;
        reserved.check()?;
        let now = Utc::now().timestamp_millis();

        let mut assignments = vec!["updated_at = ?".to_string()];
        let mut values = vec![Value::Integer(now)];
        if let Some(revision) = reserved.revision {
            assignments.push(format!("{} = ?", COLUMN_REVISION));
            values.push(Value::Integer(revision));
        }
        if let Some(sid) = reserved.sid {
            assignments.push(format!("{} = ?", COLUMN_SID));
            values.push(Value::Integer(sid));
        }
        if let Some(synced) = reserved.synced {
            assignments.push(format!("{} = ?", COLUMN_SYNCED));
            values.push(Value::Integer(synced as i64));
        }
        values.push(Value::Integer(id));

        let sql = format!("UPDATE finds SET {} WHERE id = ?", assignments.join(", "));

        let updated = self.db.with_transaction(|tx| {
            let affected = tx.execute(&sql, params_from_iter(values.iter()))?;
            if affected != 1 {
                return Ok(false);
            }
            write_attributes(tx, id, attributes)?;
            Ok(true)
        })?;

        debug!(id, updated, fields = attributes.len(), "updated find row");
        Ok(updated)
    }

    /// Remove a row and its attributes
    ///
    /// The engine refuses while attachments still reference the row; that
    /// surfaces as `InvariantViolation`.
    pub fn delete(&self, id: RecordId) -> StoreResult<bool> {
        let result = self
            .db
            .with_conn(|conn| Ok(conn.execute("DELETE FROM finds WHERE id = ?", params![id])?));

        match result {
            Ok(affected) => {
                debug!(id, affected, "deleted find row");
                Ok(affected == 1)
            }
            Err(StoreError::Database(rusqlite::Error::SqliteFailure(e, _)))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(StoreError::InvariantViolation(format!(
                    "find {} still has attachments",
                    id
                )))
            }
            Err(e) => Err(e),
        }
    }

    /// Check whether a row exists
    pub fn exists(&self, id: RecordId) -> StoreResult<bool> {
        self.db.with_conn(|conn| {
            Ok(conn
                .prepare("SELECT 1 FROM finds WHERE id = ?")?
                .exists(params![id])?)
        })
    }

    /// Creation and last-update times of a row
    pub fn timestamps(&self, id: RecordId) -> StoreResult<(DateTime<Utc>, DateTime<Utc>)> {
        let (created_at, updated_at): (i64, i64) = self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT created_at, updated_at FROM finds WHERE id = ?",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?
            .ok_or_else(|| StoreError::find_not_found(id))
        })?;

        Ok((
            DateTime::from_timestamp_millis(created_at).unwrap_or_else(Utc::now),
            DateTime::from_timestamp_millis(updated_at).unwrap_or_else(Utc::now),
        ))
    }

    /// All row ids in ascending order
    pub fn ids(&self) -> StoreResult<Vec<RecordId>> {
        self.query_ids("SELECT id FROM finds ORDER BY id", Vec::new())
    }

    /// Ids whose synced flag equals `synced`
    pub fn ids_by_synced(&self, synced: bool) -> StoreResult<Vec<RecordId>> {
        self.query_ids(
            "SELECT id FROM finds WHERE synced = ? ORDER BY id",
            vec![Value::Integer(synced as i64)],
        )
    }

    /// Ids of rows where attribute `name` equals `value`
    pub fn ids_with_attribute(
        &self,
        name: &str,
        value: &AttributeValue,
    ) -> StoreResult<Vec<RecordId>> {
        let name = normalize_name(name);
        if is_reserved(name) {
            let Some(n) = value.as_int() else {
                return Ok(Vec::new());
            };
            return self.query_ids(
                &format!("SELECT id FROM finds WHERE {} = ? ORDER BY id", name),
                vec![Value::Integer(n)],
            );
        }

        let (sql, bound) = match value {
            AttributeValue::Integer(n) => (
                "SELECT find_id FROM find_attributes WHERE name = ? AND int_value = ? ORDER BY find_id",
                Value::Integer(*n),
            ),
            AttributeValue::Text(s) => (
                "SELECT find_id FROM find_attributes WHERE name = ? AND text_value = ? ORDER BY find_id",
                Value::Text(s.clone()),
            ),
        };
        self.query_ids(sql, vec![Value::Text(name.to_string()), bound])
    }

    /// Number of rows
    pub fn count(&self) -> StoreResult<usize> {
        self.db.with_conn(|conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM finds", [], |row| row.get(0))?;
            Ok(n as usize)
        })
    }

    fn query_ids(&self, sql: &str, values: Vec<Value>) -> StoreResult<Vec<RecordId>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let ids = stmt
                .query_map(params_from_iter(values.iter()), |row| row.get(0))?
                .collect::<Result<Vec<RecordId>, _>>()?;
            Ok(ids)
        })
    }
}

// ==================== Internal helpers ====================

/// Reserved columns pulled out of an attribute map
#[derive(Debug, Default)]
struct ReservedColumns {
    revision: Option<i64>,
    sid: Option<i64>,
    synced: Option<bool>,
}

impl ReservedColumns {
    fn from_attributes(attributes: &Attributes) -> StoreResult<Self> {
        let int = |name: &str| -> StoreResult<Option<i64>> {
            match attributes.get(name) {
                None => Ok(None),
                Some(AttributeValue::Integer(n)) => Ok(Some(*n)),
                Some(AttributeValue::Text(s)) => Err(StoreError::InvariantViolation(format!(
                    "reserved attribute '{}' must be an integer, got '{}'",
                    name, s
                ))),
            }
        };

        Ok(Self {
            revision: int(COLUMN_REVISION)?,
            sid: int(COLUMN_SID)?,
            synced: int(COLUMN_SYNCED)?.map(|n| n != 0),
        })
    }

    fn check(&self) -> StoreResult<()> {
        match self.revision {
            Some(r) if r < 1 => Err(StoreError::InvariantViolation(format!(
                "revision must be at least 1, got {}",
                r
            ))),
            _ => Ok(()),
        }
    }
}

/// Insert a row with defaulted reserved columns plus its attributes
fn insert_row(conn: &Connection, attributes: &Attributes) -> StoreResult<RecordId> {
    let attributes = attributes
        .clone()
        .with_default(COLUMN_REVISION, 1)
        .with_default(COLUMN_SID, 0);
    let reserved = ReservedColumns::from_attributes(&attributes)?;
    reserved.check()?;

    let now = Utc::now().timestamp_millis();
    conn.execute(
        "INSERT INTO finds (revision, sid, synced, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        params![
            reserved.revision.unwrap_or(1),
            reserved.sid.unwrap_or(0),
            reserved.synced.unwrap_or(false),
            now,
            now,
        ],
    )?;

    let id = conn.last_insert_rowid();
    if id <= 0 {
        return Err(StoreError::StorageFailure(
            "insert did not allocate a row id".to_string(),
        ));
    }

    write_attributes(conn, id, &attributes)?;
    Ok(id)
}

fn read_reserved(conn: &Connection, id: RecordId) -> StoreResult<Attributes> {
    conn.query_row(
        "SELECT revision, sid, synced FROM finds WHERE id = ?",
        params![id],
        |row| {
            Ok(Attributes::new()
                .with(COLUMN_REVISION, row.get::<_, i64>(0)?)
                .with(COLUMN_SID, row.get::<_, i64>(1)?)
                .with(COLUMN_SYNCED, row.get::<_, i64>(2)?))
        },
    )
    .optional()?
    .ok_or_else(|| StoreError::find_not_found(id))
}

/// Upsert every non-reserved attribute
fn write_attributes(conn: &Connection, id: RecordId, attributes: &Attributes) -> StoreResult<()> {
    let mut stmt = conn.prepare(
        r#"
        INSERT INTO find_attributes (find_id, name, text_value, int_value)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(find_id, name) DO UPDATE SET
            text_value = excluded.text_value,
            int_value = excluded.int_value
        "#,
    )?;

    for (name, value) in attributes.iter().filter(|(name, _)| !is_reserved(name)) {
        stmt.execute(params![id, name, value.as_text(), value.as_int()])?;
    }
    Ok(())
}

fn value_from_columns(text: Option<String>, int: Option<i64>) -> Option<AttributeValue> {
    match (int, text) {
        (Some(n), _) => Some(AttributeValue::Integer(n)),
        (None, Some(s)) => Some(AttributeValue::Text(s)),
        (None, None) => None,
    }
}
