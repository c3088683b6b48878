//! SQLite schema for finds and their attachments
//!
//! Reserved sync columns (`revision`, `sid`, `synced`) live on the `finds`
//! table; free-form attributes live in `find_attributes`.

use rusqlite::{Connection, Result};

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Schema version tracking
        CREATE TABLE IF NOT EXISTS schema_info (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        -- One row per find; AUTOINCREMENT never reuses ids
        CREATE TABLE IF NOT EXISTS finds (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            revision INTEGER NOT NULL DEFAULT 1,
            sid INTEGER NOT NULL DEFAULT 0,
            synced INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        -- Free-form attributes (one-to-many)
        CREATE TABLE IF NOT EXISTS find_attributes (
            find_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            text_value TEXT,
            int_value INTEGER,
            PRIMARY KEY (find_id, name),
            FOREIGN KEY (find_id) REFERENCES finds(id) ON DELETE CASCADE
        );

        -- Attachments; no cascade so a find cannot lose its row while
        -- attachments still reference it
        CREATE TABLE IF NOT EXISTS attachments (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            find_id INTEGER NOT NULL,
            position INTEGER NOT NULL,
            payload TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            FOREIGN KEY (find_id) REFERENCES finds(id)
        );

        -- Positions are re-packed in place, so this index is not unique
        CREATE INDEX IF NOT EXISTS idx_attachments_find_position
            ON attachments(find_id, position);

        CREATE INDEX IF NOT EXISTS idx_finds_synced ON finds(synced);
        CREATE INDEX IF NOT EXISTS idx_find_attributes_name ON find_attributes(name);
        "#,
    )?;

    conn.execute(
        "INSERT OR REPLACE INTO schema_info (key, value) VALUES ('version', ?)",
        [SCHEMA_VERSION.to_string()],
    )?;

    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> Result<Option<i32>> {
    let mut stmt = conn.prepare("SELECT value FROM schema_info WHERE key = 'version'")?;
    let result: Result<String> = stmt.query_row([], |row| row.get(0));

    match result {
        Ok(version_str) => Ok(version_str.parse().ok()),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Check if schema needs initialization or migration
pub fn needs_init(conn: &Connection) -> bool {
    let table_exists: bool = conn
        .prepare("SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_info'")
        .and_then(|mut stmt| stmt.exists([]))
        .unwrap_or(false);

    if !table_exists {
        return true;
    }

    match get_schema_version(conn) {
        Ok(Some(v)) => v < SCHEMA_VERSION,
        _ => true,
    }
}
