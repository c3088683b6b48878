//! Sync bookkeeping command handlers
//!
//! These record what the sync server reported; the transfer itself is done
//! by the sync client.

use anyhow::{Context, Result};

use posit_core::Repository;

use crate::output::Output;

/// Record the server-assigned id of a find
pub fn accept(repo: &Repository, id: i64, server_id: i64, output: &Output) -> Result<()> {
    repo.sync()
        .mark_server_accepted(id, server_id)
        .with_context(|| format!("Failed to record server id for find {}", id))?;

    output.success(&format!("Find {} has server id {}", id, server_id));
    Ok(())
}

/// Mark a find as matching the server
pub fn mark(repo: &Repository, id: i64, output: &Output) -> Result<()> {
    let find = repo.entity(id)?;
    find.set_synced(true).context("Failed to mark find synced")?;

    output.success(&format!("Find {} marked synced at revision {}", id, find.revision()?));
    Ok(())
}

/// List ids of finds with unsynced changes
pub fn pending(repo: &Repository, output: &Output) -> Result<()> {
    output.print_ids(&repo.unsynced()?)
}
