//! Attachment payload release
//!
//! The store only keeps a [`PayloadRef`]; whoever owns the bytes behind it is
//! told to let them go when the attachment row is deleted.

use std::io;
use std::path::{Component, Path, PathBuf};

use tracing::debug;

use crate::models::PayloadRef;
use crate::storage::{StoreError, StoreResult};

/// Owner of attachment content
pub trait PayloadStore: Send + Sync {
    /// Release the content behind `payload`
    ///
    /// Releasing content that is already gone must succeed.
    fn release(&self, payload: &PayloadRef) -> StoreResult<()>;
}

/// Leaves content alone; its lifecycle is managed elsewhere
#[derive(Debug, Default, Clone, Copy)]
pub struct RetainPayloads;

impl PayloadStore for RetainPayloads {
    fn release(&self, _payload: &PayloadRef) -> StoreResult<()> {
        Ok(())
    }
}

/// Deletes payload files that live under a root directory
///
/// References outside the root (other apps' media, remote URIs) are not
/// touched.
#[derive(Debug, Clone)]
pub struct FilePayloads {
    root: PathBuf,
}

impl FilePayloads {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the file behind `payload`, if it is one this store owns
    pub fn owned_path(&self, payload: &PayloadRef) -> Option<PathBuf> {
        let raw = payload.as_str();
        let path = Path::new(raw.strip_prefix("file://").unwrap_or(raw));

        if path.components().any(|c| matches!(c, Component::ParentDir)) {
            return None;
        }
        if path.starts_with(&self.root) && path != self.root {
            Some(path.to_path_buf())
        } else {
            None
        }
    }
}

impl PayloadStore for FilePayloads {
    fn release(&self, payload: &PayloadRef) -> StoreResult<()> {
        let Some(path) = self.owned_path(payload) else {
            debug!(%payload, "payload not owned by file store, leaving it");
            return Ok(());
        };

        match std::fs::remove_file(&path) {
            Ok(()) => {
                debug!(path = %path.display(), "removed payload file");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::PayloadRelease {
                payload: payload.to_string(),
                source,
            }),
        }
    }
}
