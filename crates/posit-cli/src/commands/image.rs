//! Image command handlers

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use uuid::Uuid;

use posit_core::{Config, Entity, PayloadRef, Repository};

use crate::output::Output;

/// Attach an image file to a find
pub fn add(repo: &Repository, config: &Config, id: i64, path: PathBuf, output: &Output) -> Result<()> {
    let find = repo.entity(id)?;
    let payload = attach_file(&find, config, &path)?;

    output.success(&format!("Attached {} to find {}", payload, id));
    Ok(())
}

/// List a find's images
pub fn list(repo: &Repository, id: i64, output: &Output) -> Result<()> {
    let find = repo.entity(id)?;
    let attachments = find
        .attachments()?
        .collect::<Result<Vec<_>, _>>()
        .context("Failed to list images")?;

    output.print_attachments(id, &attachments)
}

/// Remove the image at `position`
pub fn delete(repo: &Repository, id: i64, position: usize, output: &Output) -> Result<()> {
    let find = repo.entity(id)?;

    if find
        .delete_attachment_by_position(position)
        .context("Failed to remove image")?
    {
        output.success(&format!("Removed image {} from find {}", position, id));
    } else {
        output.warning(&format!("Find {} has no image at position {}", id, position));
    }

    Ok(())
}

/// Copy `path` in and attach the copy to `find`
fn attach_file(find: &Entity, config: &Config, path: &Path) -> Result<PayloadRef> {
    let imports = Imports::copy(config, std::slice::from_ref(&path.to_path_buf()))?;
    let payload = imports
        .payloads()
        .first()
        .cloned()
        .context("No image was imported")?;

    find.add_attachment(payload.clone())
        .context("Failed to attach image")?;
    imports.keep();
    Ok(payload)
}

/// Image copies made for one command
///
/// Dropped without [`Imports::keep`], the copies are deleted again so a
/// failed command leaves nothing unreferenced in the attachments directory.
pub struct Imports {
    payloads: Vec<PayloadRef>,
    kept: bool,
}

impl Imports {
    /// Copy every source in order; on failure the earlier copies are removed
    pub fn copy(config: &Config, sources: &[PathBuf]) -> Result<Self> {
        let mut imports = Self {
            payloads: Vec::with_capacity(sources.len()),
            kept: false,
        };
        for source in sources {
            imports.payloads.push(import_file(config, source)?);
        }
        Ok(imports)
    }

    pub fn payloads(&self) -> &[PayloadRef] {
        &self.payloads
    }

    /// The copies are now referenced by the store
    pub fn keep(mut self) {
        self.kept = true;
    }
}

impl Drop for Imports {
    fn drop(&mut self) {
        if self.kept {
            return;
        }
        for payload in &self.payloads {
            if let Err(e) = std::fs::remove_file(payload.as_str()) {
                tracing::warn!(%payload, error = %e, "could not remove unused image copy");
            }
        }
    }
}

/// Copy `source` into the attachments directory under a fresh name
///
/// The copy is owned by the store and deleted with its attachment.
pub fn import_file(config: &Config, source: &Path) -> Result<PayloadRef> {
    let dir = config.attachments_path();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create attachments directory {:?}", dir))?;

    let mut name = Uuid::new_v4().to_string();
    if let Some(ext) = source.extension().and_then(|e| e.to_str()) {
        name.push('.');
        name.push_str(ext);
    }
    let dest = dir.join(name);

    std::fs::copy(source, &dest)
        .with_context(|| format!("Failed to copy {:?} to {:?}", source, dest))?;
    tracing::debug!(source = %source.display(), dest = %dest.display(), "imported image");

    Ok(PayloadRef::new(dest.to_string_lossy().into_owned()))
}
