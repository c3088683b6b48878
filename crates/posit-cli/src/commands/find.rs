//! Find command handlers

use std::path::PathBuf;

use anyhow::{Context, Result};

use posit_core::{AttributeValue, Attributes, Config, Repository};

use super::confirm;
use super::image::Imports;
use crate::output::Output;

/// Create a new find, copying any images into the attachments directory
pub fn create(
    repo: &Repository,
    config: &Config,
    attributes: Vec<(String, AttributeValue)>,
    images: Vec<PathBuf>,
    output: &Output,
) -> Result<()> {
    let imports = Imports::copy(config, &images)?;

    let find = repo
        .create(
            attributes.into_iter().collect::<Attributes>(),
            imports.payloads().to_vec(),
        )
        .context("Failed to create find")?;
    imports.keep();
    let id = find.id().context("Created find has no id")?;

    output.success(&format!("Created find: {}", id));
    output.print_find(&repo.get(id)?)
}

/// List finds, optionally only the unsynced ones
pub fn list(repo: &Repository, unsynced: bool, output: &Output) -> Result<()> {
    let finds = if unsynced {
        repo.unsynced()?
            .into_iter()
            .map(|id| repo.get(id))
            .collect::<Result<Vec<_>, _>>()?
    } else {
        repo.list()?
    };

    output.print_finds(&finds)
}

/// Show a single find
pub fn show(repo: &Repository, id: i64, output: &Output) -> Result<()> {
    let find = repo
        .get(id)
        .with_context(|| format!("Failed to load find {}", id))?;
    output.print_find(&find)
}

/// Update attributes of a find
pub fn update(
    repo: &Repository,
    id: i64,
    attributes: Vec<(String, AttributeValue)>,
    output: &Output,
) -> Result<()> {
    let updated = repo
        .update(id, attributes.into_iter().collect())
        .context("Failed to update find")?;

    if !updated {
        anyhow::bail!("Find not found: {}", id);
    }

    output.success(&format!("Updated find: {}", id));
    output.print_find(&repo.get(id)?)
}

/// Delete a find and its images
pub fn delete(repo: &Repository, id: i64, force: bool, output: &Output) -> Result<()> {
    let find = repo.entity(id)?;

    if output.should_prompt() && !force {
        let images = find.attachment_count()?;
        println!("Delete find {} and its {} image(s)", id, images);
        if !confirm("Are you sure?")? {
            println!("Cancelled.");
            return Ok(());
        }
    }

    if find.delete().context("Failed to delete find")? {
        output.success(&format!("Deleted find: {}", id));
    } else {
        output.warning(&format!(
            "Find {} was not deleted: some images could not be removed",
            id
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::OutputFormat;
    use tempfile::TempDir;

    fn setup(temp_dir: &TempDir) -> (Config, Repository, PathBuf) {
        let config = Config {
            data_dir: temp_dir.path().to_path_buf(),
            ..Config::default()
        };
        let repo = Repository::open_with_config(&config).unwrap();
        let image = temp_dir.path().join("frog.jpg");
        std::fs::write(&image, b"jpeg").unwrap();
        (config, repo, image)
    }

    fn imported_files(config: &Config) -> usize {
        std::fs::read_dir(config.attachments_path())
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    #[test]
    fn test_create_with_image() {
        let temp_dir = TempDir::new().unwrap();
        let (config, repo, image) = setup(&temp_dir);
        let output = Output::new(OutputFormat::Quiet);

        create(
            &repo,
            &config,
            vec![("name".to_string(), AttributeValue::from("Frog"))],
            vec![image],
            &output,
        )
        .unwrap();

        let finds = repo.list().unwrap();
        assert_eq!(finds.len(), 1);
        assert_eq!(finds[0].attachments.len(), 1);
        assert_eq!(imported_files(&config), 1);
    }

    #[test]
    fn test_rejected_create_removes_image_copies() {
        let temp_dir = TempDir::new().unwrap();
        let (config, repo, image) = setup(&temp_dir);
        let output = Output::new(OutputFormat::Quiet);

        let result = create(
            &repo,
            &config,
            vec![("revision".to_string(), AttributeValue::Integer(0))],
            vec![image.clone()],
            &output,
        );

        assert!(result.is_err());
        assert_eq!(repo.count().unwrap(), 0);
        assert_eq!(imported_files(&config), 0);
        assert!(image.exists());
    }
}
