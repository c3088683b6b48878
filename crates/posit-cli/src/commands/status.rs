//! Status command handler

use anyhow::Result;

use posit_core::{Config, Repository};

use crate::output::{Output, OutputFormat};

/// Show status information
pub fn show(repo: &Repository, config: &Config, output: &Output) -> Result<()> {
    let stats = repo.stats()?;

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "sync_enabled": config.sync_enabled,
                    "sync_url": config.sync_url,
                    "storage": {
                        "database": config.sqlite_path(),
                        "attachments": config.attachments_path(),
                    },
                    "counts": stats
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", stats.unsynced);
        }
        OutputFormat::Human => {
            println!("POSIT Status");
            println!("============");
            println!();
            println!("Sync:");
            println!(
                "  Status: {}",
                if config.sync_enabled {
                    "enabled"
                } else {
                    "disabled"
                }
            );
            if let Some(ref url) = config.sync_url {
                println!("  Server: {}", url);
            }
            println!();
            println!("Storage:");
            println!("  Database:    {}", config.sqlite_path().display());
            println!("  Attachments: {}", config.attachments_path().display());
            println!();
            println!("Contents:");
            println!("  Finds:    {}", stats.finds);
            println!("  Unsynced: {}", stats.unsynced);
            println!("  Images:   {}", stats.attachments);
        }
    }

    Ok(())
}
