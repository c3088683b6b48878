//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use anyhow::Result;
use serde::Serialize;

use posit_core::{Attachment, EntitySnapshot, RecordId};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Print a value as pretty JSON
    pub fn print_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }

    /// Print a single find with its attachments
    pub fn print_find(&self, find: &EntitySnapshot) -> Result<()> {
        match self.format {
            OutputFormat::Human => {
                println!("ID:        {}", find.id);
                println!("Revision:  {}", find.revision());
                println!("Server ID: {}", server_id_label(find.server_id()));
                println!("Synced:    {}", if find.is_synced() { "yes" } else { "no" });
                println!("Created:   {}", find.created_at.format("%Y-%m-%d %H:%M"));
                println!("Updated:   {}", find.updated_at.format("%Y-%m-%d %H:%M"));

                let fields: Vec<_> = find
                    .attributes
                    .iter()
                    .filter(|(name, _)| !posit_core::models::is_reserved(name))
                    .collect();
                if !fields.is_empty() {
                    println!();
                    for (name, value) in fields {
                        println!("  {}: {}", name, value);
                    }
                }

                if !find.attachments.is_empty() {
                    println!();
                    println!("── Images ({}) ──", find.attachments.len());
                    for attachment in &find.attachments {
                        println!("[{}] {}", attachment.position, attachment.payload);
                    }
                }
            }
            OutputFormat::Json => self.print_json(find)?,
            OutputFormat::Quiet => println!("{}", find.id),
        }
        Ok(())
    }

    /// Print a list of finds
    pub fn print_finds(&self, finds: &[EntitySnapshot]) -> Result<()> {
        match self.format {
            OutputFormat::Human => {
                if finds.is_empty() {
                    println!("No finds.");
                    return Ok(());
                }
                for find in finds {
                    let name = find
                        .attributes
                        .get("name")
                        .map(|v| v.to_string())
                        .unwrap_or_default();
                    println!(
                        "{:>5} | r{:<3} | {} | {} | {} image(s)",
                        find.id,
                        find.revision(),
                        if find.is_synced() { "synced" } else { "dirty " },
                        truncate(&name, 30),
                        find.attachments.len()
                    );
                }
                println!("\n{} find(s)", finds.len());
            }
            OutputFormat::Json => self.print_json(finds)?,
            OutputFormat::Quiet => {
                for find in finds {
                    println!("{}", find.id);
                }
            }
        }
        Ok(())
    }

    /// Print the attachments of one find
    pub fn print_attachments(&self, owner: RecordId, attachments: &[Attachment]) -> Result<()> {
        match self.format {
            OutputFormat::Human => {
                if attachments.is_empty() {
                    println!("Find {} has no images.", owner);
                    return Ok(());
                }
                for attachment in attachments {
                    println!(
                        "[{}] {}  (added {})",
                        attachment.position,
                        attachment.payload,
                        attachment.created_at.format("%Y-%m-%d %H:%M")
                    );
                }
            }
            OutputFormat::Json => self.print_json(attachments)?,
            OutputFormat::Quiet => {
                for attachment in attachments {
                    println!("{}", attachment.payload);
                }
            }
        }
        Ok(())
    }

    /// Print a list of ids
    pub fn print_ids(&self, ids: &[RecordId]) -> Result<()> {
        match self.format {
            OutputFormat::Json => self.print_json(ids)?,
            OutputFormat::Human if ids.is_empty() => println!("Nothing pending."),
            _ => {
                for id in ids {
                    println!("{}", id);
                }
            }
        }
        Ok(())
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print a failure that is not an error (nothing to do, aborted)
    pub fn warning(&self, message: &str) {
        match self.format {
            OutputFormat::Human => eprintln!("⚠ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "failed", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Check if we should prompt for confirmation
    pub fn should_prompt(&self) -> bool {
        self.format == OutputFormat::Human
    }
}

fn server_id_label(server_id: i64) -> String {
    if server_id == 0 {
        "(not assigned)".to_string()
    } else {
        server_id.to_string()
    }
}

/// Truncate a string to max characters, adding "..." if truncated
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
