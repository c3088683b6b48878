//! POSIT CLI
//!
//! Command-line interface for POSIT - offline-first finds with attachments.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use posit_core::{AttributeValue, Config, Repository};

mod commands;
mod output;

use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "posit")]
#[command(about = "POSIT - Offline-first field finds with sync bookkeeping")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage finds
    Find {
        #[command(subcommand)]
        command: FindCommands,
    },
    /// Manage images attached to a find
    Image {
        #[command(subcommand)]
        command: ImageCommands,
    },
    /// Record sync results reported by the server
    Sync {
        #[command(subcommand)]
        command: SyncCommands,
    },
    /// Show status (counts, unsynced finds, storage)
    Status,
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand)]
enum FindCommands {
    /// Create a new find
    #[command(alias = "add")]
    Create {
        /// Attribute as name=value (repeatable)
        #[arg(short, long = "attr", value_parser = commands::parse_attribute)]
        attr: Vec<(String, AttributeValue)>,
        /// Image file to attach (repeatable)
        #[arg(short, long)]
        image: Vec<std::path::PathBuf>,
    },
    /// List finds
    #[command(alias = "ls")]
    List {
        /// Only finds with unsynced local changes
        #[arg(short, long)]
        unsynced: bool,
    },
    /// Show a find with its attachments
    Show {
        /// Find ID
        id: i64,
    },
    /// Update attributes of a find
    Update {
        /// Find ID
        id: i64,
        /// Attribute as name=value (repeatable)
        #[arg(short, long = "attr", value_parser = commands::parse_attribute, required = true)]
        attr: Vec<(String, AttributeValue)>,
    },
    /// Delete a find and its attachments
    #[command(alias = "rm")]
    Delete {
        /// Find ID
        id: i64,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Subcommand)]
enum ImageCommands {
    /// Attach an image file to a find
    Add {
        /// Find ID
        id: i64,
        /// Image file (copied into the attachments directory)
        path: std::path::PathBuf,
    },
    /// List a find's images in position order
    #[command(alias = "ls")]
    List {
        /// Find ID
        id: i64,
    },
    /// Remove the image at a position
    #[command(alias = "rm")]
    Delete {
        /// Find ID
        id: i64,
        /// Zero-based position
        position: usize,
    },
}

#[derive(Subcommand)]
enum SyncCommands {
    /// Record the server-assigned id of a find
    Accept {
        /// Find ID
        id: i64,
        /// Server-assigned ID
        server_id: i64,
    },
    /// Mark a find as matching the server
    Mark {
        /// Find ID
        id: i64,
    },
    /// List finds waiting to be pushed
    Pending,
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (data_dir, attachments_dir, sync_url, sync_enabled)
        key: String,
        /// Configuration value
        value: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));

    // Config doesn't need the repository
    if let Commands::Config { command } = &cli.command {
        return handle_config_command(command.clone(), &output);
    }

    let config = Config::load()?;
    let repo = Repository::open_with_config(&config)?;

    match cli.command {
        Commands::Find { command } => handle_find_command(command, &repo, &config, &output),
        Commands::Image { command } => handle_image_command(command, &repo, &config, &output),
        Commands::Sync { command } => handle_sync_command(command, &repo, &output),
        Commands::Status => commands::status::show(&repo, &config, &output),
        Commands::Config { .. } => unreachable!(), // Handled above
    }
}

fn handle_find_command(
    command: FindCommands,
    repo: &Repository,
    config: &Config,
    output: &Output,
) -> Result<()> {
    match command {
        FindCommands::Create { attr, image } => {
            commands::find::create(repo, config, attr, image, output)
        }
        FindCommands::List { unsynced } => commands::find::list(repo, unsynced, output),
        FindCommands::Show { id } => commands::find::show(repo, id, output),
        FindCommands::Update { id, attr } => commands::find::update(repo, id, attr, output),
        FindCommands::Delete { id, force } => commands::find::delete(repo, id, force, output),
    }
}

fn handle_image_command(
    command: ImageCommands,
    repo: &Repository,
    config: &Config,
    output: &Output,
) -> Result<()> {
    match command {
        ImageCommands::Add { id, path } => commands::image::add(repo, config, id, path, output),
        ImageCommands::List { id } => commands::image::list(repo, id, output),
        ImageCommands::Delete { id, position } => {
            commands::image::delete(repo, id, position, output)
        }
    }
}

fn handle_sync_command(command: SyncCommands, repo: &Repository, output: &Output) -> Result<()> {
    match command {
        SyncCommands::Accept { id, server_id } => {
            commands::sync::accept(repo, id, server_id, output)
        }
        SyncCommands::Mark { id } => commands::sync::mark(repo, id, output),
        SyncCommands::Pending => commands::sync::pending(repo, output),
    }
}

fn handle_config_command(command: Option<ConfigCommands>, output: &Output) -> Result<()> {
    match command {
        Some(ConfigCommands::Show) | None => commands::config::show(output),
        Some(ConfigCommands::Set { key, value }) => commands::config::set(key, value, output),
    }
}

/// Log to stderr; level from POSIT_LOG, then RUST_LOG, else warnings only
fn init_logging() {
    let env_filter = EnvFilter::try_from_env("POSIT_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
