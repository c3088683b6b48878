//! Config command handlers

use anyhow::{Context, Result};

use posit_core::{Config, ConfigKey};

use crate::output::{Output, OutputFormat};

/// Show current configuration
pub fn show(output: &Output) -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;

    match output.format {
        OutputFormat::Json => {
            let values: serde_json::Map<String, serde_json::Value> = ConfigKey::ALL
                .into_iter()
                .map(|key| (key.name().to_string(), json_value(&config, key)))
                .collect();
            output.print_json(&values)?;
        }
        OutputFormat::Quiet => {
            println!("{}", config.data_dir.display());
        }
        OutputFormat::Human => {
            println!("Configuration:");
            for key in ConfigKey::ALL {
                let value = config.get(key);
                println!(
                    "  {:<16} {}",
                    format!("{}:", key),
                    if value.is_empty() { "(not set)" } else { &value }
                );
            }
            println!();
            println!("Config file: {}", Config::config_file_path().display());
        }
    }

    Ok(())
}

/// Set a configuration value and save the file
pub fn set(key: String, value: String, output: &Output) -> Result<()> {
    let key: ConfigKey = key.parse()?;
    let mut config = Config::load().context("Failed to load configuration")?;

    config.set(key, &value)?;
    config.save().context("Failed to save configuration")?;

    output.success(&format!("Set {} = {}", key, config.get(key)));
    Ok(())
}

fn json_value(config: &Config, key: ConfigKey) -> serde_json::Value {
    match key {
        ConfigKey::SyncEnabled => config.sync_enabled.into(),
        ConfigKey::SyncUrl => config.sync_url.clone().into(),
        _ => config.get(key).into(),
    }
}
