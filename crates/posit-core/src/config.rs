//! POSIT configuration
//!
//! Four settings, each addressable by a [`ConfigKey`]. Values come from
//! `~/.config/posit/config.toml` (or the file named by `POSIT_CONFIG`), and
//! every key can be overridden by its `POSIT_*` environment variable.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Names the config file location when set
pub const CONFIG_PATH_VAR: &str = "POSIT_CONFIG";

/// A setting that can be shown, set, or overridden from the environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    DataDir,
    AttachmentsDir,
    SyncUrl,
    SyncEnabled,
}

impl ConfigKey {
    pub const ALL: [ConfigKey; 4] = [
        ConfigKey::DataDir,
        ConfigKey::AttachmentsDir,
        ConfigKey::SyncUrl,
        ConfigKey::SyncEnabled,
    ];

    /// Name used in the TOML file and on the command line
    pub fn name(self) -> &'static str {
        match self {
            ConfigKey::DataDir => "data_dir",
            ConfigKey::AttachmentsDir => "attachments_dir",
            ConfigKey::SyncUrl => "sync_url",
            ConfigKey::SyncEnabled => "sync_enabled",
        }
    }

    pub fn env_var(self) -> &'static str {
        match self {
            ConfigKey::DataDir => "POSIT_DATA_DIR",
            ConfigKey::AttachmentsDir => "POSIT_ATTACHMENTS_DIR",
            ConfigKey::SyncUrl => "POSIT_SYNC_URL",
            ConfigKey::SyncEnabled => "POSIT_SYNC_ENABLED",
        }
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ConfigKey {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        ConfigKey::ALL
            .into_iter()
            .find(|key| key.name() == s)
            .ok_or_else(|| {
                let valid: Vec<_> = ConfigKey::ALL.iter().map(|k| k.name()).collect();
                anyhow!(
                    "Unknown configuration key: '{}'\nValid keys: {}",
                    s,
                    valid.join(", ")
                )
            })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Holds `posit.db` and, unless `attachments_dir` is set, attachment copies
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachments_dir: Option<PathBuf>,

    /// Server the sync client talks to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_url: Option<String>,

    #[serde(default)]
    pub sync_enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            attachments_dir: None,
            sync_url: None,
            sync_enabled: false,
        }
    }
}

impl Config {
    /// Load from the config file, then the environment; creates `data_dir`
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load from `path` (defaults if it does not exist), then the environment
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content)
                .with_context(|| format!("Invalid config file {:?}", path))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => {
                return Err(e).with_context(|| format!("Cannot read config file {:?}", path))
            }
        };

        config.apply_env_overrides();
        std::fs::create_dir_all(&config.data_dir)
            .with_context(|| format!("Cannot create data directory {:?}", config.data_dir))?;
        Ok(config)
    }

    /// Parse TOML and apply the environment without touching the filesystem
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(toml_content).context("Invalid config TOML")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Set every key whose `POSIT_*` variable is present
    ///
    /// A value that does not parse for its key is logged and ignored.
    fn apply_env_overrides(&mut self) {
        for key in ConfigKey::ALL {
            let Ok(value) = std::env::var(key.env_var()) else {
                continue;
            };
            if let Err(e) = self.set(key, &value) {
                warn!(var = key.env_var(), error = %e, "ignoring environment override");
            }
        }
    }

    /// Set `key` from its text form
    ///
    /// Empty text or `none` clears the optional keys. `sync_enabled` takes
    /// `true/false`, `yes/no`, or `1/0`.
    pub fn set(&mut self, key: ConfigKey, value: &str) -> Result<()> {
        let cleared = value.is_empty() || value.eq_ignore_ascii_case("none");
        match key {
            ConfigKey::DataDir => {
                if value.is_empty() {
                    bail!("data_dir cannot be empty");
                }
                self.data_dir = PathBuf::from(value);
            }
            ConfigKey::AttachmentsDir => {
                self.attachments_dir = (!cleared).then(|| PathBuf::from(value));
            }
            ConfigKey::SyncUrl => {
                self.sync_url = (!cleared).then(|| value.to_string());
            }
            ConfigKey::SyncEnabled => {
                self.sync_enabled = parse_flag(value)
                    .with_context(|| format!("Invalid value for sync_enabled: '{}'", value))?;
            }
        }
        Ok(())
    }

    /// Text form of `key`, as `config show` prints it
    pub fn get(&self, key: ConfigKey) -> String {
        match key {
            ConfigKey::DataDir => self.data_dir.display().to_string(),
            ConfigKey::AttachmentsDir => self.attachments_path().display().to_string(),
            ConfigKey::SyncUrl => self.sync_url.clone().unwrap_or_default(),
            ConfigKey::SyncEnabled => self.sync_enabled.to_string(),
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_file_path();
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Cannot create config directory {:?}", dir))?;
        }

        let content = toml::to_string_pretty(self).context("Cannot serialize config")?;
        std::fs::write(&path, content)
            .with_context(|| format!("Cannot write config file {:?}", path))
    }

    pub fn config_file_path() -> PathBuf {
        match std::env::var(CONFIG_PATH_VAR) {
            Ok(path) if !path.is_empty() => PathBuf::from(path),
            _ => dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("posit")
                .join("config.toml"),
        }
    }

    pub fn sqlite_path(&self) -> PathBuf {
        self.data_dir.join("posit.db")
    }

    /// Directory imported attachment files live in
    pub fn attachments_path(&self) -> PathBuf {
        self.attachments_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("attachments"))
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Some(true),
        "false" | "no" | "0" => Some(false),
        _ => None,
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("posit")
}
