use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::db::Database;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub mail: MailConfig,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DatabaseConfig {
    pub path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

fn default_log_filter() -> String {
    "info".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct MailConfig {
    /// Directory of `.eml` files scanned when `--dir` is not given.
    pub directory: Option<PathBuf>,
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            directory: None,
            max_messages: default_max_messages(),
        }
    }
}

fn default_max_messages() -> usize {
    50
}

impl Config {
    /// Loads `path` if given, else the per-user config file if it exists,
    /// else defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => load_config(path),
            None => match default_config_path() {
                Some(path) if path.exists() => load_config(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.database
            .path
            .clone()
            .unwrap_or_else(Database::default_path)
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "jobdigest")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.mail.max_messages == 0 {
        bail!("mail.max_messages must be > 0");
    }
    if config.logging.filter.trim().is_empty() {
        bail!("logging.filter must not be empty");
    }

    Ok(config)
}
