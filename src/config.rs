//! Configuration file handling
//!
//! The configuration lives in `pdfbatchqa.toml` inside the per-user config
//! directory. It is created with default values on first use. Command line
//! options override whatever the file says.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::core::tools::ExternalTools;
use crate::error::ConfigError;

pub const CONFIG_FILE_NAME: &str = "pdfbatchqa.toml";
const APP_DIR_NAME: &str = "pdfbatchqa";
pub const DEFAULT_PREFIX: &str = "pdfbatchqa";

/// Paths of the optional poppler tools.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub pdfinfo: Option<PathBuf>,
    pub pdfimages: Option<PathBuf>,
}

impl From<&ToolsConfig> for ExternalTools {
    fn from(tools: &ToolsConfig) -> Self {
        ExternalTools {
            pdfinfo: tools.pdfinfo.clone(),
            pdfimages: tools.pdfimages.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Profile file name inside the profiles directory.
    pub profile: Option<String>,
    /// Prefix of the output files.
    pub prefix: String,
    pub profiles_dir: Option<PathBuf>,
    pub schemas_dir: Option<PathBuf>,
    /// Keep the full SVRL trace in the report.
    pub verbose: bool,
    pub workers: usize,
    pub tools: ToolsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            profile: None,
            prefix: DEFAULT_PREFIX.to_string(),
            profiles_dir: None,
            schemas_dir: None,
            verbose: false,
            workers: 1,
            tools: ToolsConfig::default(),
        }
    }
}

fn non_empty_var(name: &str) -> Option<PathBuf> {
    env::var_os(name).filter(|value| !value.is_empty()).map(PathBuf::from)
}

/// Per-user configuration directory: `$LOCALAPPDATA`, `$XDG_CONFIG_HOME` or
/// `$HOME/.config`, each followed by `pdfbatchqa`.
pub fn config_dir() -> Option<PathBuf> {
    non_empty_var("LOCALAPPDATA")
        .or_else(|| non_empty_var("XDG_CONFIG_HOME"))
        .or_else(|| non_empty_var("HOME").map(|home| home.join(".config")))
        .map(|base| base.join(APP_DIR_NAME))
}

pub fn default_config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join(CONFIG_FILE_NAME))
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        toml::from_str(&text).map_err(|e| ConfigError::MalformedConfig {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Load the configuration file, writing one with default values first if
    /// it does not exist yet.
    pub fn bootstrap(path: &Path) -> Result<Self, ConfigError> {
        if path.is_file() {
            return Self::load(path);
        }

        let config = Config::default();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let text = toml::to_string_pretty(&config).map_err(|e| ConfigError::MalformedConfig {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        fs::write(path, text)?;
        info!("Wrote default configuration to {}", path.display());
        Ok(config)
    }

    /// Directory holding the profiles, `profiles` next to the config file by default.
    pub fn profiles_dir(&self, config_dir: &Path) -> PathBuf {
        self.profiles_dir
            .clone()
            .unwrap_or_else(|| config_dir.join("profiles"))
    }

    /// Directory holding the schemas, `schemas` next to the config file by default.
    pub fn schemas_dir(&self, config_dir: &Path) -> PathBuf {
        self.schemas_dir
            .clone()
            .unwrap_or_else(|| config_dir.join("schemas"))
    }
}
