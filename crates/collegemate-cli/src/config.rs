//! CLI configuration
//!
//! Read from TOML. Every field has a default, so a missing file or a partial
//! one is fine.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use collegemate_core::OtpConfig;
use serde::{Deserialize, Serialize};

/// Configuration file name
const CONFIG_FILE_NAME: &str = "config.toml";

/// Directory name under the platform config/data dirs
const APP_DIR_NAME: &str = "collegemate";

/// Default log filter when `RUST_LOG` is unset
const DEFAULT_LOG_FILTER: &str = "collegemate=info,collegemate_core=info";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Where the portal's storage file lives
    pub data_dir: PathBuf,

    /// `tracing` filter directive
    pub log_filter: String,

    /// One-time code timing
    pub otp: OtpConfig,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            data_dir: Self::default_data_dir(),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            otp: OtpConfig::default(),
        }
    }
}

impl CliConfig {
    /// Platform config location, e.g. `~/.config/collegemate/config.toml`
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR_NAME)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        config
            .otp
            .validate()
            .with_context(|| format!("invalid [otp] section in {}", path.display()))?;
        Ok(config)
    }

    /// Load `explicit` (which must exist), else the default path if present,
    /// else defaults
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::load(path),
            None => {
                let path = Self::default_path();
                if path.exists() {
                    Self::load(&path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents).with_context(|| format!("writing config file {}", path.display()))?;
        Ok(())
    }

    pub fn with_data_dir(mut self, data_dir: Option<PathBuf>) -> Self {
        if let Some(dir) = data_dir {
            self.data_dir = dir;
        }
        self
    }
}
