//! Configuration management for beadgraph.
//!
//! Settings are read from `.beadgraph/config.yaml` when present. Every field
//! has a default, so a partial file is valid and a missing file is not an
//! error.

use crate::domain::ViewFilter;
use crate::error::{Error, Result};
use crate::refresh::AutoRefresh;
use crate::view::{DEFAULT_CLOSED_WINDOW_DAYS, MAX_CLOSED_WINDOW_DAYS};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

/// Name of the configuration directory
pub const CONFIG_DIR_NAME: &str = ".beadgraph";

/// Name of the configuration file
pub const CONFIG_FILE_NAME: &str = "config.yaml";

/// Default tracker command
pub const DEFAULT_COMMAND: &str = "bd";

/// Default auto-refresh interval in seconds
pub const DEFAULT_AUTO_REFRESH_SECS: u64 = 5;

/// Dashboard configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "kebab-case")]
pub struct DashboardConfig {
    /// Tracker command to run
    pub command: String,

    /// Directory to run the tracker in (defaults to the current directory)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,

    /// Seconds between auto-refreshes; 0 disables, values below 1 are raised to 1
    pub auto_refresh_secs: u64,

    /// How many days back the Closed view reaches
    pub closed_window_days: i64,

    /// View shown at startup
    pub initial_view: ViewFilter,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            command: DEFAULT_COMMAND.to_string(),
            working_dir: None,
            auto_refresh_secs: DEFAULT_AUTO_REFRESH_SECS,
            closed_window_days: DEFAULT_CLOSED_WINDOW_DAYS,
            initial_view: ViewFilter::Active,
        }
    }
}

impl DashboardConfig {
    /// Default location of the config file under `base_dir`.
    pub fn default_path(base_dir: &Path) -> PathBuf {
        base_dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME)
    }

    /// Load configuration from a file
    pub async fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).await?;
        let config: Self =
            serde_yaml::from_str(&content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from `path`, or defaults if the file does not exist.
    pub async fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path).await {
            Err(Error::Io(e)) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file, using defaults");
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Save configuration to a file
    pub async fn save(&self, path: &Path) -> Result<()> {
        let content =
            serde_yaml::to_string(self).map_err(|e| Error::Config(format!("YAML error: {}", e)))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(path, content).await?;
        Ok(())
    }

    /// Check values serde cannot.
    pub fn validate(&self) -> Result<()> {
        if self.command.trim().is_empty() {
            return Err(Error::Config("command must not be empty".to_string()));
        }
        if self.closed_window_days < 0 {
            return Err(Error::Config(
                "closed-window-days must not be negative".to_string(),
            ));
        }
        if self.closed_window_days > MAX_CLOSED_WINDOW_DAYS {
            return Err(Error::Config(format!(
                "closed-window-days must be at most {MAX_CLOSED_WINDOW_DAYS}"
            )));
        }
        Ok(())
    }

    /// Auto-refresh cadence described by this configuration.
    pub fn auto_refresh(&self) -> AutoRefresh {
        AutoRefresh::new(Duration::from_secs(self.auto_refresh_secs))
    }
}
