//! Queue configuration.
//!
//! Stored as JSON at `~/.config/upqueue/config.json` (`%APPDATA%\upqueue`
//! on Windows). A missing or unreadable file falls back to defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::QueueError;

/// Delay before a session re-checks its anchor after an upload, in ms.
pub const DEFAULT_REFRESH_DELAY_MS: u64 = 750;

/// Which HTTP statuses settle a file's completion as success.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuccessBand {
    /// 200–299.
    #[default]
    Standard,
    /// `status / 200 == 1`, i.e. 200–399. Kept for hosts that relied on
    /// redirects and 3xx answers counting as success.
    Legacy,
}

impl SuccessBand {
    pub fn is_success(self, status: u16) -> bool {
        match self {
            SuccessBand::Standard => (200..300).contains(&status),
            SuccessBand::Legacy => status / 200 == 1,
        }
    }
}

/// Tunables shared by every queue of an [`Uploader`](crate::Uploader).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueueConfig {
    /// Debounce delay for anchor refreshes after uploads and errors.
    pub refresh_delay_ms: u64,
    pub success_band: SuccessBand,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            refresh_delay_ms: DEFAULT_REFRESH_DELAY_MS,
            success_band: SuccessBand::Standard,
        }
    }
}

impl QueueConfig {
    pub fn refresh_delay(&self) -> Duration {
        Duration::from_millis(self.refresh_delay_ms)
    }

    /// Loads the configuration from the default location.
    pub fn load() -> Result<Self, QueueError> {
        Self::load_from(&default_path())
    }

    /// Loads the configuration from `path`.
    ///
    /// A missing file yields defaults; so does a file that fails to parse,
    /// after logging a warning.
    pub fn load_from(path: &Path) -> Result<Self, QueueError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        match serde_json::from_str(&content) {
            Ok(config) => Ok(config),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse queue config, using defaults"
                );
                Ok(Self::default())
            }
        }
    }

    /// Writes the configuration to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), QueueError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        tracing::debug!(path = %path.display(), "queue config saved");
        Ok(())
    }
}

/// `upqueue/config.json` under the platform config directory.
pub fn default_path() -> PathBuf {
    config_base_dir().join("upqueue").join("config.json")
}

fn config_base_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        PathBuf::from(appdata)
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home).join(".config")
    }
}
