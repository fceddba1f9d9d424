use std::path::{Path, PathBuf};

use logsync_log::LogConfig;
use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};

/// What a follower does when one entry cannot be read or decoded.
///
/// Store faults always stop the follower regardless of this policy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryErrorPolicy {
    /// Record the fault in the follower status, log it, and keep going.
    #[default]
    Continue,
    /// Record the fault and fail the follower.
    Stop,
}

/// Configuration for a [`crate::SyncedStore`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Decoded entries buffered between a follower's reader and its applier.
    pub apply_queue_capacity: usize,
    pub on_entry_error: EntryErrorPolicy,
    /// Random-access followers replay `0..len` before waiting for appends.
    pub catch_up_random_access: bool,
    /// Settings for in-memory logs created by embedders and the CLI.
    pub log: LogConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            apply_queue_capacity: 256,
            on_entry_error: EntryErrorPolicy::default(),
            catch_up_random_access: true,
            log: LogConfig::default(),
        }
    }
}

impl SyncConfig {
    /// Parse a TOML document; missing keys take their defaults.
    pub fn from_toml_str(text: &str) -> SyncResult<Self> {
        Self::parse(text, Path::new("<inline>"))
    }

    /// Load a TOML configuration file.
    pub fn load(path: &Path) -> SyncResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| SyncError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::parse(&text, path)
    }

    /// Render as TOML.
    pub fn to_toml_string(&self) -> SyncResult<String> {
        toml::to_string_pretty(self).map_err(|e| SyncError::Config {
            path: PathBuf::from("<inline>"),
            reason: e.to_string(),
        })
    }

    fn parse(text: &str, path: &Path) -> SyncResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| SyncError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        if config.apply_queue_capacity == 0 {
            return Err(SyncError::Config {
                path: path.to_path_buf(),
                reason: "apply_queue_capacity must be at least 1".into(),
            });
        }
        Ok(config)
    }
}
