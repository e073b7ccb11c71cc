//! Node configuration
//!
//! Read from TOML:
//!
//! ```toml
//! [database]
//! path = "treasure_hunt.db"
//!
//! [database.pool]
//! max_size = 10
//! min_idle = 2
//!
//! [database.tables]
//! markers = "treasure_hunt_treasures"
//! claims = "treasure_hunt_completions"
//!
//! [settings]
//! selection_timeout_secs = 30
//! log_claims = true
//! sync_interval_secs = 5
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use treasure_core::store::StoreSettings;

use crate::{NodeError, Result};

/// Main node configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Shared store location and pool
    pub database: StoreSettings,

    /// Gameplay settings
    pub settings: NodeSettings,
}

impl NodeConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the database file
    pub fn with_database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database.path = path.into();
        self
    }

    /// Set the reconciliation interval; zero or negative disables it
    pub fn with_sync_interval_secs(mut self, secs: i64) -> Self {
        self.settings.sync_interval_secs = secs;
        self
    }

    pub fn with_selection_timeout_secs(mut self, secs: u64) -> Self {
        self.settings.selection_timeout_secs = secs;
        self
    }

    pub fn with_log_claims(mut self, log_claims: bool) -> Self {
        self.settings.log_claims = log_claims;
        self
    }

    /// Reconciliation interval, `None` when disabled
    pub fn sync_interval(&self) -> Option<Duration> {
        treasure_core::sync_interval(self.settings.sync_interval_secs)
    }

    pub fn selection_timeout(&self) -> Duration {
        Duration::from_secs(self.settings.selection_timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        self.database.validate()?;
        if self.settings.selection_timeout_secs == 0 {
            return Err(NodeError::InvalidConfig(
                "settings.selection_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Gameplay settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSettings {
    /// How long a started selection waits for a block pick
    pub selection_timeout_secs: u64,

    /// Log every granted claim
    pub log_claims: bool,

    /// Reconciliation interval in seconds (0 or less disables)
    pub sync_interval_secs: i64,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            selection_timeout_secs: 30,
            log_claims: true,
            sync_interval_secs: 5,
        }
    }
}
