//! Store settings: database location, pool sizing and table names

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Result, TreasureError};

/// Where the shared database lives and how to talk to it
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Database file shared by every node
    pub path: PathBuf,

    /// Connection pool settings
    pub pool: PoolSettings,

    /// Table names, configurable for shared databases
    pub tables: TableNames,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("treasure_hunt.db"),
            pool: PoolSettings::default(),
            tables: TableNames::default(),
        }
    }
}

impl StoreSettings {
    pub fn validate(&self) -> Result<()> {
        self.pool.validate()?;
        self.tables.validate()
    }
}

/// Connection pool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
    /// Maximum open connections, also the number of concurrent store workers
    pub max_size: u32,

    /// Connections opened eagerly and kept warm
    pub min_idle: u32,

    /// Longest wait for a connection or a store call, in milliseconds
    pub connection_timeout_ms: u64,

    /// Idle connections older than this are closed, in milliseconds (0 keeps them)
    pub idle_timeout_ms: u64,

    /// Connections are never reused past this age, in milliseconds (0 disables)
    pub max_lifetime_ms: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_size: 10,
            min_idle: 2,
            connection_timeout_ms: 30_000,
            idle_timeout_ms: 600_000,  // 10 minutes
            max_lifetime_ms: 1_800_000, // 30 minutes
        }
    }
}

impl PoolSettings {
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_ms > 0).then(|| Duration::from_millis(self.idle_timeout_ms))
    }

    pub fn max_lifetime(&self) -> Option<Duration> {
        (self.max_lifetime_ms > 0).then(|| Duration::from_millis(self.max_lifetime_ms))
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_size == 0 {
            return Err(TreasureError::InvalidConfig(
                "pool.max_size must be at least 1".to_string(),
            ));
        }
        if self.min_idle > self.max_size {
            return Err(TreasureError::InvalidConfig(format!(
                "pool.min_idle ({}) exceeds pool.max_size ({})",
                self.min_idle, self.max_size
            )));
        }
        if self.connection_timeout_ms == 0 {
            return Err(TreasureError::InvalidConfig(
                "pool.connection_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Names of the two tables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableNames {
    pub markers: String,
    pub claims: String,
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            markers: "treasure_hunt_treasures".to_string(),
            claims: "treasure_hunt_completions".to_string(),
        }
    }
}

impl TableNames {
    /// Table names are spliced into SQL, so only plain identifiers pass
    pub fn validate(&self) -> Result<()> {
        for name in [&self.markers, &self.claims] {
            if !is_identifier(name) {
                return Err(TreasureError::InvalidConfig(format!(
                    "invalid table name '{}'",
                    name
                )));
            }
        }
        if self.markers.eq_ignore_ascii_case(&self.claims) {
            return Err(TreasureError::InvalidConfig(
                "marker and claim tables must differ".to_string(),
            ));
        }
        Ok(())
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    name.len() <= 64 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
