// Copyright 2025 Glasspane Contributors (https://github.com/glasspane)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Toolbar configuration.
//!
//! [`ToolbarConfig`] is a plain serde struct the host can deserialize from a
//! TOML file or build in code. One instance is installed process-wide via
//! [`set_config`]; every installation bumps a generation counter so memoized
//! consumers (the active store, the panel registry) know to rebuild instead
//! of serving state derived from a stale configuration.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default maximum number of request records a store keeps.
pub const DEFAULT_RESULTS_CACHE_SIZE: usize = 25;

/// Default alias of the cache client backing `CacheStore`.
pub const DEFAULT_CACHE_ALIAS: &str = "default";

/// Default prefix for every key `CacheStore` touches.
pub const DEFAULT_CACHE_KEY_PREFIX: &str = "glasspane:";

/// Default table name for `DatabaseStore`.
pub const DEFAULT_DATABASE_TABLE: &str = "glasspane_records";

/// Process configuration for the toolbar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolbarConfig {
    /// Maximum number of request records kept before the oldest are evicted.
    pub results_cache_size: usize,

    /// Which persistence backend `get_store()` builds.
    pub store: StoreBackendConfig,

    /// Ordered panel ids enabled for this process.
    pub panels: Vec<String>,

    /// Scrub credential-shaped request variables before recording them.
    pub sanitize_request_data: bool,
}

impl Default for ToolbarConfig {
    fn default() -> Self {
        Self {
            results_cache_size: DEFAULT_RESULTS_CACHE_SIZE,
            store: StoreBackendConfig::Memory,
            panels: default_panels(),
            sanitize_request_data: true,
        }
    }
}

impl ToolbarConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Load a configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }
}

/// Panel ids shipped enabled by default.
pub fn default_panels() -> Vec<String> {
    vec![
        "RequestPanel".to_string(),
        "HeadersPanel".to_string(),
        "TimerPanel".to_string(),
    ]
}

/// Selection of the persistence substrate behind the Store contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StoreBackendConfig {
    /// Process-local, no durability. The default.
    Memory,
    /// One SQLite row per request record.
    Database {
        path: PathBuf,
        #[serde(default = "default_database_table")]
        table: String,
    },
    /// Adapter over a registered cache client.
    Cache {
        #[serde(default = "default_cache_alias")]
        alias: String,
        #[serde(default = "default_cache_key_prefix")]
        key_prefix: String,
    },
}

fn default_database_table() -> String {
    DEFAULT_DATABASE_TABLE.to_string()
}

fn default_cache_alias() -> String {
    DEFAULT_CACHE_ALIAS.to_string()
}

fn default_cache_key_prefix() -> String {
    DEFAULT_CACHE_KEY_PREFIX.to_string()
}

/// Configuration loading failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

static ACTIVE: Lazy<RwLock<Arc<ToolbarConfig>>> =
    Lazy::new(|| RwLock::new(Arc::new(ToolbarConfig::default())));

static GENERATION: AtomicU64 = AtomicU64::new(0);

/// Install `config` as the process-wide active configuration and bump the
/// configuration generation, invalidating memoized consumers.
pub fn set_config(config: ToolbarConfig) {
    *ACTIVE.write() = Arc::new(config);
    GENERATION.fetch_add(1, Ordering::SeqCst);
}

/// The active configuration.
pub fn get_config() -> Arc<ToolbarConfig> {
    ACTIVE.read().clone()
}

/// Generation counter bumped by every [`set_config`] call.
pub fn config_generation() -> u64 {
    GENERATION.load(Ordering::SeqCst)
}

/// Restore the default configuration. Primarily a test hook.
pub fn reset_config() {
    set_config(ToolbarConfig::default());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ToolbarConfig::default();
        assert_eq!(config.results_cache_size, DEFAULT_RESULTS_CACHE_SIZE);
        assert_eq!(config.store, StoreBackendConfig::Memory);
        assert!(config.sanitize_request_data);
        assert_eq!(config.panels.len(), 3);
    }

    #[test]
    fn test_parse_toml_with_database_backend() {
        let config = ToolbarConfig::from_toml_str(
            r#"
            results_cache_size = 5

            [store]
            backend = "database"
            path = "/tmp/glasspane.sqlite3"
            "#,
        )
        .unwrap();

        assert_eq!(config.results_cache_size, 5);
        assert_eq!(
            config.store,
            StoreBackendConfig::Database {
                path: PathBuf::from("/tmp/glasspane.sqlite3"),
                table: DEFAULT_DATABASE_TABLE.to_string(),
            }
        );
    }

    #[test]
    fn test_parse_toml_cache_backend_defaults() {
        let config = ToolbarConfig::from_toml_str(
            r#"
            [store]
            backend = "cache"
            "#,
        )
        .unwrap();

        assert_eq!(
            config.store,
            StoreBackendConfig::Cache {
                alias: DEFAULT_CACHE_ALIAS.to_string(),
                key_prefix: DEFAULT_CACHE_KEY_PREFIX.to_string(),
            }
        );
    }

    #[test]
    fn test_parse_rejects_malformed_toml() {
        assert!(matches!(
            ToolbarConfig::from_toml_str("results_cache_size = \"lots\""),
            Err(ConfigError::Parse(_))
        ));
    }
}
