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

//! Glasspane Storage Layer
//!
//! The [`Store`] trait maps a request id to an ordered set of
//! `panel_id -> payload` entries with bounded size: once the tracked record
//! count exceeds the configured maximum, the oldest records are evicted.
//! Three backends satisfy identical external semantics over different
//! substrates:
//!
//! - [`MemoryStore`]: process-local, no durability, the default;
//! - [`DatabaseStore`]: one SQLite row per record;
//! - [`CacheStore`]: adapter over a registered [`CacheClient`].
//!
//! Reads never fail for missing data — a missing record or panel yields the
//! empty-mapping sentinel. Only substrate failures surface, as
//! [`StoreError`], and they are never retried here.

pub mod cache;
pub mod database;
pub mod memory;

use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use thiserror::Error;

use glasspane_core::{codec, config, PanelStats, RequestId, StoreBackendConfig, ToolbarConfig};

pub use cache::{
    register_cache, registered_cache, reset_cache_registry, CacheClient, CacheError, CacheStore,
    LocalCache,
};
pub use database::DatabaseStore;
pub use memory::MemoryStore;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Substrate failures. Missing records and panels are not errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database failure: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("cache backend failure: {0}")]
    Cache(#[from] CacheError),

    #[error("no cache backend registered under alias {0:?}")]
    UnknownCacheAlias(String),

    #[error("invalid table name {0:?}")]
    InvalidTableName(String),
}

/// The persistence contract: a bounded registry of per-request panel data.
///
/// All implementations bump a record's recency on [`set`](Store::set) and
/// [`save_panel`](Store::save_panel) and evict oldest-first once the record
/// count exceeds the configured maximum; the write that triggers an eviction
/// never evicts its own record.
pub trait Store: Send + Sync {
    /// All tracked request ids, newest first.
    fn request_ids(&self) -> StoreResult<Vec<RequestId>>;

    /// Whether a record exists for `id`. A record with zero panels exists.
    fn exists(&self, id: &RequestId) -> StoreResult<bool>;

    /// Ensure a record exists for `id`, mark it most recent, and evict
    /// overflow.
    fn set(&self, id: &RequestId) -> StoreResult<()>;

    /// Remove all records.
    fn clear(&self) -> StoreResult<()>;

    /// Remove one record. Not an error if absent.
    fn delete(&self, id: &RequestId) -> StoreResult<()>;

    /// Upsert one panel's payload, creating the record if needed; marks the
    /// record most recent and evicts overflow.
    fn save_panel(&self, id: &RequestId, panel_id: &str, data: &PanelStats) -> StoreResult<()>;

    /// Previously saved payload, or the empty mapping when absent.
    fn panel(&self, id: &RequestId, panel_id: &str) -> StoreResult<PanelStats>;

    /// All `(panel_id, payload)` pairs for a record, empty when the record
    /// doesn't exist.
    fn panels(&self, id: &RequestId) -> StoreResult<Vec<(String, PanelStats)>>;
}

/// Build a store for `config`, keyed on its backend selection.
pub fn build_store(config: &ToolbarConfig) -> StoreResult<Arc<dyn Store>> {
    let store: Arc<dyn Store> = match &config.store {
        StoreBackendConfig::Memory => Arc::new(MemoryStore::new(config.results_cache_size)),
        StoreBackendConfig::Database { path, table } => Arc::new(DatabaseStore::open(
            path,
            table.clone(),
            config.results_cache_size,
        )?),
        StoreBackendConfig::Cache { alias, key_prefix } => {
            let client = cache::registered_cache(alias)
                .ok_or_else(|| StoreError::UnknownCacheAlias(alias.clone()))?;
            Arc::new(CacheStore::new(
                client,
                key_prefix.clone(),
                config.results_cache_size,
            ))
        }
    };
    Ok(store)
}

struct ActiveStore {
    generation: u64,
    store: Arc<dyn Store>,
}

static ACTIVE_STORE: Lazy<RwLock<Option<ActiveStore>>> = Lazy::new(|| RwLock::new(None));

/// The store for the active configuration, memoized until the configuration
/// generation changes.
pub fn get_store() -> StoreResult<Arc<dyn Store>> {
    let generation = config::config_generation();
    if let Some(active) = ACTIVE_STORE.read().as_ref() {
        if active.generation == generation {
            return Ok(active.store.clone());
        }
    }

    let store = build_store(&config::get_config())?;
    *ACTIVE_STORE.write() = Some(ActiveStore {
        generation,
        store: store.clone(),
    });
    Ok(store)
}

/// Drop the memoized store; the next [`get_store`] call rebuilds from the
/// active configuration.
pub fn reset_store() {
    *ACTIVE_STORE.write() = None;
}

/// Decode one panel's stored payload text, degrading corrupt data to the
/// empty sentinel: a broken diagnostic record must never break the request
/// reading it.
pub(crate) fn decode_payload(id: &RequestId, panel_id: &str, text: &str) -> PanelStats {
    match codec::deserialize_stats(text) {
        Ok(stats) => stats,
        Err(err) => {
            tracing::warn!(
                request_id = %id,
                panel_id,
                error = %err,
                "discarding corrupt stored panel payload"
            );
            PanelStats::new()
        }
    }
}
