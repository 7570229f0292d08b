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

//! Cache-backed store.
//!
//! Generic caches have no enumeration primitive, so [`CacheStore`] keeps a
//! secondary index key holding the ordered list of known request ids and
//! updates it, under an internal mutex, on every mutating operation. Records
//! live under a derived key (`{prefix}req:{id}`).
//!
//! Clients are looked up by alias in a process-wide registry. The store
//! always resolves the *raw* registered client, so when a cache-activity
//! panel wraps application cache handles with instrumentation, the store's
//! own traffic stays invisible to it.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use moka::sync::Cache as MokaCache;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use thiserror::Error;

use glasspane_core::{codec, PanelStats, RequestId, DEFAULT_CACHE_ALIAS};

use crate::{decode_payload, Store, StoreResult};

/// Default entry bound for [`LocalCache`].
pub const DEFAULT_LOCAL_CACHE_CAPACITY: u64 = 512;

/// Failures surfaced by a cache client. The in-process client never fails;
/// remote clients map transport errors here.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
}

/// Minimal contract a cache service must offer: get/set/delete of text
/// values. Implementations must be safe to share across request threads.
pub trait CacheClient: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    fn set(&self, key: &str, value: &str) -> Result<(), CacheError>;
    fn delete(&self, key: &str) -> Result<(), CacheError>;
}

/// In-process cache client over a bounded moka cache.
pub struct LocalCache {
    cache: MokaCache<String, String>,
}

impl LocalCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_LOCAL_CACHE_CAPACITY)
    }

    pub fn with_capacity(max_capacity: u64) -> Self {
        Self {
            cache: MokaCache::builder().max_capacity(max_capacity).build(),
        }
    }
}

impl Default for LocalCache {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheClient for LocalCache {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.cache.get(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        self.cache.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.cache.invalidate(key);
        Ok(())
    }
}

static CACHE_REGISTRY: Lazy<DashMap<String, Arc<dyn CacheClient>>> = Lazy::new(|| {
    let registry: DashMap<String, Arc<dyn CacheClient>> = DashMap::new();
    registry.insert(
        DEFAULT_CACHE_ALIAS.to_string(),
        Arc::new(LocalCache::new()) as Arc<dyn CacheClient>,
    );
    registry
});

/// Register a cache client under `alias`, replacing any previous one.
pub fn register_cache(alias: impl Into<String>, client: Arc<dyn CacheClient>) {
    CACHE_REGISTRY.insert(alias.into(), client);
}

/// The raw client registered under `alias`.
///
/// `CacheStore` resolves its backend exclusively through here; instrumented
/// wrappers installed for application traffic are never consulted.
pub fn registered_cache(alias: &str) -> Option<Arc<dyn CacheClient>> {
    CACHE_REGISTRY.get(alias).map(|entry| entry.value().clone())
}

/// Restore the registry to its default state. Primarily a test hook.
pub fn reset_cache_registry() {
    CACHE_REGISTRY.clear();
    CACHE_REGISTRY.insert(
        DEFAULT_CACHE_ALIAS.to_string(),
        Arc::new(LocalCache::new()) as Arc<dyn CacheClient>,
    );
}

/// Store adapter over a generic cache service.
pub struct CacheStore {
    client: Arc<dyn CacheClient>,
    key_prefix: String,
    max_size: usize,
    /// Serializes read-modify-write cycles on the index key so concurrent
    /// writers cannot lose ids or miscount for eviction.
    index_lock: Mutex<()>,
}

impl CacheStore {
    pub fn new(client: Arc<dyn CacheClient>, key_prefix: impl Into<String>, max_size: usize) -> Self {
        Self {
            client,
            key_prefix: key_prefix.into(),
            max_size: max_size.max(1),
            index_lock: Mutex::new(()),
        }
    }

    fn request_ids_key(&self) -> String {
        format!("{}request_ids", self.key_prefix)
    }

    fn request_key(&self, id: &RequestId) -> String {
        format!("{}req:{}", self.key_prefix, id)
    }

    /// The index list, oldest first. Corrupt index text degrades to empty.
    fn read_index(&self) -> Result<Vec<RequestId>, CacheError> {
        let Some(text) = self.client.get(&self.request_ids_key())? else {
            return Ok(Vec::new());
        };
        Ok(serde_json::from_str(&text).unwrap_or_else(|err| {
            tracing::warn!(error = %err, "discarding corrupt request id index");
            Vec::new()
        }))
    }

    fn write_index(&self, ids: &[RequestId]) -> Result<(), CacheError> {
        let text = serde_json::to_string(ids).unwrap_or_else(|err| {
            tracing::warn!(error = %err, "failed to encode request id index, storing empty");
            "[]".to_string()
        });
        self.client.set(&self.request_ids_key(), &text)
    }

    fn read_record(&self, id: &RequestId) -> Result<Option<BTreeMap<String, String>>, CacheError> {
        let Some(text) = self.client.get(&self.request_key(id))? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_str(&text).unwrap_or_else(|err| {
            tracing::warn!(
                request_id = %id,
                error = %err,
                "discarding corrupt stored record mapping"
            );
            BTreeMap::new()
        })))
    }

    fn write_record(
        &self,
        id: &RequestId,
        record: &BTreeMap<String, String>,
    ) -> Result<(), CacheError> {
        let text = serde_json::to_string(record).unwrap_or_else(|err| {
            tracing::warn!(error = %err, "failed to encode record mapping, storing empty");
            "{}".to_string()
        });
        self.client.set(&self.request_key(id), &text)
    }

    /// Move `id` to the newest end of the index and evict overflow, deleting
    /// evicted records. Caller must hold the index lock.
    fn touch_index_locked(&self, id: &RequestId) -> Result<(), CacheError> {
        let mut ids = self.read_index()?;
        ids.retain(|tracked| tracked != id);
        ids.push(id.clone());

        while ids.len() > self.max_size {
            let oldest = ids.remove(0);
            self.client.delete(&self.request_key(&oldest))?;
        }
        self.write_index(&ids)
    }
}

impl Store for CacheStore {
    fn request_ids(&self) -> StoreResult<Vec<RequestId>> {
        let mut ids = self.read_index()?;
        ids.reverse();
        Ok(ids)
    }

    fn exists(&self, id: &RequestId) -> StoreResult<bool> {
        Ok(self.client.get(&self.request_key(id))?.is_some())
    }

    fn set(&self, id: &RequestId) -> StoreResult<()> {
        let _guard = self.index_lock.lock();
        if self.read_record(id)?.is_none() {
            self.write_record(id, &BTreeMap::new())?;
        }
        self.touch_index_locked(id)?;
        Ok(())
    }

    fn clear(&self) -> StoreResult<()> {
        let _guard = self.index_lock.lock();
        for id in self.read_index()? {
            self.client.delete(&self.request_key(&id))?;
        }
        self.client.delete(&self.request_ids_key())?;
        Ok(())
    }

    fn delete(&self, id: &RequestId) -> StoreResult<()> {
        let _guard = self.index_lock.lock();
        let mut ids = self.read_index()?;
        ids.retain(|tracked| tracked != id);
        self.write_index(&ids)?;
        self.client.delete(&self.request_key(id))?;
        Ok(())
    }

    fn save_panel(&self, id: &RequestId, panel_id: &str, data: &PanelStats) -> StoreResult<()> {
        let payload = codec::serialize_stats(data);
        let _guard = self.index_lock.lock();

        let mut record = self.read_record(id)?.unwrap_or_default();
        record.insert(panel_id.to_string(), payload);
        self.write_record(id, &record)?;
        self.touch_index_locked(id)?;
        Ok(())
    }

    fn panel(&self, id: &RequestId, panel_id: &str) -> StoreResult<PanelStats> {
        Ok(self
            .read_record(id)?
            .and_then(|record| record.get(panel_id).cloned())
            .map(|text| decode_payload(id, panel_id, &text))
            .unwrap_or_default())
    }

    fn panels(&self, id: &RequestId) -> StoreResult<Vec<(String, PanelStats)>> {
        Ok(self
            .read_record(id)?
            .map(|record| {
                record
                    .iter()
                    .map(|(panel_id, text)| {
                        (panel_id.clone(), decode_payload(id, panel_id, text))
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}
