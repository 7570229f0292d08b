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

//! In-memory store.
//!
//! Records live in a mutex-guarded map next to a recency deque (oldest at
//! the front). Payloads are held as codec text rather than live values so
//! the persistence semantics match the durable backends exactly — a
//! markup-safe string degrades to plain text here too.

use std::collections::{BTreeMap, HashMap, VecDeque};

use parking_lot::Mutex;

use glasspane_core::{codec, PanelStats, RequestId};

use crate::{decode_payload, Store, StoreResult};

/// Process-local store. The default backend.
pub struct MemoryStore {
    inner: Mutex<Inner>,
    max_size: usize,
}

#[derive(Default)]
struct Inner {
    /// Recency order, oldest at the front.
    order: VecDeque<RequestId>,
    /// `request_id -> panel_id -> serialized payload`.
    records: HashMap<RequestId, BTreeMap<String, String>>,
}

impl MemoryStore {
    /// New store keeping at most `max_size` records (clamped to at least 1:
    /// a write must never evict its own record).
    pub fn new(max_size: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            max_size: max_size.max(1),
        }
    }

    /// Ensure a record exists, mark it most recent, evict overflow. Runs
    /// under the caller's lock so concurrent writers can't double-evict.
    fn touch(&self, inner: &mut Inner, id: &RequestId) {
        inner.records.entry(id.clone()).or_default();
        inner.order.retain(|tracked| tracked != id);
        inner.order.push_back(id.clone());

        while inner.records.len() > self.max_size {
            match inner.order.pop_front() {
                Some(oldest) => {
                    inner.records.remove(&oldest);
                }
                None => break,
            }
        }
    }
}

impl Store for MemoryStore {
    fn request_ids(&self) -> StoreResult<Vec<RequestId>> {
        let inner = self.inner.lock();
        Ok(inner.order.iter().rev().cloned().collect())
    }

    fn exists(&self, id: &RequestId) -> StoreResult<bool> {
        Ok(self.inner.lock().records.contains_key(id))
    }

    fn set(&self, id: &RequestId) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        self.touch(&mut inner, id);
        Ok(())
    }

    fn clear(&self) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        inner.order.clear();
        inner.records.clear();
        Ok(())
    }

    fn delete(&self, id: &RequestId) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        inner.records.remove(id);
        inner.order.retain(|tracked| tracked != id);
        Ok(())
    }

    fn save_panel(&self, id: &RequestId, panel_id: &str, data: &PanelStats) -> StoreResult<()> {
        let text = codec::serialize_stats(data);
        let mut inner = self.inner.lock();
        self.touch(&mut inner, id);
        if let Some(record) = inner.records.get_mut(id) {
            record.insert(panel_id.to_string(), text);
        }
        Ok(())
    }

    fn panel(&self, id: &RequestId, panel_id: &str) -> StoreResult<PanelStats> {
        let inner = self.inner.lock();
        Ok(inner
            .records
            .get(id)
            .and_then(|record| record.get(panel_id))
            .map(|text| decode_payload(id, panel_id, text))
            .unwrap_or_default())
    }

    fn panels(&self, id: &RequestId) -> StoreResult<Vec<(String, PanelStats)>> {
        let inner = self.inner.lock();
        Ok(inner
            .records
            .get(id)
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
