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

//! SQLite-backed store.
//!
//! One row per request record:
//!
//! ```text
//! request_id TEXT PRIMARY KEY | data TEXT | created_at INTEGER (µs)
//! ```
//!
//! `data` holds the whole `panel_id -> payload text` mapping as one JSON
//! object; `save_panel` merges into it inside a transaction rather than
//! appending rows, and `created_at` is refreshed on every write so it doubles
//! as the recency basis for eviction. Reads are single queries — `panel`,
//! `panels` and `exists` each cost exactly one round trip.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use glasspane_core::{codec, PanelStats, RequestId};

use crate::{decode_payload, Store, StoreError, StoreResult};

/// Durable store over a SQLite table.
pub struct DatabaseStore {
    conn: Mutex<Connection>,
    table: String,
    max_size: usize,
}

impl DatabaseStore {
    /// Open (creating if needed) the backing database at `path`.
    pub fn open(
        path: impl AsRef<Path>,
        table: impl Into<String>,
        max_size: usize,
    ) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::with_connection(conn, table, max_size)
    }

    /// Transient store for tests and throwaway sessions.
    pub fn in_memory(max_size: usize) -> StoreResult<Self> {
        Self::with_connection(
            Connection::open_in_memory()?,
            glasspane_core::DEFAULT_DATABASE_TABLE,
            max_size,
        )
    }

    fn with_connection(
        conn: Connection,
        table: impl Into<String>,
        max_size: usize,
    ) -> StoreResult<Self> {
        let table = table.into();
        // The table name is interpolated into SQL, so restrict it to
        // identifier characters.
        if table.is_empty()
            || !table
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(StoreError::InvalidTableName(table));
        }

        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                request_id TEXT PRIMARY KEY,
                data TEXT NOT NULL DEFAULT '{{}}',
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_{table}_created_at
                ON {table} (created_at);"
        ))?;

        Ok(Self {
            conn: Mutex::new(conn),
            table,
            max_size: max_size.max(1),
        })
    }

    /// Microsecond timestamp, forced strictly monotonic within the process
    /// so same-instant writes still order deterministically for eviction.
    fn now_micros() -> i64 {
        static LAST: AtomicI64 = AtomicI64::new(0);
        let now = Utc::now().timestamp_micros();
        let mut last = LAST.load(Ordering::SeqCst);
        loop {
            let candidate = now.max(last + 1);
            match LAST.compare_exchange(last, candidate, Ordering::SeqCst, Ordering::SeqCst) {
                Ok(_) => return candidate,
                Err(actual) => last = actual,
            }
        }
    }

    /// Bulk-delete every row older than the newest `max_size`.
    fn evict(&self, conn: &Connection) -> rusqlite::Result<()> {
        conn.execute(
            &format!(
                "DELETE FROM {t} WHERE request_id NOT IN (
                    SELECT request_id FROM {t}
                    ORDER BY created_at DESC, rowid DESC
                    LIMIT ?1
                )",
                t = self.table
            ),
            params![self.max_size as i64],
        )?;
        Ok(())
    }

    /// The stored `panel_id -> payload text` mapping for one row, in one
    /// query.
    fn read_record(
        &self,
        conn: &Connection,
        id: &RequestId,
    ) -> rusqlite::Result<Option<BTreeMap<String, String>>> {
        let data: Option<String> = conn
            .query_row(
                &format!("SELECT data FROM {} WHERE request_id = ?1", self.table),
                params![id.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        Ok(data.map(|text| parse_record(id, &text)))
    }
}

impl Store for DatabaseStore {
    fn request_ids(&self) -> StoreResult<Vec<RequestId>> {
        let conn = self.conn.lock();
        let mut statement = conn.prepare(&format!(
            "SELECT request_id FROM {} ORDER BY created_at DESC, rowid DESC",
            self.table
        ))?;
        let ids = statement
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids.into_iter().map(RequestId::from).collect())
    }

    fn exists(&self, id: &RequestId) -> StoreResult<bool> {
        let conn = self.conn.lock();
        let exists: bool = conn.query_row(
            &format!(
                "SELECT EXISTS(SELECT 1 FROM {} WHERE request_id = ?1)",
                self.table
            ),
            params![id.as_str()],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn set(&self, id: &RequestId) -> StoreResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(
            &format!(
                "INSERT INTO {} (request_id, data, created_at) VALUES (?1, '{{}}', ?2)
                 ON CONFLICT(request_id) DO UPDATE SET created_at = excluded.created_at",
                self.table
            ),
            params![id.as_str(), Self::now_micros()],
        )?;
        self.evict(&tx)?;
        tx.commit()?;
        Ok(())
    }

    fn clear(&self) -> StoreResult<()> {
        let conn = self.conn.lock();
        conn.execute(&format!("DELETE FROM {}", self.table), [])?;
        Ok(())
    }

    fn delete(&self, id: &RequestId) -> StoreResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            &format!("DELETE FROM {} WHERE request_id = ?1", self.table),
            params![id.as_str()],
        )?;
        Ok(())
    }

    fn save_panel(&self, id: &RequestId, panel_id: &str, data: &PanelStats) -> StoreResult<()> {
        let payload = codec::serialize_stats(data);
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let mut record = self.read_record(&tx, id)?.unwrap_or_default();
        record.insert(panel_id.to_string(), payload);
        let record_text = encode_record(&record);

        tx.execute(
            &format!(
                "INSERT INTO {} (request_id, data, created_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(request_id) DO UPDATE
                     SET data = excluded.data, created_at = excluded.created_at",
                self.table
            ),
            params![id.as_str(), record_text, Self::now_micros()],
        )?;
        self.evict(&tx)?;
        tx.commit()?;
        Ok(())
    }

    fn panel(&self, id: &RequestId, panel_id: &str) -> StoreResult<PanelStats> {
        let conn = self.conn.lock();
        Ok(self
            .read_record(&conn, id)?
            .and_then(|record| record.get(panel_id).cloned())
            .map(|text| decode_payload(id, panel_id, &text))
            .unwrap_or_default())
    }

    fn panels(&self, id: &RequestId) -> StoreResult<Vec<(String, PanelStats)>> {
        let conn = self.conn.lock();
        Ok(self
            .read_record(&conn, id)?
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

fn encode_record(record: &BTreeMap<String, String>) -> String {
    serde_json::to_string(record).unwrap_or_else(|err| {
        // String keys and values always encode; degrade rather than fail the
        // surrounding request if that ever stops holding.
        tracing::warn!(error = %err, "failed to encode record mapping, storing empty");
        "{}".to_string()
    })
}

fn parse_record(id: &RequestId, text: &str) -> BTreeMap<String, String> {
    serde_json::from_str(text).unwrap_or_else(|err| {
        tracing::warn!(
            request_id = %id,
            error = %err,
            "discarding corrupt stored record mapping"
        );
        BTreeMap::new()
    })
}
