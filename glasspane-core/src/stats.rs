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

//! Panel stat payloads.
//!
//! Panels record their per-request diagnostics as a [`PanelStats`] mapping of
//! named [`StatsValue`]s. The value tree is deliberately closed: it carries
//! exactly what the wire codec can persist, including raw byte blobs and
//! markup-safe strings whose safety tag does not survive storage.

use std::collections::BTreeMap;

/// Stats recorded by one panel for one request.
///
/// An empty mapping doubles as the "no data" sentinel throughout the store
/// layer: reads for a missing record or panel return `PanelStats::new()`,
/// never an error.
pub type PanelStats = BTreeMap<String, StatsValue>;

/// A single recorded stat value.
#[derive(Debug, Clone, PartialEq)]
pub enum StatsValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    /// A string already escaped for markup rendering. The tag is a rendering
    /// hint only; the codec persists it as a plain string and round-trips
    /// come back as [`StatsValue::String`].
    Safe(String),
    /// Raw bytes. Persisted as a tagged base64 marker mapping.
    Bytes(Vec<u8>),
    List(Vec<StatsValue>),
    Map(BTreeMap<String, StatsValue>),
}

impl StatsValue {
    /// Markup-safe string value.
    pub fn safe(value: impl Into<String>) -> Self {
        StatsValue::Safe(value.into())
    }

    /// The contained text for both plain and safe strings.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            StatsValue::String(s) | StatsValue::Safe(s) => Some(s),
            _ => None,
        }
    }

    /// The contained mapping, if this value is one.
    pub fn as_map(&self) -> Option<&BTreeMap<String, StatsValue>> {
        match self {
            StatsValue::Map(map) => Some(map),
            _ => None,
        }
    }
}

impl From<bool> for StatsValue {
    fn from(value: bool) -> Self {
        StatsValue::Bool(value)
    }
}

impl From<i64> for StatsValue {
    fn from(value: i64) -> Self {
        StatsValue::Int(value)
    }
}

impl From<i32> for StatsValue {
    fn from(value: i32) -> Self {
        StatsValue::Int(value.into())
    }
}

impl From<u32> for StatsValue {
    fn from(value: u32) -> Self {
        StatsValue::Int(value.into())
    }
}

impl From<f64> for StatsValue {
    fn from(value: f64) -> Self {
        StatsValue::Float(value)
    }
}

impl From<&str> for StatsValue {
    fn from(value: &str) -> Self {
        StatsValue::String(value.to_string())
    }
}

impl From<String> for StatsValue {
    fn from(value: String) -> Self {
        StatsValue::String(value)
    }
}

impl From<Vec<u8>> for StatsValue {
    fn from(value: Vec<u8>) -> Self {
        StatsValue::Bytes(value)
    }
}

impl From<Vec<StatsValue>> for StatsValue {
    fn from(value: Vec<StatsValue>) -> Self {
        StatsValue::List(value)
    }
}

impl From<BTreeMap<String, StatsValue>> for StatsValue {
    fn from(value: BTreeMap<String, StatsValue>) -> Self {
        StatsValue::Map(value)
    }
}
