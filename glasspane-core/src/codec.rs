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

//! Wire codec for panel stat payloads.
//!
//! Payloads travel as JSON text. Two kinds of values need help on the way
//! through:
//!
//! - byte blobs become a single-key marker mapping
//!   `{"__glasspane_bytes__": "<base64>"}`, reversed recursively on decode;
//! - markup-safe strings degrade to plain strings, dropping the tag.
//!
//! [`serialize`] never fails: a value JSON cannot carry faithfully (a
//! non-finite float) is coerced to its string form and the coercion is
//! logged, so a diagnostic payload can never interrupt the request that
//! produced it.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::{Map as JsonMap, Number, Value};
use thiserror::Error;

use crate::stats::{PanelStats, StatsValue};

/// Marker key identifying an encoded byte blob.
pub const BYTES_MARKER: &str = "__glasspane_bytes__";

/// Codec failures. Only [`deserialize`] can fail, and only on text that did
/// not come out of [`serialize`].
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed stat payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("stat payload is not a mapping")]
    NotAMapping,
}

/// Serialize a stat value to wire text. Never fails; unrepresentable values
/// degrade to their string form.
pub fn serialize(value: &StatsValue) -> String {
    let encoded = encode(value);
    serde_json::to_string(&encoded).unwrap_or_else(|err| {
        // encode() only emits JSON-representable values, so this branch is
        // unreachable in practice; degrade rather than propagate regardless.
        tracing::warn!(error = %err, "failed to write encoded stat payload, storing null");
        "null".to_string()
    })
}

/// Deserialize wire text back into a stat value.
pub fn deserialize(text: &str) -> Result<StatsValue, CodecError> {
    let value: Value = serde_json::from_str(text)?;
    Ok(decode(value))
}

/// Serialize a whole panel stats mapping. Same wire shape as a
/// [`StatsValue::Map`].
pub fn serialize_stats(stats: &PanelStats) -> String {
    serialize(&StatsValue::Map(stats.clone()))
}

/// Deserialize a panel stats mapping.
pub fn deserialize_stats(text: &str) -> Result<PanelStats, CodecError> {
    match deserialize(text)? {
        StatsValue::Map(map) => Ok(map),
        _ => Err(CodecError::NotAMapping),
    }
}

fn encode(value: &StatsValue) -> Value {
    match value {
        StatsValue::Null => Value::Null,
        StatsValue::Bool(b) => Value::Bool(*b),
        StatsValue::Int(i) => Value::Number((*i).into()),
        StatsValue::Float(f) => match Number::from_f64(*f) {
            Some(n) => Value::Number(n),
            None => {
                tracing::warn!(
                    value = %f,
                    "stat value is not representable in JSON, coercing to string"
                );
                Value::String(f.to_string())
            }
        },
        StatsValue::String(s) | StatsValue::Safe(s) => Value::String(s.clone()),
        StatsValue::Bytes(bytes) => {
            let mut marker = JsonMap::with_capacity(1);
            marker.insert(BYTES_MARKER.to_string(), Value::String(BASE64.encode(bytes)));
            Value::Object(marker)
        }
        StatsValue::List(items) => Value::Array(items.iter().map(encode).collect()),
        StatsValue::Map(entries) => Value::Object(
            entries
                .iter()
                .map(|(key, value)| (key.clone(), encode(value)))
                .collect(),
        ),
    }
}

fn decode(value: Value) -> StatsValue {
    match value {
        Value::Null => StatsValue::Null,
        Value::Bool(b) => StatsValue::Bool(b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                StatsValue::Int(i)
            } else {
                // serialize() only emits i64 or finite f64 numbers.
                StatsValue::Float(n.as_f64().unwrap_or(f64::MAX))
            }
        }
        Value::String(s) => StatsValue::String(s),
        Value::Array(items) => StatsValue::List(items.into_iter().map(decode).collect()),
        Value::Object(entries) => {
            if let Some(bytes) = decode_bytes_marker(&entries) {
                return StatsValue::Bytes(bytes);
            }
            StatsValue::Map(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, decode(value)))
                    .collect::<BTreeMap<_, _>>(),
            )
        }
    }
}

fn decode_bytes_marker(entries: &JsonMap<String, Value>) -> Option<Vec<u8>> {
    if entries.len() != 1 {
        return None;
    }
    let payload = entries.get(BYTES_MARKER)?.as_str()?;
    BASE64.decode(payload).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_plain_mapping() {
        let mut inner = PanelStats::new();
        inner.insert("foo".to_string(), "bar".into());
        let mut stats = PanelStats::new();
        stats.insert("hello".to_string(), StatsValue::Map(inner));

        assert_eq!(serialize_stats(&stats), r#"{"hello":{"foo":"bar"}}"#);
    }

    #[test]
    fn test_round_trip_scalars() {
        for value in [
            StatsValue::Null,
            StatsValue::Bool(true),
            StatsValue::Int(-42),
            StatsValue::Float(2.5),
            StatsValue::from("text"),
        ] {
            assert_eq!(deserialize(&serialize(&value)).unwrap(), value);
        }
    }

    #[test]
    fn test_int_float_distinction_survives() {
        let round = deserialize(&serialize(&StatsValue::Float(2.0))).unwrap();
        assert_eq!(round, StatsValue::Float(2.0));
        let round = deserialize(&serialize(&StatsValue::Int(2))).unwrap();
        assert_eq!(round, StatsValue::Int(2));
    }

    #[test]
    fn test_bytes_round_trip_through_nesting() {
        let mut stats = PanelStats::new();
        stats.insert(
            "blobs".to_string(),
            StatsValue::List(vec![
                StatsValue::Bytes(vec![0, 159, 146, 150]),
                StatsValue::Map(PanelStats::from([(
                    "nested".to_string(),
                    StatsValue::Bytes(b"payload".to_vec()),
                )])),
            ]),
        );

        let text = serialize_stats(&stats);
        assert!(text.contains(BYTES_MARKER));
        assert_eq!(deserialize_stats(&text).unwrap(), stats);
    }

    #[test]
    fn test_empty_bytes_round_trip_as_empty() {
        let value = StatsValue::Bytes(Vec::new());
        let round = deserialize(&serialize(&value)).unwrap();
        assert_eq!(round, StatsValue::Bytes(Vec::new()));
    }

    #[test]
    fn test_safe_string_degrades_to_plain() {
        let mut stats = PanelStats::new();
        stats.insert("string".to_string(), StatsValue::safe("safe"));

        let round = deserialize_stats(&serialize_stats(&stats)).unwrap();
        assert_eq!(round.get("string"), Some(&StatsValue::from("safe")));
    }

    #[test]
    fn test_non_finite_float_coerces_instead_of_failing() {
        let text = serialize(&StatsValue::Float(f64::NAN));
        assert_eq!(deserialize(&text).unwrap(), StatsValue::from("NaN"));

        let text = serialize(&StatsValue::Float(f64::INFINITY));
        assert_eq!(deserialize(&text).unwrap(), StatsValue::from("inf"));
    }

    #[test]
    fn test_marker_lookalike_with_extra_keys_stays_a_mapping() {
        let mut lookalike = PanelStats::new();
        lookalike.insert(BYTES_MARKER.to_string(), "aGk=".into());
        lookalike.insert("other".to_string(), StatsValue::Int(1));
        let value = StatsValue::Map(lookalike.clone());

        assert_eq!(deserialize(&serialize(&value)).unwrap(), StatsValue::Map(lookalike));
    }

    #[test]
    fn test_deserialize_rejects_malformed_text() {
        assert!(matches!(deserialize("{not json"), Err(CodecError::Malformed(_))));
        assert!(matches!(deserialize_stats("[1,2]"), Err(CodecError::NotAMapping)));
    }
}
