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

//! Scrubbing of sensitive request data.
//!
//! Recorded request variables end up in the store and, from there, on
//! screen. Values whose key looks credential-shaped are replaced with a
//! placeholder before recording, governed by the `sanitize_request_data`
//! configuration toggle.

use crate::stats::StatsValue;

/// Replacement for scrubbed values.
pub const SANITIZED_PLACEHOLDER: &str = "********";

/// Case-insensitive fragments that mark a variable name as sensitive.
const SENSITIVE_FRAGMENTS: &[&str] = &[
    "api",
    "authorization",
    "key",
    "pass",
    "secret",
    "signature",
    "token",
];

/// Whether a variable name looks like it holds a credential.
pub fn is_sensitive_key(key: &str) -> bool {
    let key = key.to_lowercase();
    SENSITIVE_FRAGMENTS
        .iter()
        .any(|fragment| key.contains(fragment))
}

/// Scrub `value` when its key is sensitive, pass it through otherwise.
pub fn sanitize_value(key: &str, value: StatsValue) -> StatsValue {
    if is_sensitive_key(key) {
        StatsValue::from(SANITIZED_PLACEHOLDER)
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sensitive_keys() {
        assert!(is_sensitive_key("password"));
        assert!(is_sensitive_key("API_KEY"));
        assert!(is_sensitive_key("csrf_token"));
        assert!(is_sensitive_key("Authorization"));
        assert!(!is_sensitive_key("username"));
        assert!(!is_sensitive_key("page"));
    }

    #[test]
    fn test_sanitize_value_replaces_only_sensitive() {
        assert_eq!(
            sanitize_value("password", "hunter2".into()),
            StatsValue::from(SANITIZED_PLACEHOLDER)
        );
        assert_eq!(
            sanitize_value("page", "2".into()),
            StatsValue::from("2")
        );
    }
}
