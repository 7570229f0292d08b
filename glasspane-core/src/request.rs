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

//! Request-scoped context types.
//!
//! The host's middleware adapts its own request and response objects into
//! these narrow views before handing them to the toolbar. Everything the
//! toolbar core knows about HTTP lives here.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque token correlating all diagnostic data for one request.
///
/// Freshly minted ids are UUIDv4 text, but any string is accepted: the store
/// layer treats the id as opaque.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Mint a fresh unique id.
    pub fn new() -> Self {
        RequestId(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for RequestId {
    fn from(value: String) -> Self {
        RequestId(value)
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        RequestId(value.to_string())
    }
}

/// The live request as the toolbar sees it.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: RequestId,
    pub method: String,
    pub path: String,
    /// Query string variables in arrival order.
    pub query: Vec<(String, String)>,
    /// Form body variables in arrival order.
    pub form: Vec<(String, String)>,
    pub cookies: BTreeMap<String, String>,
    pub headers: BTreeMap<String, String>,
}

impl RequestContext {
    /// New context with a freshly minted request id.
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            request_id: RequestId::new(),
            method: method.into(),
            path: path.into(),
            query: Vec::new(),
            form: Vec::new(),
            cookies: BTreeMap::new(),
            headers: BTreeMap::new(),
        }
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn with_form(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.form.push((name.into(), value.into()));
        self
    }

    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name.into(), value.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Cookie value by name.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }
}

/// The response produced by the wrapped handler.
#[derive(Debug, Clone)]
pub struct ResponseContext {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
}

impl ResponseContext {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_ids_are_unique() {
        assert_ne!(RequestId::new(), RequestId::new());
    }

    #[test]
    fn test_id_accepts_arbitrary_strings() {
        let id = RequestId::from("req1");
        assert_eq!(id.as_str(), "req1");
        assert_eq!(id.to_string(), "req1");
    }

    #[test]
    fn test_cookie_lookup() {
        let request = RequestContext::new("GET", "/").with_cookie("gpTimerPanel", "off");
        assert_eq!(request.cookie("gpTimerPanel"), Some("off"));
        assert_eq!(request.cookie("missing"), None);
    }
}
