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

//! Glasspane Core
//!
//! Fundamental types for the Glasspane request instrumentation toolbar:
//! the panel stat payload tree and its wire codec, the narrow request and
//! response context handed over by the host, the `Panel` contract, request
//! variable sanitization, and process-wide configuration.
//!
//! Persistence lives in `glasspane-store`; assembly and reconciliation live
//! in `glasspane-toolbar`.

pub mod codec;
pub mod config;
pub mod panel;
pub mod request;
pub mod sanitize;
pub mod stats;

pub use codec::{deserialize, deserialize_stats, serialize, serialize_stats, CodecError};
pub use config::{
    config_generation, get_config, reset_config, set_config, ConfigError, StoreBackendConfig,
    ToolbarConfig, DEFAULT_CACHE_ALIAS, DEFAULT_CACHE_KEY_PREFIX, DEFAULT_DATABASE_TABLE,
    DEFAULT_RESULTS_CACHE_SIZE,
};
pub use panel::{Panel, DISABLE_COOKIE_PREFIX};
pub use request::{RequestContext, RequestId, ResponseContext};
pub use sanitize::{is_sensitive_key, sanitize_value, SANITIZED_PLACEHOLDER};
pub use stats::{PanelStats, StatsValue};
