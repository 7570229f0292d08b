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

//! The panel contract.
//!
//! A panel captures one category of per-request diagnostic data. The toolbar
//! treats panels as opaque capability-holders: it drives the lifecycle hooks
//! in configured order and persists whatever `generate_stats` returns. Panels
//! never talk to the store themselves.

use crate::request::{RequestContext, ResponseContext};
use crate::stats::PanelStats;

/// Prefix of the per-panel opt-out cookie; `gp<panel_id>` set to `"off"`
/// disables that panel for the requesting browser.
pub const DISABLE_COOKIE_PREFIX: &str = "gp";

/// One pluggable unit of per-request diagnostics.
///
/// Lifecycle for a live request, driven by the toolbar in configured panel
/// order:
///
/// 1. `enable_instrumentation` and `process_request`, before the handler;
/// 2. `disable_instrumentation`, after the handler, in *reverse* order;
/// 3. `generate_stats`, whose result is persisted under
///    `(request_id, panel_id)`.
pub trait Panel: Send {
    /// Stable identifier, unique among configured panels.
    fn panel_id(&self) -> &'static str;

    /// Human-readable title for toolbar chrome.
    fn title(&self) -> String {
        self.panel_id().to_string()
    }

    /// Whether this panel should run for the given live request. The default
    /// honors the per-panel opt-out cookie.
    fn enabled(&self, request: &RequestContext) -> bool {
        let cookie = format!("{}{}", DISABLE_COOKIE_PREFIX, self.panel_id());
        request.cookie(&cookie) != Some("off")
    }

    /// Install whatever interception this panel needs before the handler
    /// runs.
    fn enable_instrumentation(&mut self) {}

    /// Tear interception down again; called in reverse panel order.
    fn disable_instrumentation(&mut self) {}

    /// Request-phase hook, runs before the wrapped handler.
    fn process_request(&mut self, _request: &RequestContext) {}

    /// Response-phase hook: produce the stats to persist for this request.
    fn generate_stats(
        &mut self,
        request: &RequestContext,
        response: &ResponseContext,
    ) -> PanelStats;

    /// Rendered panel body for the given stats, if this panel renders any.
    fn content(&self, _stats: &PanelStats) -> Option<String> {
        None
    }

    /// Script URLs the rendered content needs.
    fn scripts(&self) -> Vec<String> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullPanel;

    impl Panel for NullPanel {
        fn panel_id(&self) -> &'static str {
            "NullPanel"
        }

        fn generate_stats(
            &mut self,
            _request: &RequestContext,
            _response: &ResponseContext,
        ) -> PanelStats {
            PanelStats::new()
        }
    }

    #[test]
    fn test_default_enabled_honors_opt_out_cookie() {
        let panel = NullPanel;
        let request = RequestContext::new("GET", "/");
        assert!(panel.enabled(&request));

        let request = RequestContext::new("GET", "/").with_cookie("gpNullPanel", "off");
        assert!(!panel.enabled(&request));

        let request = RequestContext::new("GET", "/").with_cookie("gpNullPanel", "on");
        assert!(panel.enabled(&request));
    }
}
