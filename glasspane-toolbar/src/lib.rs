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

//! Glasspane Toolbar
//!
//! Assembly and reconciliation. A [`Toolbar`] is built one of two ways:
//!
//! - **live**, around an in-flight request: every configured panel is
//!   instantiated against the live request, instrumentation hooks run around
//!   the wrapped handler, and each panel's stats are persisted under
//!   `(request_id, panel_id)`;
//! - **replay**, from a request id: stored panel data is fetched and the
//!   panel set is rebuilt from the *currently configured* panel list. Stored
//!   data hydrates its panel; configured panels without data are still
//!   present, empty, so a panel lookup only ever fails for ids that are
//!   genuinely not configured.
//!
//! Persistence failures on the live path are logged and swallowed: the
//! toolbar must never break the request it is observing.

pub mod panels;
pub mod registry;

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use glasspane_core::{PanelStats, RequestContext, RequestId, ResponseContext};
use glasspane_store::{Store, StoreError};

pub use panels::{HeadersPanel, RequestPanel, TimerPanel};
pub use registry::{
    get_registry, register_panel, reset_registry, PanelFactory, PanelRegistry,
};

/// Result type for toolbar operations.
pub type ToolbarResult<T> = Result<T, ToolbarError>;

/// Assembly and lookup failures.
#[derive(Debug, Error)]
pub enum ToolbarError {
    /// The id is not among the currently configured panels. Raised by
    /// lookups only for genuine misconfiguration, never for missing data.
    #[error("panel not configured: {0:?}")]
    UnknownPanel(String),

    /// The configured panel list names an id with no cataloged factory.
    #[error("configured panel id has no registered factory: {0:?}")]
    UnregisteredPanel(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One panel slot in an assembled toolbar.
pub struct ToolbarPanel {
    panel: Box<dyn glasspane_core::Panel>,
    panel_id: String,
    stats: PanelStats,
    enabled: bool,
    from_store: bool,
}

impl ToolbarPanel {
    pub fn panel_id(&self) -> &str {
        &self.panel_id
    }

    pub fn title(&self) -> String {
        self.panel.title()
    }

    /// Stats recorded for this request, empty until `generate_stats` ran
    /// (live) or when no data was stored (replay).
    pub fn stats(&self) -> &PanelStats {
        &self.stats
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Whether this panel was rebuilt from stored data rather than a live
    /// request.
    pub fn from_store(&self) -> bool {
        self.from_store
    }

    pub fn content(&self) -> Option<String> {
        self.panel.content(&self.stats)
    }

    pub fn scripts(&self) -> Vec<String> {
        self.panel.scripts()
    }
}

/// The per-request toolbar: an ordered collection of panels wired to the
/// store.
pub struct Toolbar {
    request_id: RequestId,
    panels: Vec<ToolbarPanel>,
    store: Arc<dyn Store>,
    from_store: bool,
}

impl Toolbar {
    /// Live construction: instantiate every configured panel against the
    /// in-flight request.
    pub fn new(request: &RequestContext, registry: &PanelRegistry, store: Arc<dyn Store>) -> Self {
        let panels = registry
            .panel_ids()
            .iter()
            .filter_map(|panel_id| {
                let panel = registry.build(panel_id)?;
                let enabled = panel.enabled(request);
                Some(ToolbarPanel {
                    panel,
                    panel_id: panel_id.clone(),
                    stats: PanelStats::new(),
                    enabled,
                    from_store: false,
                })
            })
            .collect();

        Self {
            request_id: request.request_id.clone(),
            panels,
            store,
            from_store: false,
        }
    }

    /// Replay construction: rebuild the panel set for a stored request.
    ///
    /// The collection comes from the currently configured panel list, not
    /// from whichever ids happen to have stored data — a record may predate
    /// panels added to the configuration since it was written. Hydrated
    /// panels are enabled exactly when they carry stats; there is no live
    /// request to consult.
    pub fn from_store(
        request_id: &RequestId,
        registry: &PanelRegistry,
        store: Arc<dyn Store>,
    ) -> ToolbarResult<Self> {
        let mut stored: HashMap<String, PanelStats> =
            store.panels(request_id)?.into_iter().collect();

        let panels = registry
            .panel_ids()
            .iter()
            .filter_map(|panel_id| {
                let panel = registry.build(panel_id)?;
                let stats = stored.remove(panel_id.as_str()).unwrap_or_default();
                let enabled = !stats.is_empty();
                Some(ToolbarPanel {
                    panel,
                    panel_id: panel_id.clone(),
                    stats,
                    enabled,
                    from_store: true,
                })
            })
            .collect();

        Ok(Self {
            request_id: request_id.clone(),
            panels,
            store,
            from_store: true,
        })
    }

    /// Replay a stored request, or `None` when its record no longer exists
    /// (expired or evicted).
    pub fn fetch(
        request_id: &RequestId,
        registry: &PanelRegistry,
        store: Arc<dyn Store>,
    ) -> ToolbarResult<Option<Self>> {
        if !store.exists(request_id)? {
            return Ok(None);
        }
        Ok(Some(Self::from_store(request_id, registry, store)?))
    }

    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    /// Whether this toolbar was rebuilt from the store.
    pub fn is_from_store(&self) -> bool {
        self.from_store
    }

    /// Panels in configured order.
    pub fn panels(&self) -> &[ToolbarPanel] {
        &self.panels
    }

    /// Look up a panel by id. Fails only for ids absent from the current
    /// configuration — a record without data for a configured panel still
    /// resolves to that panel, empty.
    pub fn get_panel_by_id(&self, panel_id: &str) -> ToolbarResult<&ToolbarPanel> {
        self.panels
            .iter()
            .find(|panel| panel.panel_id == panel_id)
            .ok_or_else(|| ToolbarError::UnknownPanel(panel_id.to_string()))
    }

    /// Run the wrapped handler with instrumentation around it.
    ///
    /// Enabled panels get `enable_instrumentation` + `process_request` in
    /// configured order before the handler, `disable_instrumentation` in
    /// reverse order after it (mirroring middleware nesting), then
    /// `generate_stats` in order with each result persisted.
    ///
    /// Store failures are logged, never propagated: diagnostics must not
    /// break the response.
    pub fn process<F>(&mut self, request: &RequestContext, handler: F) -> ResponseContext
    where
        F: FnOnce(&RequestContext) -> ResponseContext,
    {
        if let Err(err) = self.store.set(&self.request_id) {
            tracing::warn!(
                request_id = %self.request_id,
                error = %err,
                "failed to register request record"
            );
        }

        for slot in self.panels.iter_mut().filter(|slot| slot.enabled) {
            slot.panel.enable_instrumentation();
            slot.panel.process_request(request);
        }

        let response = handler(request);

        for slot in self.panels.iter_mut().rev().filter(|slot| slot.enabled) {
            slot.panel.disable_instrumentation();
        }

        for slot in self.panels.iter_mut().filter(|slot| slot.enabled) {
            slot.stats = slot.panel.generate_stats(request, &response);
            if let Err(err) = self
                .store
                .save_panel(&self.request_id, &slot.panel_id, &slot.stats)
            {
                tracing::warn!(
                    request_id = %self.request_id,
                    panel_id = %slot.panel_id,
                    error = %err,
                    "failed to persist panel stats"
                );
            }
        }

        response
    }
}

/// Shown in place of panel content when the record has expired.
pub const STALE_RECORD_MESSAGE: &str =
    "Data for this panel isn't available anymore. Please reload the page and retry.";

/// Payload returned to the asynchronous panel-content fetch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PanelResponse {
    pub content: String,
    pub scripts: Vec<String>,
}

/// Body of the panel-content endpoint: resolve one stored panel's rendered
/// content by request id.
///
/// An expired or evicted record yields the fallback message; an unknown
/// panel id is a real configuration error and surfaces as such.
pub fn render_panel(
    registry: &PanelRegistry,
    store: Arc<dyn Store>,
    request_id: &RequestId,
    panel_id: &str,
) -> ToolbarResult<PanelResponse> {
    match Toolbar::fetch(request_id, registry, store)? {
        None => Ok(PanelResponse {
            content: format!("<p>{STALE_RECORD_MESSAGE}</p>"),
            scripts: Vec::new(),
        }),
        Some(toolbar) => {
            let panel = toolbar.get_panel_by_id(panel_id)?;
            Ok(PanelResponse {
                content: panel.content().unwrap_or_default(),
                scripts: panel.scripts(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glasspane_core::{Panel, StatsValue};
    use glasspane_store::MemoryStore;
    use parking_lot::Mutex;

    /// Panel fixture that logs every lifecycle hook into a shared journal.
    struct JournalingPanel {
        id: &'static str,
        journal: Arc<Mutex<Vec<String>>>,
    }

    impl Panel for JournalingPanel {
        fn panel_id(&self) -> &'static str {
            self.id
        }

        fn enable_instrumentation(&mut self) {
            self.journal.lock().push(format!("enable:{}", self.id));
        }

        fn disable_instrumentation(&mut self) {
            self.journal.lock().push(format!("disable:{}", self.id));
        }

        fn process_request(&mut self, _request: &RequestContext) {
            self.journal.lock().push(format!("request:{}", self.id));
        }

        fn generate_stats(
            &mut self,
            _request: &RequestContext,
            response: &ResponseContext,
        ) -> PanelStats {
            self.journal.lock().push(format!("stats:{}", self.id));
            PanelStats::from([(
                "status".to_string(),
                StatsValue::Int(response.status.into()),
            )])
        }

        fn content(&self, stats: &PanelStats) -> Option<String> {
            stats
                .get("status")
                .map(|status| format!("<p>{} saw {:?}</p>", self.id, status))
        }
    }

    fn journaling_registry(
        ids: &[&'static str],
        journal: &Arc<Mutex<Vec<String>>>,
    ) -> PanelRegistry {
        let mut registry = PanelRegistry::new();
        for id in ids {
            let journal = journal.clone();
            let id = *id;
            registry.register(id, move || {
                Box::new(JournalingPanel {
                    id,
                    journal: journal.clone(),
                })
            });
        }
        registry
    }

    fn memory_store() -> Arc<dyn Store> {
        Arc::new(MemoryStore::new(25))
    }

    #[test]
    fn test_process_runs_hooks_in_middleware_order() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let registry = journaling_registry(&["A", "B"], &journal);
        let store = memory_store();

        let request = RequestContext::new("GET", "/");
        let mut toolbar = Toolbar::new(&request, &registry, store.clone());
        let response = toolbar.process(&request, |_request| {
            journal.lock().push("handler".to_string());
            ResponseContext::new(200)
        });

        assert_eq!(response.status, 200);
        assert_eq!(
            *journal.lock(),
            vec![
                "enable:A",
                "request:A",
                "enable:B",
                "request:B",
                "handler",
                // Teardown mirrors middleware nesting: reverse order.
                "disable:B",
                "disable:A",
                "stats:A",
                "stats:B",
            ]
        );

        // Stats landed in the store under this request id.
        assert!(store.exists(&request.request_id).unwrap());
        assert_eq!(
            store.panel(&request.request_id, "A").unwrap(),
            PanelStats::from([("status".to_string(), StatsValue::Int(200))])
        );
    }

    #[test]
    fn test_opted_out_panel_is_skipped_and_not_persisted() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let registry = journaling_registry(&["A", "B"], &journal);
        let store = memory_store();

        let request = RequestContext::new("GET", "/").with_cookie("gpA", "off");
        let mut toolbar = Toolbar::new(&request, &registry, store.clone());
        toolbar.process(&request, |_request| ResponseContext::new(200));

        assert!(!journal.lock().iter().any(|entry| entry.ends_with(":A")));
        assert_eq!(store.panel(&request.request_id, "A").unwrap(), PanelStats::new());
        assert!(!store.panel(&request.request_id, "B").unwrap().is_empty());

        // The panel is still present in the toolbar, just disabled.
        assert!(!toolbar.get_panel_by_id("A").unwrap().enabled());
    }

    #[test]
    fn test_reconciliation_includes_panels_added_after_storage() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let store = memory_store();

        // Data stored while the configured set was {A, B}.
        let old_registry = journaling_registry(&["A", "B"], &journal);
        let request = RequestContext::new("GET", "/");
        let mut toolbar = Toolbar::new(&request, &old_registry, store.clone());
        toolbar.process(&request, |_request| ResponseContext::new(200));

        // The configuration has since grown to {A, B, C}.
        let new_registry = journaling_registry(&["A", "B", "C"], &journal);
        let stored = Toolbar::from_store(&request.request_id, &new_registry, store).unwrap();

        assert!(stored.is_from_store());
        assert_eq!(
            stored
                .panels()
                .iter()
                .map(ToolbarPanel::panel_id)
                .collect::<Vec<_>>(),
            vec!["A", "B", "C"]
        );

        // Hydrated panels carry their data and are enabled.
        let a = stored.get_panel_by_id("A").unwrap();
        assert!(a.from_store() && a.enabled());
        assert!(!a.stats().is_empty());

        // The new panel is present, empty, and disabled — not a lookup error.
        let c = stored.get_panel_by_id("C").unwrap();
        assert!(c.from_store() && !c.enabled());
        assert!(c.stats().is_empty());

        // An id that was never configured is a genuine failure.
        assert!(matches!(
            stored.get_panel_by_id("Z"),
            Err(ToolbarError::UnknownPanel(id)) if id == "Z"
        ));
    }

    #[test]
    fn test_fetch_returns_none_for_unknown_record() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let registry = journaling_registry(&["A"], &journal);

        let missing = RequestId::from("missing");
        let toolbar = Toolbar::fetch(&missing, &registry, memory_store()).unwrap();
        assert!(toolbar.is_none());
    }

    #[test]
    fn test_render_panel_returns_stored_content() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let registry = journaling_registry(&["A"], &journal);
        let store = memory_store();

        let request = RequestContext::new("GET", "/");
        let mut toolbar = Toolbar::new(&request, &registry, store.clone());
        toolbar.process(&request, |_request| ResponseContext::new(200));

        let rendered = render_panel(&registry, store, &request.request_id, "A").unwrap();
        assert!(rendered.content.contains("A saw"));
    }

    #[test]
    fn test_render_panel_falls_back_for_expired_record() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let registry = journaling_registry(&["A"], &journal);

        let rendered = render_panel(
            &registry,
            memory_store(),
            &RequestId::from("expired"),
            "A",
        )
        .unwrap();

        assert_eq!(rendered.content, format!("<p>{STALE_RECORD_MESSAGE}</p>"));
        assert!(rendered.scripts.is_empty());
    }

    #[test]
    fn test_render_panel_surfaces_misconfigured_id() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let registry = journaling_registry(&["A"], &journal);
        let store = memory_store();

        let request = RequestContext::new("GET", "/");
        let mut toolbar = Toolbar::new(&request, &registry, store.clone());
        toolbar.process(&request, |_request| ResponseContext::new(200));

        assert!(matches!(
            render_panel(&registry, store, &request.request_id, "Typo"),
            Err(ToolbarError::UnknownPanel(id)) if id == "Typo"
        ));
    }

    #[test]
    fn test_concurrent_requests_record_independently() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let store = memory_store();
        let mut handles = Vec::new();

        for worker in 0..4u16 {
            let journal = journal.clone();
            let store = store.clone();
            handles.push(std::thread::spawn(move || {
                let registry = journaling_registry(&["A"], &journal);
                let request = RequestContext::new("GET", "/");
                let mut toolbar = Toolbar::new(&request, &registry, store.clone());
                toolbar.process(&request, |_request| {
                    ResponseContext::new(200 + worker)
                });
                (request.request_id.clone(), 200 + worker)
            }));
        }

        for handle in handles {
            let (request_id, status) = handle.join().unwrap();
            assert_eq!(
                store.panel(&request_id, "A").unwrap(),
                PanelStats::from([(
                    "status".to_string(),
                    StatsValue::Int(status.into()),
                )])
            );
        }
    }
}
