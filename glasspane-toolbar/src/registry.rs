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

//! Panel registry and discovery.
//!
//! Panels are selected by stable id from an explicit catalog of factories —
//! built-ins plus whatever the host registers at startup — ordered by the
//! configured panel list. The process-wide registry instance is memoized per
//! configuration generation: changing the configured list rebuilds it, so a
//! toolbar never reconciles against a stale panel set.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use parking_lot::RwLock;

use glasspane_core::{config, Panel, ToolbarConfig};

use crate::panels::{HeadersPanel, RequestPanel, TimerPanel};
use crate::ToolbarError;

/// Constructor for one panel kind.
pub type PanelFactory = Arc<dyn Fn() -> Box<dyn Panel> + Send + Sync>;

/// Ordered mapping from panel id to factory for one configuration.
pub struct PanelRegistry {
    order: Vec<String>,
    factories: HashMap<String, PanelFactory>,
}

impl PanelRegistry {
    /// Empty registry; panels are added with [`register`](Self::register).
    pub fn new() -> Self {
        Self {
            order: Vec::new(),
            factories: HashMap::new(),
        }
    }

    /// Registry for the configured panel list. Every configured id must name
    /// a cataloged factory; an unknown id is a configuration error, not a
    /// silently skipped panel.
    pub fn from_config(config: &ToolbarConfig) -> Result<Self, ToolbarError> {
        let mut registry = Self::new();
        for panel_id in &config.panels {
            let factory = catalog_factory(panel_id)
                .ok_or_else(|| ToolbarError::UnregisteredPanel(panel_id.clone()))?;
            registry.register_factory(panel_id.clone(), factory);
        }
        Ok(registry)
    }

    /// Append a panel kind. Re-registering an id replaces its factory and
    /// keeps its position.
    pub fn register<F>(&mut self, panel_id: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn Panel> + Send + Sync + 'static,
    {
        self.register_factory(panel_id.into(), Arc::new(factory));
    }

    fn register_factory(&mut self, panel_id: String, factory: PanelFactory) {
        if !self.factories.contains_key(&panel_id) {
            self.order.push(panel_id.clone());
        }
        self.factories.insert(panel_id, factory);
    }

    /// Configured panel ids in order.
    pub fn panel_ids(&self) -> &[String] {
        &self.order
    }

    pub fn contains(&self, panel_id: &str) -> bool {
        self.factories.contains_key(panel_id)
    }

    /// Instantiate the panel registered under `panel_id`.
    pub fn build(&self, panel_id: &str) -> Option<Box<dyn Panel>> {
        self.factories.get(panel_id).map(|factory| factory())
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl Default for PanelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Catalog of every known panel factory, seeded with the built-ins. Hosts
/// extend it with [`register_panel`] before installing their configuration.
static PANEL_CATALOG: Lazy<DashMap<String, PanelFactory>> = Lazy::new(|| {
    let catalog: DashMap<String, PanelFactory> = DashMap::new();
    catalog.insert(
        "RequestPanel".to_string(),
        Arc::new(|| Box::new(RequestPanel::new()) as Box<dyn Panel>) as PanelFactory,
    );
    catalog.insert(
        "HeadersPanel".to_string(),
        Arc::new(|| Box::new(HeadersPanel::new()) as Box<dyn Panel>) as PanelFactory,
    );
    catalog.insert(
        "TimerPanel".to_string(),
        Arc::new(|| Box::new(TimerPanel::new()) as Box<dyn Panel>) as PanelFactory,
    );
    catalog
});

/// Make a custom panel kind available to configuration by id.
pub fn register_panel<F>(panel_id: impl Into<String>, factory: F)
where
    F: Fn() -> Box<dyn Panel> + Send + Sync + 'static,
{
    PANEL_CATALOG.insert(panel_id.into(), Arc::new(factory));
}

fn catalog_factory(panel_id: &str) -> Option<PanelFactory> {
    PANEL_CATALOG.get(panel_id).map(|entry| entry.value().clone())
}

struct ActiveRegistry {
    generation: u64,
    registry: Arc<PanelRegistry>,
}

static ACTIVE_REGISTRY: Lazy<RwLock<Option<ActiveRegistry>>> = Lazy::new(|| RwLock::new(None));

/// The registry for the active configuration, memoized until the
/// configuration generation changes.
pub fn get_registry() -> Result<Arc<PanelRegistry>, ToolbarError> {
    let generation = config::config_generation();
    if let Some(active) = ACTIVE_REGISTRY.read().as_ref() {
        if active.generation == generation {
            return Ok(active.registry.clone());
        }
    }

    let registry = Arc::new(PanelRegistry::from_config(&config::get_config())?);
    *ACTIVE_REGISTRY.write() = Some(ActiveRegistry {
        generation,
        registry: registry.clone(),
    });
    Ok(registry)
}

/// Drop the memoized registry; the next [`get_registry`] call rebuilds from
/// the active configuration.
pub fn reset_registry() {
    *ACTIVE_REGISTRY.write() = None;
}
