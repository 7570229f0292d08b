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

//! Built-in panels.
//!
//! Deliberately small: request variables, headers, and handler timing.
//! Heavier collectors (SQL capture, profiling) live with the host and plug
//! in through [`register_panel`](crate::register_panel).

use std::collections::BTreeMap;
use std::time::Instant;

use glasspane_core::{
    config, sanitize_value, Panel, PanelStats, RequestContext, ResponseContext, StatsValue,
};

/// Request variables: query, form and cookie data, plus method and path.
pub struct RequestPanel;

impl RequestPanel {
    pub fn new() -> Self {
        RequestPanel
    }

    fn variables(pairs: &[(String, String)], sanitize: bool) -> StatsValue {
        let mut map = BTreeMap::new();
        for (name, value) in pairs {
            let value = StatsValue::from(value.as_str());
            map.insert(
                name.clone(),
                if sanitize {
                    sanitize_value(name, value)
                } else {
                    value
                },
            );
        }
        StatsValue::Map(map)
    }
}

impl Default for RequestPanel {
    fn default() -> Self {
        Self::new()
    }
}

impl Panel for RequestPanel {
    fn panel_id(&self) -> &'static str {
        "RequestPanel"
    }

    fn title(&self) -> String {
        "Request".to_string()
    }

    fn generate_stats(
        &mut self,
        request: &RequestContext,
        _response: &ResponseContext,
    ) -> PanelStats {
        // Re-read the toggle per request; configuration may change between
        // requests.
        let sanitize = config::get_config().sanitize_request_data;

        let cookies: Vec<(String, String)> = request
            .cookies
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        PanelStats::from([
            ("method".to_string(), StatsValue::from(request.method.as_str())),
            ("path".to_string(), StatsValue::from(request.path.as_str())),
            ("get".to_string(), Self::variables(&request.query, sanitize)),
            ("form".to_string(), Self::variables(&request.form, sanitize)),
            ("cookies".to_string(), Self::variables(&cookies, sanitize)),
        ])
    }

    fn content(&self, stats: &PanelStats) -> Option<String> {
        let method = stats.get("method").and_then(StatsValue::as_str)?;
        let path = stats.get("path").and_then(StatsValue::as_str)?;
        Some(format!("<p>{method} {path}</p>"))
    }
}

/// Request and response headers.
pub struct HeadersPanel;

impl HeadersPanel {
    pub fn new() -> Self {
        HeadersPanel
    }

    fn header_map(headers: &BTreeMap<String, String>) -> StatsValue {
        StatsValue::Map(
            headers
                .iter()
                .map(|(name, value)| (name.clone(), sanitize_value(name, value.as_str().into())))
                .collect(),
        )
    }
}

impl Default for HeadersPanel {
    fn default() -> Self {
        Self::new()
    }
}

impl Panel for HeadersPanel {
    fn panel_id(&self) -> &'static str {
        "HeadersPanel"
    }

    fn title(&self) -> String {
        "Headers".to_string()
    }

    fn generate_stats(
        &mut self,
        request: &RequestContext,
        response: &ResponseContext,
    ) -> PanelStats {
        PanelStats::from([
            (
                "request_headers".to_string(),
                Self::header_map(&request.headers),
            ),
            (
                "response_headers".to_string(),
                Self::header_map(&response.headers),
            ),
            (
                "status".to_string(),
                StatsValue::Int(response.status.into()),
            ),
        ])
    }
}

/// Wall-clock time spent in the wrapped handler.
pub struct TimerPanel {
    started: Option<Instant>,
}

impl TimerPanel {
    pub fn new() -> Self {
        TimerPanel { started: None }
    }
}

impl Default for TimerPanel {
    fn default() -> Self {
        Self::new()
    }
}

impl Panel for TimerPanel {
    fn panel_id(&self) -> &'static str {
        "TimerPanel"
    }

    fn title(&self) -> String {
        "Time".to_string()
    }

    fn enable_instrumentation(&mut self) {
        self.started = Some(Instant::now());
    }

    fn generate_stats(
        &mut self,
        _request: &RequestContext,
        _response: &ResponseContext,
    ) -> PanelStats {
        let elapsed_ms = self
            .started
            .map(|started| started.elapsed().as_secs_f64() * 1000.0)
            .unwrap_or(0.0);
        PanelStats::from([("elapsed_ms".to_string(), StatsValue::Float(elapsed_ms))])
    }

    fn content(&self, stats: &PanelStats) -> Option<String> {
        match stats.get("elapsed_ms") {
            Some(StatsValue::Float(ms)) => Some(format!("<p>{ms:.1} ms</p>")),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glasspane_core::SANITIZED_PLACEHOLDER;

    #[test]
    fn test_request_panel_records_sanitized_variables() {
        // Sanitization is on in every configuration the test suite installs,
        // so the active config's toggle can be trusted here.
        let request = RequestContext::new("GET", "/search")
            .with_query("q", "rust")
            .with_query("api_key", "sk-123")
            .with_cookie("sessionid", "abc");
        let response = ResponseContext::new(200);

        let stats = RequestPanel::new().generate_stats(&request, &response);

        assert_eq!(stats.get("method"), Some(&StatsValue::from("GET")));
        let get_vars = stats.get("get").and_then(StatsValue::as_map).unwrap();
        assert_eq!(get_vars.get("q"), Some(&StatsValue::from("rust")));
        assert_eq!(
            get_vars.get("api_key"),
            Some(&StatsValue::from(SANITIZED_PLACEHOLDER))
        );
    }

    #[test]
    fn test_headers_panel_records_both_sides() {
        let request = RequestContext::new("GET", "/").with_header("Accept", "text/html");
        let response = ResponseContext::new(404).with_header("Content-Type", "text/html");

        let stats = HeadersPanel::new().generate_stats(&request, &response);

        assert_eq!(stats.get("status"), Some(&StatsValue::Int(404)));
        let request_headers = stats
            .get("request_headers")
            .and_then(StatsValue::as_map)
            .unwrap();
        assert_eq!(
            request_headers.get("Accept"),
            Some(&StatsValue::from("text/html"))
        );
    }

    #[test]
    fn test_timer_panel_measures_between_hooks() {
        let mut panel = TimerPanel::new();
        panel.enable_instrumentation();
        let request = RequestContext::new("GET", "/");
        let response = ResponseContext::new(200);

        let stats = panel.generate_stats(&request, &response);
        match stats.get("elapsed_ms") {
            Some(StatsValue::Float(ms)) => assert!(*ms >= 0.0),
            other => panic!("expected elapsed_ms float, got {other:?}"),
        }
    }

    #[test]
    fn test_timer_panel_without_instrumentation_reports_zero() {
        let stats = TimerPanel::new()
            .generate_stats(&RequestContext::new("GET", "/"), &ResponseContext::new(200));
        assert_eq!(stats.get("elapsed_ms"), Some(&StatsValue::Float(0.0)));
    }
}
