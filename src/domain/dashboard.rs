// Dashboard domain model
use super::lenient::null_as_default;
use super::panel::{normalize, Layout, Panel, Row};
use super::variables::{deserialize_variables, summarize, TemplateVariable};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::OnceLock;

/// Which panel set a report renders and how it lays them out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutMode {
    /// Flat panel list, one after another, fixed image sizes
    #[default]
    Sequential,
    /// Flat panel list, image sizes derived from grid positions
    Grid,
    /// Panels grouped under their rows, one row per page
    Rows,
}

impl LayoutMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            LayoutMode::Sequential => "sequential",
            LayoutMode::Grid => "grid",
            LayoutMode::Rows => "rows",
        }
    }

    pub fn fits_to_grid(&self) -> bool {
        *self == LayoutMode::Grid
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub from: String,
    pub to: String,
}

impl Default for TimeRange {
    fn default() -> Self {
        Self::new("now-3h", "now")
    }
}

impl TimeRange {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }

    pub fn formatted_from(&self) -> String {
        Self::format_bound(&self.from)
    }

    pub fn formatted_to(&self) -> String {
        Self::format_bound(&self.to)
    }

    /// Epoch milliseconds become a UTC timestamp; relative expressions like `now-3h` stay as they are.
    fn format_bound(bound: &str) -> String {
        bound
            .parse::<i64>()
            .ok()
            .and_then(chrono::DateTime::<chrono::Utc>::from_timestamp_millis)
            .map(|time| time.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| bound.to_string())
    }
}

/// Body of the dashboard metadata endpoint
#[derive(Debug, Deserialize)]
pub struct DashboardEnvelope {
    #[serde(default, deserialize_with = "null_as_default")]
    pub meta: DashboardMeta,
    pub dashboard: Dashboard,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DashboardMeta {
    #[serde(default, deserialize_with = "null_as_default")]
    pub slug: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Templating {
    #[serde(default, deserialize_with = "deserialize_variables")]
    pub list: Vec<TemplateVariable>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Dashboard {
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub uid: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub time: TimeRange,
    #[serde(default, deserialize_with = "null_as_default")]
    pub templating: Templating,
    #[serde(default, deserialize_with = "null_as_default")]
    panels: Vec<Value>,
    // Deprecated since Grafana v5, only read when `panels` is empty
    #[serde(default, deserialize_with = "null_as_default")]
    rows: Vec<Value>,
    #[serde(skip)]
    layout: OnceLock<Layout>,
}

impl Dashboard {
    /// Normalized panels and rows, parsed once on first access
    pub fn layout(&self) -> &Layout {
        self.layout.get_or_init(|| {
            if self.panels.is_empty() && !self.rows.is_empty() {
                tracing::info!("Using deprecated 'rows' field for panel data");
                normalize(&self.rows, true)
            } else {
                normalize(&self.panels, false)
            }
        })
    }

    /// Every renderable panel in reading order, regardless of row membership
    pub fn grid_panels(&self) -> &[Panel] {
        &self.layout().panels
    }

    pub fn rows(&self) -> &[Row] {
        &self.layout().rows
    }

    /// Panels nested in rows, row by row
    pub fn row_panels(&self) -> Vec<Panel> {
        self.rows()
            .iter()
            .flat_map(|row| row.panels.iter().cloned())
            .collect()
    }

    pub fn panels_for(&self, mode: LayoutMode) -> Vec<Panel> {
        match mode {
            LayoutMode::Rows => self.row_panels(),
            LayoutMode::Grid | LayoutMode::Sequential => self.grid_panels().to_vec(),
        }
    }

    pub fn variables(&self) -> &[TemplateVariable] {
        &self.templating.list
    }

    pub fn variable_summary(&self) -> String {
        summarize(self.variables())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_dashboard() -> Dashboard {
        serde_json::from_value(json!({
            "title": "Reef",
            "uid": "reef-overview",
            "time": { "from": "now-6h", "to": "now" },
            "templating": {
                "list": [{ "name": "tank", "current": { "text": "Reef", "value": "reef" } }]
            },
            "panels": [
                {
                    "id": 10,
                    "type": "row",
                    "title": "Water",
                    "gridPos": { "x": 0, "y": 8, "w": 24, "h": 1 },
                    "panels": [
                        { "id": 2, "type": "graph", "title": "Temp", "gridPos": { "x": 12, "y": 9, "w": 12, "h": 8 } },
                        { "id": 3, "type": "graph", "title": "pH", "gridPos": { "x": 0, "y": 9, "w": 12, "h": 8 } }
                    ]
                },
                { "id": 1, "type": "stat", "title": "Status", "gridPos": { "x": 0, "y": 0, "w": 6, "h": 4 } }
            ]
        }))
        .expect("valid dashboard")
    }

    #[test]
    fn test_layout_is_memoized() {
        let dashboard = sample_dashboard();

        let first = dashboard.layout();
        let second = dashboard.layout();

        assert!(std::ptr::eq(first, second));
        assert_eq!(first, second);
    }

    #[test]
    fn test_panel_sets_per_layout_mode() {
        let dashboard = sample_dashboard();

        let ids = |panels: Vec<Panel>| panels.iter().map(|p| p.id).collect::<Vec<_>>();

        assert_eq!(ids(dashboard.panels_for(LayoutMode::Sequential)), vec![1, 3, 2]);
        assert_eq!(ids(dashboard.panels_for(LayoutMode::Grid)), vec![1, 3, 2]);
        assert_eq!(ids(dashboard.panels_for(LayoutMode::Rows)), vec![3, 2]);
    }

    #[test]
    fn test_deprecated_rows_used_when_panels_empty() {
        let dashboard: Dashboard = serde_json::from_value(json!({
            "title": "Old",
            "rows": [{
                "title": "Legacy",
                "panels": [{ "id": 1, "type": "graph", "title": "CPU" }]
            }]
        }))
        .unwrap();

        assert_eq!(dashboard.grid_panels().len(), 1);
        assert_eq!(dashboard.rows().len(), 1);
        assert_eq!(dashboard.rows()[0].title, "Legacy");
    }

    #[test]
    fn test_variable_summary() {
        assert_eq!(sample_dashboard().variable_summary(), "tank: Reef");
    }

    #[test]
    fn test_time_range_formatting() {
        let range = TimeRange::new("1700000000000", "now");

        assert_eq!(range.formatted_from(), "2023-11-14 22:13:20 UTC");
        assert_eq!(range.formatted_to(), "now");
    }

    #[test]
    fn test_layout_mode_from_config_string() {
        let mode: LayoutMode = serde_json::from_value(json!("rows")).unwrap();
        assert_eq!(mode, LayoutMode::Rows);
        assert!(LayoutMode::Grid.fits_to_grid());
        assert!(!LayoutMode::Sequential.fits_to_grid());
    }

    #[test]
    fn test_null_fields_decode_as_defaults() {
        let envelope: DashboardEnvelope = serde_json::from_value(json!({
            "meta": { "slug": null },
            "dashboard": {
                "title": "Reef",
                "uid": null,
                "description": null,
                "time": null,
                "templating": null,
                "rows": null,
                "panels": [{ "id": 1, "type": "graph", "title": "pH" }]
            }
        }))
        .unwrap();

        let dashboard = envelope.dashboard;
        assert_eq!(dashboard.title, "Reef");
        assert_eq!(dashboard.uid, "");
        assert_eq!(dashboard.description, "");
        assert_eq!(dashboard.time, TimeRange::default());
        assert!(dashboard.variables().is_empty());
        assert_eq!(dashboard.grid_panels().len(), 1);
        assert_eq!(envelope.meta.slug, "");
    }
}
