// Panel domain model and the row/panel normalizer
use crate::domain::lenient::grid_units;
use crate::domain::text::snippet;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::collections::HashSet;

const RAW_SNIPPET_CHARS: usize = 100;

/// Panel type tag as sent by the dashboard service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelKind {
    Stat,
    Text,
    Graph,
    Table,
    Row,
    Other(String),
}

impl PanelKind {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "stat" | "singlestat" => PanelKind::Stat,
            "text" => PanelKind::Text,
            "graph" => PanelKind::Graph,
            "table" => PanelKind::Table,
            "row" => PanelKind::Row,
            other => PanelKind::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            PanelKind::Stat => "stat",
            PanelKind::Text => "text",
            PanelKind::Graph => "graph",
            PanelKind::Table => "table",
            PanelKind::Row => "row",
            PanelKind::Other(tag) => tag,
        }
    }
}

impl Serialize for PanelKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Position and size in dashboard grid units
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridPos {
    #[serde(default, deserialize_with = "grid_units")]
    pub x: u32,
    #[serde(default, deserialize_with = "grid_units")]
    pub y: u32,
    #[serde(default, deserialize_with = "grid_units")]
    pub w: u32,
    #[serde(default, deserialize_with = "grid_units")]
    pub h: u32,
}

impl GridPos {
    #[cfg(test)]
    pub fn new(x: u32, y: u32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }

    fn reading_order(&self) -> (u32, u32) {
        (self.y, self.x)
    }
}

/// A renderable (non-row) panel
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Panel {
    pub id: i64,
    pub kind: PanelKind,
    pub title: String,
    pub grid_pos: GridPos,
}

impl Panel {
    pub fn new(id: i64, kind: PanelKind, title: impl Into<String>, grid_pos: GridPos) -> Self {
        Self {
            id,
            kind,
            title: title.into(),
            grid_pos,
        }
    }

    pub fn is_text(&self) -> bool {
        self.kind == PanelKind::Text
    }
}

/// A row container expanded into its nested panels
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row {
    pub id: i64,
    pub title: String,
    pub visible: bool,
    pub grid_pos: GridPos,
    pub panels: Vec<Panel>,
}

/// Normalized views of a dashboard's panels
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Layout {
    /// Every renderable panel, including those nested in rows
    pub panels: Vec<Panel>,
    pub rows: Vec<Row>,
}

#[derive(Debug, Deserialize)]
struct PanelHeader {
    id: i64,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default, rename = "gridPos")]
    grid_pos: Option<GridPos>,
}

#[derive(Debug, Default, Deserialize)]
struct RowBody {
    #[serde(default)]
    collapsed: Option<bool>,
    // Pre-v5 dashboards
    #[serde(default)]
    collapse: Option<bool>,
    #[serde(default)]
    panels: Option<Vec<Value>>,
}

impl RowBody {
    fn is_collapsed(&self) -> bool {
        self.collapsed.or(self.collapse).unwrap_or(false)
    }
}

enum Entry {
    Panel(Panel),
    Row(Row, Vec<Value>),
}

fn decode_entry(raw: &Value) -> Result<Entry, serde_json::Error> {
    let header = PanelHeader::deserialize(raw)?;
    let kind = PanelKind::from_tag(&header.kind);
    let title = header.title.unwrap_or_default();
    let grid_pos = header.grid_pos.unwrap_or_default();

    if kind != PanelKind::Row {
        return Ok(Entry::Panel(Panel::new(header.id, kind, title, grid_pos)));
    }

    let body = RowBody::deserialize(raw)?;
    let row = Row {
        id: header.id,
        title,
        visible: !body.is_collapsed(),
        grid_pos,
        panels: Vec::new(),
    };
    Ok(Entry::Row(row, body.panels.unwrap_or_default()))
}

/// Entries of the deprecated `rows` array carry nested panels but no type tag.
fn decode_legacy_row(raw: &Value, index: usize) -> Option<Result<Entry, serde_json::Error>> {
    let object = raw.as_object()?;
    if object.contains_key("type") || !object.get("panels").is_some_and(Value::is_array) {
        return None;
    }

    Some(RowBody::deserialize(raw).map(|body| {
        let row = Row {
            id: object
                .get("id")
                .and_then(Value::as_i64)
                .unwrap_or(index as i64),
            title: object
                .get("title")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            visible: !body.is_collapsed(),
            grid_pos: GridPos::default(),
            panels: Vec::new(),
        };
        Entry::Row(row, body.panels.unwrap_or_default())
    }))
}

/// Parse raw panel/row entries into a flat panel list and a row list.
///
/// Malformed entries are skipped with a warning. Panels nested in a row are
/// recorded both in the row and in the flat list. All lists are stably sorted
/// by grid position (y, then x).
pub fn normalize(entries: &[Value], legacy: bool) -> Layout {
    let mut layout = Layout::default();
    let mut seen_ids = HashSet::new();

    for (index, raw) in entries.iter().enumerate() {
        let decoded = match legacy.then(|| decode_legacy_row(raw, index)).flatten() {
            Some(result) => result,
            None => decode_entry(raw),
        };

        let entry = match decoded {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(
                    "Skipping panel entry {}: {}. JSON: {}",
                    index,
                    e,
                    snippet(&raw.to_string(), RAW_SNIPPET_CHARS)
                );
                continue;
            }
        };

        match entry {
            Entry::Panel(panel) => {
                if seen_ids.insert(panel.id) {
                    layout.panels.push(panel);
                } else {
                    tracing::warn!("Skipping panel '{}': duplicate id {}", panel.title, panel.id);
                }
            }
            Entry::Row(mut row, nested) => {
                tracing::debug!("Processing row '{}' (id {})", row.title, row.id);
                for nested_raw in &nested {
                    match decode_entry(nested_raw) {
                        Ok(Entry::Panel(panel)) => {
                            if seen_ids.insert(panel.id) {
                                row.panels.push(panel.clone());
                                layout.panels.push(panel);
                            } else {
                                tracing::warn!(
                                    "Skipping panel '{}' in row {}: duplicate id {}",
                                    panel.title,
                                    row.id,
                                    panel.id
                                );
                            }
                        }
                        Ok(Entry::Row(inner, _)) => {
                            tracing::warn!("Skipping row {} nested inside row {}", inner.id, row.id);
                        }
                        Err(e) => {
                            tracing::warn!(
                                "Skipping nested panel in row {}: {}. JSON: {}",
                                row.id,
                                e,
                                snippet(&nested_raw.to_string(), RAW_SNIPPET_CHARS)
                            );
                        }
                    }
                }
                row.panels.sort_by_key(|p| p.grid_pos.reading_order());
                layout.rows.push(row);
            }
        }
    }

    layout.panels.sort_by_key(|p| p.grid_pos.reading_order());
    layout.rows.sort_by_key(|r| r.grid_pos.reading_order());

    tracing::debug!(
        "Normalized {} raw entries into {} panels and {} rows",
        entries.len(),
        layout.panels.len(),
        layout.rows.len()
    );
    layout
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn panel_json(id: i64, kind: &str, x: u32, y: u32) -> Value {
        json!({
            "id": id,
            "type": kind,
            "title": format!("Panel {}", id),
            "gridPos": { "x": x, "y": y, "w": 12, "h": 8 }
        })
    }

    fn ids(panels: &[Panel]) -> Vec<i64> {
        panels.iter().map(|p| p.id).collect()
    }

    #[test]
    fn test_flat_panels_sorted_by_y_then_x() {
        let entries = vec![
            panel_json(1, "graph", 12, 8),
            panel_json(2, "stat", 0, 8),
            panel_json(3, "table", 0, 0),
            panel_json(4, "graph", 12, 0),
        ];

        let layout = normalize(&entries, false);

        assert_eq!(ids(&layout.panels), vec![3, 4, 2, 1]);
        assert!(layout.rows.is_empty());
    }

    #[test]
    fn test_sort_is_stable_for_equal_positions() {
        let entries = vec![
            panel_json(7, "graph", 0, 0),
            panel_json(5, "graph", 0, 0),
            panel_json(6, "graph", 0, 0),
        ];

        let layout = normalize(&entries, false);

        assert_eq!(ids(&layout.panels), vec![7, 5, 6]);
    }

    #[test]
    fn test_rows_expand_into_both_views() {
        let entries = vec![
            json!({
                "id": 100,
                "type": "row",
                "title": "Second",
                "collapsed": true,
                "gridPos": { "x": 0, "y": 20, "w": 24, "h": 1 },
                "panels": [
                    panel_json(4, "graph", 12, 21),
                    panel_json(3, "graph", 0, 21)
                ]
            }),
            panel_json(1, "stat", 0, 0),
            json!({
                "id": 200,
                "type": "row",
                "title": "First",
                "gridPos": { "x": 0, "y": 9, "w": 24, "h": 1 },
                "panels": [panel_json(2, "table", 0, 10)]
            }),
        ];

        let layout = normalize(&entries, false);

        assert_eq!(ids(&layout.panels), vec![1, 2, 3, 4]);
        assert_eq!(layout.rows.len(), 2);
        assert_eq!(layout.rows[0].id, 200);
        assert!(layout.rows[0].visible);
        assert_eq!(ids(&layout.rows[0].panels), vec![2]);
        assert_eq!(layout.rows[1].id, 100);
        assert!(!layout.rows[1].visible);
        assert_eq!(ids(&layout.rows[1].panels), vec![3, 4]);
    }

    #[test]
    fn test_malformed_entries_are_skipped() {
        let entries = vec![
            json!("not a panel"),
            json!({ "type": "graph", "title": "no id" }),
            json!({ "id": "seven", "type": "graph" }),
            json!({ "id": 8 }),
            panel_json(1, "graph", 0, 0),
            json!({
                "id": 50,
                "type": "row",
                "title": "Mixed",
                "gridPos": { "x": 0, "y": 5, "w": 24, "h": 1 },
                "panels": [
                    { "id": 2, "type": "graph", "gridPos": { "x": 0, "y": 6, "w": 12, "h": 8 } },
                    { "title": "broken nested" },
                    { "id": 51, "type": "row", "panels": [] }
                ]
            }),
        ];

        let layout = normalize(&entries, false);

        assert_eq!(ids(&layout.panels), vec![1, 2]);
        assert_eq!(layout.rows.len(), 1);
        assert_eq!(ids(&layout.rows[0].panels), vec![2]);
        // Missing title defaults to empty
        assert_eq!(layout.rows[0].panels[0].title, "");
    }

    #[test]
    fn test_empty_row_is_kept() {
        let entries = vec![json!({
            "id": 9,
            "type": "row",
            "title": "Nothing here",
            "gridPos": { "x": 0, "y": 0, "w": 24, "h": 1 }
        })];

        let layout = normalize(&entries, false);

        assert!(layout.panels.is_empty());
        assert_eq!(layout.rows.len(), 1);
        assert_eq!(layout.rows[0].title, "Nothing here");
        assert!(layout.rows[0].panels.is_empty());
    }

    #[test]
    fn test_duplicate_ids_keep_first_occurrence() {
        let entries = vec![
            panel_json(1, "graph", 0, 0),
            json!({
                "id": 10,
                "type": "row",
                "gridPos": { "x": 0, "y": 8, "w": 24, "h": 1 },
                "panels": [panel_json(1, "table", 0, 9), panel_json(2, "table", 12, 9)]
            }),
        ];

        let layout = normalize(&entries, false);

        assert_eq!(ids(&layout.panels), vec![1, 2]);
        assert_eq!(layout.panels[0].kind, PanelKind::Graph);
        assert_eq!(ids(&layout.rows[0].panels), vec![2]);
    }

    #[test]
    fn test_legacy_rows_without_type_tag() {
        let entries = vec![
            json!({
                "title": "Legacy row",
                "collapse": true,
                "panels": [panel_json(1, "singlestat", 0, 0), panel_json(2, "graph", 0, 0)]
            }),
            json!({
                "title": "Another",
                "panels": [panel_json(3, "text", 0, 0)]
            }),
        ];

        let layout = normalize(&entries, true);

        assert_eq!(ids(&layout.panels), vec![1, 2, 3]);
        assert_eq!(layout.panels[0].kind, PanelKind::Stat);
        assert_eq!(layout.rows.len(), 2);
        assert_eq!(layout.rows[0].id, 0);
        assert!(!layout.rows[0].visible);
        assert_eq!(layout.rows[1].id, 1);
        assert!(layout.rows[1].visible);
    }

    #[test]
    fn test_unknown_kinds_are_preserved() {
        let entries = vec![panel_json(1, "timeseries", 0, 0)];

        let layout = normalize(&entries, false);

        assert_eq!(layout.panels[0].kind, PanelKind::Other("timeseries".to_string()));
        assert_eq!(layout.panels[0].kind.as_str(), "timeseries");
    }

    #[test]
    fn test_fractional_grid_positions_keep_the_panel() {
        let entries = vec![
            json!({ "id": 1, "type": "graph", "gridPos": { "x": 0, "y": 0.5, "w": 12, "h": 8 } }),
            json!({ "id": 2, "type": "stat", "gridPos": { "x": -4, "y": 0, "w": 6.2, "h": "4" } }),
        ];

        let layout = normalize(&entries, false);

        assert_eq!(ids(&layout.panels), vec![2, 1]);
        assert_eq!(layout.panels[0].grid_pos, GridPos::new(0, 0, 6, 4));
        assert_eq!(layout.panels[1].grid_pos, GridPos::new(0, 1, 12, 8));
    }

    #[test]
    fn test_duplicate_ids_resolved_in_payload_order() {
        // The later entry sorts first but the earlier one in the payload wins
        let entries = vec![panel_json(5, "graph", 0, 20), panel_json(5, "table", 0, 0)];

        let layout = normalize(&entries, false);

        assert_eq!(layout.panels.len(), 1);
        assert_eq!(layout.panels[0].kind, PanelKind::Graph);
        assert_eq!(layout.panels[0].grid_pos.y, 20);
    }
}
