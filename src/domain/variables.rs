// Dashboard template variables and their human-readable summary
use crate::domain::lenient::null_as_default;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

const ALL_VALUE: &str = "$__all";

/// How much of a variable the dashboard shows (`hide` 0/1/2)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "u8")]
pub enum Visibility {
    #[default]
    Visible,
    LabelOnly,
    Hidden,
}

impl From<u8> for Visibility {
    fn from(hide: u8) -> Self {
        match hide {
            0 => Visibility::Visible,
            1 => Visibility::LabelOnly,
            _ => Visibility::Hidden,
        }
    }
}

/// A selected value: either one string or a list of them
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Selection {
    Single(String),
    Multiple(Vec<String>),
    Other(Value),
}

impl Default for Selection {
    fn default() -> Self {
        Selection::Single(String::new())
    }
}

impl Selection {
    pub fn values(&self) -> Vec<String> {
        match self {
            Selection::Single(s) if s.is_empty() => Vec::new(),
            Selection::Single(s) => vec![s.clone()],
            Selection::Multiple(values) => values.clone(),
            Selection::Other(Value::Null) => Vec::new(),
            Selection::Other(Value::Array(items)) => items.iter().map(display_value).collect(),
            Selection::Other(other) => vec![display_value(other)],
        }
    }

    fn is_all(&self) -> bool {
        self.values().iter().any(|v| v == ALL_VALUE)
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CurrentSelection {
    #[serde(default)]
    pub text: Selection,
    #[serde(default)]
    pub value: Selection,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VariableOption {
    #[serde(default)]
    pub text: Selection,
    #[serde(default)]
    pub value: Selection,
    #[serde(default, deserialize_with = "null_as_default")]
    pub selected: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TemplateVariable {
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub hide: Visibility,
    #[serde(default, deserialize_with = "null_as_default")]
    pub multi: bool,
    #[serde(default, rename = "includeAll", deserialize_with = "null_as_default")]
    pub include_all: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub current: CurrentSelection,
    #[serde(default, deserialize_with = "null_as_default")]
    pub options: Vec<VariableOption>,
}

impl TemplateVariable {
    pub fn display_name(&self) -> &str {
        match self.label.as_deref() {
            Some(label) if !label.is_empty() => label,
            _ => &self.name,
        }
    }

    /// Text describing the current selection, empty when nothing is selected
    pub fn current_text(&self) -> String {
        let texts = self.current.text.values();
        if !texts.is_empty() {
            if self.include_all && self.current.value.is_all() {
                return "All".to_string();
            }
            return texts.join(", ");
        }

        if self.include_all && self.current.value.is_all() {
            return "All".to_string();
        }
        match &self.current.value {
            Selection::Single(raw) if self.multi && raw.starts_with('[') && raw.ends_with(']') => {
                // Multi-value selections are sometimes stored as a JSON array string
                raw[1..raw.len() - 1].replace("\",\"", ", ").replace('"', "")
            }
            Selection::Single(raw) if raw.is_empty() => self.selected_options(),
            other => other.values().join(", "),
        }
    }

    fn selected_options(&self) -> String {
        self.options
            .iter()
            .filter(|o| o.selected)
            .flat_map(|o| {
                let texts = o.text.values();
                if texts.is_empty() { o.value.values() } else { texts }
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Decode the `templating.list` array one variable at a time, skipping any that are malformed.
pub fn deserialize_variables<'de, D>(deserializer: D) -> Result<Vec<TemplateVariable>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(raw
        .into_iter()
        .filter_map(|value| match TemplateVariable::deserialize(&value) {
            Ok(variable) => Some(variable),
            Err(e) => {
                tracing::warn!("Skipping malformed template variable: {}", e);
                None
            }
        })
        .collect())
}

/// Summarize variables as `label: value; label; ...`, omitting hidden ones.
pub fn summarize(variables: &[TemplateVariable]) -> String {
    variables
        .iter()
        .filter(|v| v.hide != Visibility::Hidden)
        .map(|v| {
            let value = match v.hide {
                Visibility::LabelOnly => String::new(),
                _ => v.current_text(),
            };
            if value.is_empty() {
                v.display_name().to_string()
            } else {
                format!("{}: {}", v.display_name(), value)
            }
        })
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn variable(value: Value) -> TemplateVariable {
        serde_json::from_value(value).expect("valid variable")
    }

    #[test]
    fn test_summary_formats_each_visibility() {
        let variables = vec![
            variable(json!({
                "name": "host",
                "label": "Host",
                "current": { "text": "reef", "value": "reef" }
            })),
            variable(json!({
                "name": "region",
                "hide": 1,
                "current": { "text": "eu", "value": "eu" }
            })),
            variable(json!({
                "name": "secret",
                "hide": 2,
                "current": { "text": "x", "value": "x" }
            })),
        ];

        assert_eq!(summarize(&variables), "Host: reef; region");
    }

    #[test]
    fn test_multi_value_text_list() {
        let v = variable(json!({
            "name": "probe",
            "multi": true,
            "current": { "text": ["temp", "ph"], "value": ["temp", "ph"] }
        }));

        assert_eq!(v.current_text(), "temp, ph");
    }

    #[test]
    fn test_include_all_selection() {
        let v = variable(json!({
            "name": "probe",
            "multi": true,
            "includeAll": true,
            "current": { "text": ["All"], "value": ["$__all"] }
        }));

        assert_eq!(v.current_text(), "All");
    }

    #[test]
    fn test_value_fallback_when_text_missing() {
        let v = variable(json!({
            "name": "probe",
            "multi": true,
            "current": { "value": "[\"temp\",\"ph\"]" }
        }));

        assert_eq!(v.current_text(), "temp, ph");

        let single = variable(json!({ "name": "env", "current": { "value": "prod" } }));
        assert_eq!(single.current_text(), "prod");
    }

    #[test]
    fn test_selected_options_when_current_is_empty() {
        let v = variable(json!({
            "name": "tank",
            "current": {},
            "options": [
                { "text": "Reef", "value": "reef", "selected": true },
                { "text": "Planet", "value": "planet", "selected": false }
            ]
        }));

        assert_eq!(v.current_text(), "Reef");
    }

    #[test]
    fn test_empty_label_falls_back_to_name() {
        let v = variable(json!({ "name": "env", "label": "", "current": {} }));

        assert_eq!(summarize(&[v]), "env");
    }

    #[test]
    fn test_malformed_variables_are_skipped() {
        #[derive(Deserialize)]
        struct Templating {
            #[serde(deserialize_with = "deserialize_variables")]
            list: Vec<TemplateVariable>,
        }

        let templating: Templating = serde_json::from_value(json!({
            "list": [{ "label": "no name" }, { "name": "ok" }]
        }))
        .unwrap();

        assert_eq!(templating.list.len(), 1);
        assert_eq!(templating.list[0].name, "ok");
    }

    #[test]
    fn test_null_fields_keep_the_variable() {
        let v = variable(json!({
            "name": "tank",
            "hide": null,
            "multi": null,
            "includeAll": null,
            "current": null,
            "options": null
        }));

        assert_eq!(v.hide, Visibility::Visible);
        assert!(v.options.is_empty());
        assert_eq!(summarize(&[v]), "tank");
    }
}
