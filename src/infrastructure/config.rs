use crate::domain::dashboard::LayoutMode;
use crate::infrastructure::grafana_client::{ApiVersion, RetryPolicy};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_CONFIG_FILE: &str = "config/reporter";
const ENV_PREFIX: &str = "REPORTER";

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Settings {
    pub grafana: GrafanaSettings,
    pub report: ReportSettings,
    pub server: ServerSettings,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GrafanaSettings {
    pub url: String,
    pub api_token: Option<String>,
    pub api_version: ApiVersion,
    pub ssl_check: bool,
    pub theme: String,
    pub dashboard_timeout_secs: u64,
    pub render_timeout_secs: u64,
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for GrafanaSettings {
    fn default() -> Self {
        Self {
            url: "http://localhost:3000".to_string(),
            api_token: None,
            api_version: ApiVersion::V5,
            ssl_check: true,
            theme: "light".to_string(),
            dashboard_timeout_secs: 30,
            render_timeout_secs: 180,
            max_attempts: 3,
            retry_delay_ms: 2000,
        }
    }
}

impl GrafanaSettings {
    pub fn dashboard_timeout(&self) -> Duration {
        Duration::from_secs(self.dashboard_timeout_secs)
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_secs(self.render_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            delay: Duration::from_millis(self.retry_delay_ms),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ReportSettings {
    pub layout: LayoutMode,
    pub templates_dir: PathBuf,
    pub workspace_root: PathBuf,
    pub compiler: CompilerSettings,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            layout: LayoutMode::default(),
            templates_dir: PathBuf::from("templates"),
            workspace_root: std::env::temp_dir().join("reporter"),
            compiler: CompilerSettings::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CompilerSettings {
    pub program: String,
    pub args: Vec<String>,
}

impl Default for CompilerSettings {
    fn default() -> Self {
        Self {
            program: "pdflatex".to_string(),
            args: vec![
                "-interaction=nonstopmode".to_string(),
                "-halt-on-error".to_string(),
            ],
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerSettings {
    pub listen: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8686".to_string(),
        }
    }
}

/// Load settings from the optional config file, then `REPORTER__SECTION__KEY` environment overrides.
pub fn load_settings(path: Option<&Path>) -> anyhow::Result<Settings> {
    let file = match path {
        Some(path) => config::File::from(path).required(true),
        None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
    };

    let settings = config::Config::builder()
        .add_source(file)
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    Ok(settings.try_deserialize()?)
}
