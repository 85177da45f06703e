// Report service - builds one Report per request from shared configuration
use crate::application::report::{Report, ReportError, ReportOptions};
use crate::domain::dashboard::{LayoutMode, TimeRange};
use crate::infrastructure::config::{ReportSettings, Settings};
use crate::infrastructure::grafana_client::{ApiVersion, GrafanaClient};
use crate::infrastructure::latex::LatexCompiler;
use std::path::PathBuf;
use std::sync::Arc;

/// Per-request parameters layered over the configured defaults
#[derive(Debug, Clone, Default)]
pub struct ReportRequest {
    pub dashboard: String,
    pub time_range: Option<TimeRange>,
    pub api_token: Option<String>,
    pub api_version: Option<ApiVersion>,
    pub variables: Vec<(String, String)>,
    pub layout: Option<LayoutMode>,
    pub template: Option<PathBuf>,
}

#[derive(Clone)]
pub struct ReportService {
    client: GrafanaClient,
    compiler: LatexCompiler,
    settings: ReportSettings,
}

impl ReportService {
    pub fn new(settings: &Settings) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: GrafanaClient::new(&settings.grafana)?,
            compiler: LatexCompiler::new(&settings.report.compiler),
            settings: settings.report.clone(),
        })
    }

    /// Path of `<templates_dir>/<name>.tex`; names that would leave the directory are refused.
    pub fn named_template(&self, name: &str) -> Option<PathBuf> {
        if name.is_empty() || name.contains(['/', '\\']) || name.contains("..") {
            tracing::warn!("Ignoring invalid template name '{}'", name);
            return None;
        }
        Some(self.settings.templates_dir.join(format!("{}.tex", name)))
    }

    pub fn create_report(&self, request: ReportRequest) -> Result<Report, ReportError> {
        let layout = request.layout.unwrap_or(self.settings.layout);
        let mut client = self
            .client
            .clone()
            .with_api_token(request.api_token)
            .with_variables(request.variables)
            .with_fit_to_grid(layout.fits_to_grid());
        if let Some(api_version) = request.api_version {
            client = client.with_api_version(api_version);
        }

        let options = ReportOptions {
            dashboard: request.dashboard,
            time_range: request.time_range,
            layout,
            template: request.template,
        };
        let report = Report::new(
            Arc::new(client),
            self.compiler.clone(),
            options,
            &self.settings.workspace_root,
        )?;
        Ok(report)
    }
}
