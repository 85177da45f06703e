// HTTP request handlers
use crate::application::report::Report;
use crate::application::report_service::ReportRequest;
use crate::domain::dashboard::TimeRange;
use crate::infrastructure::grafana_client::ApiVersion;
use crate::infrastructure::http_response::pdf_response;
use crate::presentation::app_state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::sync::Arc;

const VARIABLE_PREFIX: &str = "var-";

/// Report query string. `var-<name>` may repeat, so it is parsed from raw pairs.
#[derive(Debug, Default, PartialEq)]
pub struct ReportQuery {
    pub from: Option<String>,
    pub to: Option<String>,
    pub api_token: Option<String>,
    pub template: Option<String>,
    pub variables: Vec<(String, String)>,
}

impl ReportQuery {
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let mut query = Self::default();
        for (key, value) in pairs {
            match key.as_str() {
                "from" => query.from = Some(value),
                "to" => query.to = Some(value),
                "apitoken" => query.api_token = Some(value),
                "template" => query.template = Some(value),
                _ => match key.strip_prefix(VARIABLE_PREFIX) {
                    Some(name) if !name.is_empty() => {
                        query.variables.push((name.to_string(), value))
                    }
                    _ => tracing::debug!("Ignoring query parameter '{}'", key),
                },
            }
        }
        query
    }

    fn time_range(&self) -> TimeRange {
        let default = TimeRange::default();
        TimeRange::new(
            self.from.clone().unwrap_or(default.from),
            self.to.clone().unwrap_or(default.to),
        )
    }
}

pub fn routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(health_check))
        .route("/api/v5/report/:dashboard", get(report_v5))
        .route("/api/report/:dashboard", get(report_v4))
        .with_state(state)
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

/// Report for a Grafana v5+ dashboard, addressed by uid or slug
pub async fn report_v5(
    Path(dashboard): Path<String>,
    Query(pairs): Query<Vec<(String, String)>>,
    State(state): State<Arc<AppState>>,
) -> Response {
    generate_report(&state, dashboard, ReportQuery::from_pairs(pairs), ApiVersion::V5).await
}

/// Report for a Grafana v4 dashboard, addressed by slug
pub async fn report_v4(
    Path(dashboard): Path<String>,
    Query(pairs): Query<Vec<(String, String)>>,
    State(state): State<Arc<AppState>>,
) -> Response {
    generate_report(&state, dashboard, ReportQuery::from_pairs(pairs), ApiVersion::V4).await
}

async fn generate_report(
    state: &AppState,
    dashboard: String,
    query: ReportQuery,
    api_version: ApiVersion,
) -> Response {
    tracing::info!("Report requested for dashboard '{}' ({:?})", dashboard, api_version);
    let service = &state.report_service;
    let request = ReportRequest {
        dashboard,
        time_range: Some(query.time_range()),
        template: query
            .template
            .as_deref()
            .and_then(|name| service.named_template(name)),
        api_token: query.api_token,
        api_version: Some(api_version),
        variables: query.variables,
        layout: None,
    };

    let mut report = match service.create_report(request) {
        Ok(report) => report,
        Err(e) => return error_response(&e),
    };

    match report.generate().await {
        Ok(file) => {
            let title = report.title().to_string();
            match pdf_response(file, &title, move || clean_in_background(report)) {
                Ok(response) => response,
                Err(status) => status.into_response(),
            }
        }
        Err(e) => error_response(&e),
    }
}

/// Remove the workspace on the blocking pool when a runtime is available.
fn clean_in_background(report: Report) {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn_blocking(move || report.clean());
        }
        Err(_) => report.clean(),
    }
}

fn error_response(error: &dyn std::error::Error) -> Response {
    tracing::error!("Error generating report: {}", error);
    (StatusCode::INTERNAL_SERVER_ERROR, error.to_string()).into_response()
}
