// Grafana HTTP client - dashboard metadata and panel rendering
use crate::application::grafana_api::{GrafanaApi, GrafanaError};
use crate::domain::dashboard::{Dashboard, DashboardEnvelope, TimeRange};
use crate::domain::panel::{Panel, PanelKind};
use crate::domain::text::snippet;
use crate::infrastructure::config::GrafanaSettings;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{redirect, Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use std::time::Duration;

const DASHBOARD_BODY_SNIPPET: usize = 500;
const RENDER_BODY_SNIPPET: usize = 200;
const GRID_PIXELS_PER_UNIT: u32 = 40;
const USER_AGENT: &str = concat!("grafana-reporter/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiVersion {
    V4,
    #[default]
    V5,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the second attempt; grows linearly after that
    pub delay: Duration,
}

impl RetryPolicy {
    fn delay_before(&self, attempt: u32) -> Duration {
        self.delay * attempt.saturating_sub(1)
    }
}

/// Image size for a panel: derived from its grid size, or fixed per panel type.
pub fn panel_dimensions(panel: &Panel, fit_to_grid: bool) -> (u32, u32) {
    let grid = panel.grid_pos;
    if fit_to_grid && grid.w > 0 && grid.h > 0 {
        return (
            grid.w.saturating_mul(GRID_PIXELS_PER_UNIT),
            grid.h.saturating_mul(GRID_PIXELS_PER_UNIT),
        );
    }
    match panel.kind {
        PanelKind::Stat => (300, 150),
        PanelKind::Text => (1000, 100),
        _ => (1000, 500),
    }
}

/// Grafana uids are short alphanumeric strings; anything else is treated as a slug.
fn looks_like_uid(name: &str) -> bool {
    name.len() > 8 && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

#[derive(Debug, Clone)]
pub struct GrafanaClient {
    base_url: String,
    api_token: Option<String>,
    api_version: ApiVersion,
    theme: String,
    variables: Vec<(String, String)>,
    fit_to_grid: bool,
    retry: RetryPolicy,
    metadata_http: Client,
    render_http: Client,
}

impl GrafanaClient {
    pub fn new(settings: &GrafanaSettings) -> Result<Self, reqwest::Error> {
        let metadata_http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(settings.dashboard_timeout())
            .danger_accept_invalid_certs(!settings.ssl_check)
            .build()?;

        // A redirect from the render endpoint means the token was not accepted
        let render_http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(settings.render_timeout())
            .danger_accept_invalid_certs(!settings.ssl_check)
            .redirect(redirect::Policy::none())
            .build()?;

        Ok(Self {
            base_url: settings.url.trim_end_matches('/').to_string(),
            api_token: settings.api_token.clone().filter(|t| !t.is_empty()),
            api_version: settings.api_version,
            theme: settings.theme.clone(),
            variables: Vec::new(),
            fit_to_grid: false,
            retry: settings.retry_policy(),
            metadata_http,
            render_http,
        })
    }

    pub fn with_api_version(mut self, api_version: ApiVersion) -> Self {
        self.api_version = api_version;
        self
    }

    /// Replace the configured token when one is supplied
    pub fn with_api_token(mut self, api_token: Option<String>) -> Self {
        if let Some(token) = api_token.filter(|t| !t.is_empty()) {
            self.api_token = Some(token);
        }
        self
    }

    /// Template variable values forwarded to every render request
    pub fn with_variables(mut self, variables: Vec<(String, String)>) -> Self {
        self.variables = variables;
        self
    }

    pub fn with_fit_to_grid(mut self, fit_to_grid: bool) -> Self {
        self.fit_to_grid = fit_to_grid;
        self
    }

    fn dashboard_url(&self, name: &str) -> String {
        let encoded = urlencoding::encode(name);
        match self.api_version {
            ApiVersion::V5 if looks_like_uid(name) => {
                format!("{}/api/dashboards/uid/{}", self.base_url, encoded)
            }
            _ => format!("{}/api/dashboards/db/{}", self.base_url, encoded),
        }
    }

    fn render_url(&self, dashboard_uid: &str, params: &[(String, String)]) -> String {
        let query = params
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        let encoded = urlencoding::encode(dashboard_uid);
        match self.api_version {
            ApiVersion::V4 => format!(
                "{}/render/dashboard-solo/db/{}?{}",
                self.base_url, encoded, query
            ),
            ApiVersion::V5 => format!("{}/render/d-solo/{}?{}", self.base_url, encoded, query),
        }
    }

    fn render_params(&self, panel: &Panel, time_range: &TimeRange) -> Vec<(String, String)> {
        let (width, height) = panel_dimensions(panel, self.fit_to_grid);
        let mut params = vec![
            ("panelId".to_string(), panel.id.to_string()),
            ("width".to_string(), width.to_string()),
            ("height".to_string(), height.to_string()),
            ("tz".to_string(), "UTC".to_string()),
            ("from".to_string(), time_range.from.clone()),
            ("to".to_string(), time_range.to.clone()),
            ("theme".to_string(), self.theme.clone()),
        ];
        for (name, value) in &self.variables {
            let key = if name.starts_with("var-") {
                name.clone()
            } else {
                format!("var-{}", name)
            };
            params.push((key, value.clone()));
        }
        params
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Pick the uid used for render requests when the payload has none
    fn resolve_uid(requested: &str, envelope: &DashboardEnvelope) -> String {
        if !envelope.dashboard.uid.is_empty() {
            return envelope.dashboard.uid.clone();
        }
        if looks_like_uid(requested) {
            tracing::info!("Dashboard JSON has no uid, using requested '{}'", requested);
            return requested.to_string();
        }
        if !envelope.meta.slug.is_empty() {
            tracing::warn!(
                "Dashboard JSON has no uid and '{}' is not a uid, using slug '{}'",
                requested,
                envelope.meta.slug
            );
            return envelope.meta.slug.clone();
        }
        requested.to_string()
    }

    async fn render_with_retries(&self, url: &str, panel_id: i64) -> Result<Bytes, GrafanaError> {
        let target = format!("panel {}", panel_id);
        let mut last_status = None;
        let mut last_body = String::new();

        for attempt in 1..=self.retry.max_attempts {
            if attempt > 1 {
                let delay = self.retry.delay_before(attempt);
                tracing::info!(
                    "Retrying render for panel {} after {:?} (attempt {}/{})",
                    panel_id,
                    delay,
                    attempt,
                    self.retry.max_attempts
                );
                tokio::time::sleep(delay).await;
            }

            let response = match self.authorized(self.render_http.get(url)).send().await {
                Ok(response) => response,
                Err(e) => {
                    let kind = if e.is_timeout() { "Timeout" } else { "Error" };
                    tracing::warn!(
                        "{} rendering panel {} (attempt {}/{}): {}",
                        kind,
                        panel_id,
                        attempt,
                        self.retry.max_attempts,
                        e
                    );
                    last_status = None;
                    last_body = e.to_string();
                    continue;
                }
            };

            let status = response.status();
            if status.is_success() {
                match response.bytes().await {
                    Ok(bytes) => {
                        tracing::debug!("Rendered panel {} ({} bytes)", panel_id, bytes.len());
                        return Ok(bytes);
                    }
                    Err(e) => {
                        tracing::warn!("Error reading image body for panel {}: {}", panel_id, e);
                        last_status = Some(status.as_u16());
                        last_body = e.to_string();
                        continue;
                    }
                }
            }

            let body = snippet(
                &response.text().await.unwrap_or_default(),
                RENDER_BODY_SNIPPET,
            );
            tracing::warn!(
                "Render for panel {} failed (attempt {}/{}), status {}: {}",
                panel_id,
                attempt,
                self.retry.max_attempts,
                status,
                body
            );

            if status.is_redirection() {
                return Err(GrafanaError::Redirect {
                    target,
                    url: url.to_string(),
                });
            }
            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                return Err(GrafanaError::Unauthorized {
                    target,
                    status: status.as_u16(),
                    body,
                });
            }
            if status == StatusCode::NOT_FOUND {
                return Err(GrafanaError::NotFound {
                    target,
                    url: url.to_string(),
                });
            }
            if !status.is_server_error() {
                return Err(GrafanaError::Status {
                    target,
                    status: status.as_u16(),
                    body,
                });
            }

            last_status = Some(status.as_u16());
            last_body = body;
        }

        Err(GrafanaError::RetriesExhausted {
            panel_id,
            attempts: self.retry.max_attempts,
            last_status,
            body: last_body,
        })
    }
}

#[async_trait]
impl GrafanaApi for GrafanaClient {
    async fn get_dashboard(&self, name: &str) -> Result<Dashboard, GrafanaError> {
        let url = self.dashboard_url(name);
        let target = format!("dashboard '{}'", name);
        tracing::info!("Fetching dashboard definition from {}", url);

        let response = self
            .authorized(self.metadata_http.get(&url))
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|source| GrafanaError::Transport {
                target: target.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = snippet(
                &response.text().await.unwrap_or_default(),
                DASHBOARD_BODY_SNIPPET,
            );
            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                return Err(GrafanaError::Unauthorized {
                    target,
                    status: status.as_u16(),
                    body,
                });
            }
            return Err(GrafanaError::Status {
                target: format!("{} ({})", target, url),
                status: status.as_u16(),
                body,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|source| GrafanaError::Transport {
                target: target.clone(),
                source,
            })?;

        let mut envelope: DashboardEnvelope =
            serde_json::from_str(&body).map_err(|source| GrafanaError::Decode {
                url: url.clone(),
                source,
                body: snippet(&body, DASHBOARD_BODY_SNIPPET),
            })?;

        envelope.dashboard.uid = Self::resolve_uid(name, &envelope);
        tracing::info!(
            "Fetched dashboard '{}' (uid {})",
            envelope.dashboard.title,
            envelope.dashboard.uid
        );
        Ok(envelope.dashboard)
    }

    async fn get_panel_png(
        &self,
        panel: &Panel,
        dashboard_uid: &str,
        time_range: &TimeRange,
    ) -> Result<Bytes, GrafanaError> {
        if dashboard_uid.is_empty() {
            return Err(GrafanaError::MissingUid { panel_id: panel.id });
        }

        let params = self.render_params(panel, time_range);
        let url = self.render_url(dashboard_uid, &params);
        tracing::debug!("Requesting panel '{}' (id {}) from {}", panel.title, panel.id, url);

        self.render_with_retries(&url, panel.id).await
    }
}
