// Dashboard service port - what the report pipeline needs from Grafana
use crate::domain::dashboard::{Dashboard, TimeRange};
use crate::domain::panel::Panel;
use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GrafanaError {
    #[error("request for {target} failed: {source}")]
    Transport {
        target: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("authorization failed for {target} (status {status}), check API token permissions: {body}")]
    Unauthorized {
        target: String,
        status: u16,
        body: String,
    },

    #[error("{target} not found (404), check the dashboard uid/slug and panel id. URL: {url}")]
    NotFound { target: String, url: String },

    #[error("{target} returned status {status}: {body}")]
    Status {
        target: String,
        status: u16,
        body: String,
    },

    #[error("redirect detected for {target} (possible auth/token issue). URL: {url}")]
    Redirect { target: String, url: String },

    #[error("could not decode dashboard JSON from {url}: {source}. Body: {body}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
        body: String,
    },

    #[error("cannot render panel {panel_id}: dashboard uid is empty")]
    MissingUid { panel_id: i64 },

    #[error("rendering panel {panel_id} failed after {attempts} attempts, last status {}: {body}", .last_status.map(|s| s.to_string()).unwrap_or_else(|| "none".to_string()))]
    RetriesExhausted {
        panel_id: i64,
        attempts: u32,
        last_status: Option<u16>,
        body: String,
    },
}

impl GrafanaError {
    /// Auth failures are never retried and callers may want to stop early on them
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            GrafanaError::Unauthorized { .. } | GrafanaError::Redirect { .. }
        )
    }
}

#[async_trait]
pub trait GrafanaApi: Send + Sync {
    /// Fetch the dashboard definition; the returned uid is never empty
    async fn get_dashboard(&self, name: &str) -> Result<Dashboard, GrafanaError>;

    /// Render one panel as PNG bytes, retrying transient failures
    async fn get_panel_png(
        &self,
        panel: &Panel,
        dashboard_uid: &str,
        time_range: &TimeRange,
    ) -> Result<Bytes, GrafanaError>;
}
