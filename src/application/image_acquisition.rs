// Image acquisition - concurrent panel downloads that tolerate partial failure
use crate::application::grafana_api::{GrafanaApi, GrafanaError};
use crate::domain::dashboard::TimeRange;
use crate::domain::panel::Panel;
use crate::infrastructure::workspace::{Workspace, WorkspaceError};
use futures::future::join_all;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error(transparent)]
    Grafana(#[from] GrafanaError),

    #[error("could not write image file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("download task aborted: {0}")]
    Aborted(String),
}

#[derive(Debug)]
pub struct PanelFailure {
    pub panel_id: i64,
    pub title: String,
    pub error: DownloadError,
}

#[derive(Debug, Default)]
pub struct AcquisitionSummary {
    pub downloaded: Vec<i64>,
    /// Text panels, never rendered as images
    pub skipped: Vec<i64>,
    pub failures: Vec<PanelFailure>,
}

impl AcquisitionSummary {
    pub fn failed_ids(&self) -> Vec<i64> {
        self.failures.iter().map(|f| f.panel_id).collect()
    }

    pub fn auth_failures(&self) -> usize {
        self.failures
            .iter()
            .filter(|f| matches!(&f.error, DownloadError::Grafana(e) if e.is_auth()))
            .count()
    }

    fn log(&self) {
        if self.failures.is_empty() {
            tracing::info!(
                "Finished downloading {} images ({} text panels skipped)",
                self.downloaded.len(),
                self.skipped.len()
            );
            return;
        }

        let details = self
            .failures
            .iter()
            .map(|f| format!("panel {} ('{}'): {}", f.panel_id, f.title, f.error))
            .collect::<Vec<_>>()
            .join("\n- ");
        tracing::warn!(
            "Finished downloading images with {} error(s) for panels {:?}, report generation continues:\n- {}",
            self.failures.len(),
            self.failed_ids(),
            details
        );
        let auth = self.auth_failures();
        if auth > 0 {
            tracing::warn!("{} panel(s) failed authorization, check the API token", auth);
        }
    }
}

#[derive(Clone)]
pub struct ImageAcquisition {
    client: Arc<dyn GrafanaApi>,
}

impl ImageAcquisition {
    pub fn new(client: Arc<dyn GrafanaApi>) -> Self {
        Self { client }
    }

    /// Download every non-text panel into the workspace image directory.
    ///
    /// All downloads run concurrently and are joined before returning. Individual
    /// failures are collected into the summary; only a missing image directory
    /// that cannot be created is an error.
    pub async fn acquire(
        &self,
        panels: &[Panel],
        dashboard_uid: &str,
        time_range: &TimeRange,
        workspace: &Workspace,
    ) -> Result<AcquisitionSummary, WorkspaceError> {
        let image_dir = workspace.image_dir();
        tokio::fs::create_dir_all(&image_dir)
            .await
            .map_err(|source| WorkspaceError {
                path: image_dir,
                source,
            })?;

        let mut summary = AcquisitionSummary::default();
        let (failure_tx, mut failure_rx) = mpsc::unbounded_channel::<PanelFailure>();
        let mut scheduled = Vec::new();
        let mut handles = Vec::new();

        for panel in panels {
            if panel.is_text() {
                tracing::info!("Skipping image download for text panel {} ('{}')", panel.id, panel.title);
                summary.skipped.push(panel.id);
                continue;
            }

            let client = self.client.clone();
            let failure_tx = failure_tx.clone();
            let panel = panel.clone();
            let dashboard_uid = dashboard_uid.to_string();
            let time_range = time_range.clone();
            let path = workspace.image_path(panel.id);

            scheduled.push((panel.id, panel.title.clone()));
            handles.push(tokio::spawn(async move {
                tracing::debug!("Downloading panel {} to {}", panel.id, path.display());
                match download(client.as_ref(), &panel, &dashboard_uid, &time_range, &path).await {
                    Ok(()) => true,
                    Err(error) => {
                        tracing::warn!(
                            "Failed to download image for panel {} ('{}'): {}",
                            panel.id,
                            panel.title,
                            error
                        );
                        let _ = failure_tx.send(PanelFailure {
                            panel_id: panel.id,
                            title: panel.title,
                            error,
                        });
                        false
                    }
                }
            }));
        }
        drop(failure_tx);

        tracing::info!("Scheduled {} panel image downloads", handles.len());
        let results = join_all(handles).await;

        for ((panel_id, title), result) in scheduled.into_iter().zip(results) {
            match result {
                Ok(true) => summary.downloaded.push(panel_id),
                Ok(false) => {}
                Err(join_error) => summary.failures.push(PanelFailure {
                    panel_id,
                    title,
                    error: DownloadError::Aborted(join_error.to_string()),
                }),
            }
        }
        while let Some(failure) = failure_rx.recv().await {
            summary.failures.push(failure);
        }

        summary.log();
        Ok(summary)
    }
}

async fn download(
    client: &dyn GrafanaApi,
    panel: &Panel,
    dashboard_uid: &str,
    time_range: &TimeRange,
    path: &Path,
) -> Result<(), DownloadError> {
    let bytes = client.get_panel_png(panel, dashboard_uid, time_range).await?;

    if let Err(source) = tokio::fs::write(path, &bytes).await {
        let _ = tokio::fs::remove_file(path).await;
        return Err(DownloadError::Write {
            path: path.to_path_buf(),
            source,
        });
    }
    Ok(())
}
