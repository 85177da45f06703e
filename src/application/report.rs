// Report assembly - fetch, download, render, compile and expose one PDF report
use crate::application::grafana_api::{GrafanaApi, GrafanaError};
use crate::application::image_acquisition::ImageAcquisition;
use crate::domain::dashboard::{LayoutMode, TimeRange};
use crate::infrastructure::latex::{CompileError, LatexCompiler};
use crate::infrastructure::tex_template::{ReportView, TemplateError, TexTemplate};
use crate::infrastructure::workspace::{Workspace, WorkspaceError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportState {
    Created,
    DashboardFetched,
    ImagesAcquired,
    TemplateRendered,
    Compiled,
    Exposed,
    Failed,
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    #[error("error obtaining dashboard '{dashboard}': {source}")]
    Dashboard {
        dashboard: String,
        #[source]
        source: GrafanaError,
    },

    #[error("error preparing images: {source}")]
    Acquisition {
        #[source]
        source: WorkspaceError,
    },

    #[error("error generating TeX file in {}: {source}", .workspace.display())]
    Template {
        workspace: PathBuf,
        #[source]
        source: TemplateError,
    },

    #[error("error compiling PDF: {0}")]
    Compile(#[from] CompileError),

    #[error("error opening PDF {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("report has already been generated")]
    AlreadyGenerated,
}

/// What to render, fixed at construction
#[derive(Debug, Clone, Default)]
pub struct ReportOptions {
    pub dashboard: String,
    /// Falls back to the dashboard's own default range
    pub time_range: Option<TimeRange>,
    pub layout: LayoutMode,
    pub template: Option<PathBuf>,
}

pub struct Report {
    client: Arc<dyn GrafanaApi>,
    compiler: LatexCompiler,
    options: ReportOptions,
    workspace: Workspace,
    state: ReportState,
    title: String,
}

impl Report {
    /// Creates the report's workspace under `workspace_root`.
    pub fn new(
        client: Arc<dyn GrafanaApi>,
        compiler: LatexCompiler,
        options: ReportOptions,
        workspace_root: &Path,
    ) -> Result<Self, WorkspaceError> {
        let workspace = Workspace::create(workspace_root)?;
        tracing::info!(
            "Report for dashboard '{}' uses workspace {}",
            options.dashboard,
            workspace.root().display()
        );
        Ok(Self {
            client,
            compiler,
            options,
            workspace,
            state: ReportState::Created,
            title: String::new(),
        })
    }

    /// Dashboard title, empty until the dashboard has been fetched
    pub fn title(&self) -> &str {
        &self.title
    }

    #[cfg(test)]
    pub fn state(&self) -> ReportState {
        self.state
    }

    #[cfg(test)]
    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Run the whole pipeline and return the opened PDF.
    ///
    /// Any failure removes the workspace before the error is returned. On
    /// success the workspace stays until the caller has read the PDF and
    /// calls [`Report::clean`].
    pub async fn generate(&mut self) -> Result<tokio::fs::File, ReportError> {
        if self.state != ReportState::Created {
            return Err(ReportError::AlreadyGenerated);
        }

        match self.run().await {
            Ok(pdf) => {
                self.state = ReportState::Exposed;
                Ok(pdf)
            }
            Err(e) => {
                tracing::error!(
                    "Report for dashboard '{}' failed after {:?}: {}",
                    self.options.dashboard,
                    self.state,
                    e
                );
                self.state = ReportState::Failed;
                self.clean();
                Err(e)
            }
        }
    }

    async fn run(&mut self) -> Result<tokio::fs::File, ReportError> {
        let dashboard = self
            .client
            .get_dashboard(&self.options.dashboard)
            .await
            .map_err(|source| ReportError::Dashboard {
                dashboard: self.options.dashboard.clone(),
                source,
            })?;
        self.title = dashboard.title.clone();
        let uid = if dashboard.uid.is_empty() {
            self.options.dashboard.clone()
        } else {
            dashboard.uid.clone()
        };
        self.state = ReportState::DashboardFetched;
        tracing::info!("Fetched dashboard '{}' (uid {})", self.title, uid);

        let layout = self.options.layout;
        let time_range = self
            .options
            .time_range
            .clone()
            .unwrap_or_else(|| dashboard.time.clone());
        let panels = dashboard.panels_for(layout);
        ImageAcquisition::new(self.client.clone())
            .acquire(&panels, &uid, &time_range, &self.workspace)
            .await
            .map_err(|source| ReportError::Acquisition { source })?;
        self.state = ReportState::ImagesAcquired;

        let template = TexTemplate::load_or_builtin(self.options.template.as_deref(), layout);
        tracing::debug!("Rendering template {}", template.name());
        let view = ReportView::new(
            &dashboard.title,
            &dashboard.description,
            time_range.formatted_from(),
            time_range.formatted_to(),
            dashboard.variable_summary(),
            layout,
            dashboard.rows(),
            dashboard.grid_panels(),
        );
        template
            .write(&view, &self.workspace.tex_path())
            .await
            .map_err(|source| ReportError::Template {
                workspace: self.workspace.root().to_path_buf(),
                source,
            })?;
        self.state = ReportState::TemplateRendered;

        if image_dir_is_empty(&self.workspace).await {
            tracing::warn!(
                "No images in {} before compiling, the PDF will only contain placeholders",
                self.workspace.image_dir().display()
            );
        }
        self.compiler.compile(&self.workspace).await?;
        self.state = ReportState::Compiled;

        let pdf = self.compiler.verify_output(&self.workspace).await?;
        let file = tokio::fs::File::open(&pdf)
            .await
            .map_err(|source| ReportError::Open { path: pdf.clone(), source })?;
        tracing::info!("Report '{}' ready at {}", self.title, pdf.display());
        Ok(file)
    }

    /// Remove the workspace. Safe to call repeatedly; failures are only logged.
    pub fn clean(&self) {
        match self.workspace.remove() {
            Ok(true) => tracing::info!("Removed workspace {}", self.workspace.root().display()),
            Ok(false) => {
                tracing::debug!("Workspace {} already removed", self.workspace.root().display())
            }
            Err(e) => tracing::warn!(
                "Error removing workspace {}: {}",
                self.workspace.root().display(),
                e
            ),
        }
    }
}

async fn image_dir_is_empty(workspace: &Workspace) -> bool {
    match tokio::fs::read_dir(workspace.image_dir()).await {
        Ok(mut entries) => matches!(entries.next_entry().await, Ok(None)),
        Err(_) => true,
    }
}
