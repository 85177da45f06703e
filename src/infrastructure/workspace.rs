// Per-report scratch directory holding images, TeX source, compiler log and PDF
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

pub const IMAGE_DIR: &str = "images";
pub const TEX_FILE: &str = "report.tex";
pub const PDF_FILE: &str = "report.pdf";
pub const LOG_FILE: &str = "pdflatex.log";

#[derive(Debug, Error)]
#[error("could not create workspace directory {path}: {source}")]
pub struct WorkspaceError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Image path relative to the workspace root, as referenced from the TeX source
pub fn relative_image_path(panel_id: i64) -> String {
    format!("{}/image{}.png", IMAGE_DIR, panel_id)
}

#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Create `<base>/<uuid>/images`; the uuid keeps concurrent reports apart.
    pub fn create(base: &Path) -> Result<Self, WorkspaceError> {
        let workspace = Self {
            root: base.join(Uuid::new_v4().to_string()),
        };
        let images = workspace.image_dir();
        std::fs::create_dir_all(&images).map_err(|source| WorkspaceError {
            path: images,
            source,
        })?;
        tracing::debug!("Created report workspace {}", workspace.root.display());
        Ok(workspace)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn image_dir(&self) -> PathBuf {
        self.root.join(IMAGE_DIR)
    }

    pub fn image_path(&self, panel_id: i64) -> PathBuf {
        self.root.join(relative_image_path(panel_id))
    }

    pub fn tex_path(&self) -> PathBuf {
        self.root.join(TEX_FILE)
    }

    pub fn pdf_path(&self) -> PathBuf {
        self.root.join(PDF_FILE)
    }

    pub fn log_path(&self) -> PathBuf {
        self.root.join(LOG_FILE)
    }

    /// Delete the workspace; returns `false` when it was already gone.
    pub fn remove(&self) -> io::Result<bool> {
        match std::fs::remove_dir_all(&self.root) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}
