// TeX report templates rendered with minijinja
//
// Delimiters are `[[ expr ]]`, `[% block %]` and `[# comment #]` so they never
// collide with LaTeX braces or `%` comments.
use crate::domain::dashboard::LayoutMode;
use crate::domain::panel::{Panel, Row};
use crate::domain::text::snippet;
use crate::infrastructure::latex::escape_latex;
use crate::infrastructure::workspace::{relative_image_path, IMAGE_DIR, TEX_FILE};
use minijinja::syntax::SyntaxConfig;
use minijinja::Environment;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

const TEMPLATE_SAMPLE_CHARS: usize = 500;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("could not parse template '{name}': {source}\nTemplate sample:\n{sample}")]
    Parse {
        name: String,
        #[source]
        source: minijinja::Error,
        sample: String,
    },

    #[error("could not render template '{name}': {source}")]
    Render {
        name: String,
        #[source]
        source: minijinja::Error,
    },

    #[error("could not write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Data bound into the template
#[derive(Debug, Serialize)]
pub struct ReportView<'a> {
    pub title: &'a str,
    pub description: &'a str,
    pub from: String,
    pub to: String,
    pub variables: String,
    pub image_dir: &'static str,
    pub layout: &'static str,
    pub rows: &'a [Row],
    pub panels: &'a [Panel],
}

impl<'a> ReportView<'a> {
    pub fn new(
        title: &'a str,
        description: &'a str,
        from: String,
        to: String,
        variables: String,
        layout: LayoutMode,
        rows: &'a [Row],
        panels: &'a [Panel],
    ) -> Self {
        Self {
            title,
            description,
            from,
            to,
            variables,
            image_dir: IMAGE_DIR,
            layout: layout.as_str(),
            rows,
            panels,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TexTemplate {
    name: String,
    source: String,
}

impl TexTemplate {
    pub fn builtin(layout: LayoutMode) -> Self {
        let (name, source) = match layout {
            LayoutMode::Rows => ("builtin-rows.tex", ROWS_TEMPLATE),
            LayoutMode::Grid | LayoutMode::Sequential => ("builtin-grid.tex", GRID_TEMPLATE),
        };
        Self {
            name: name.to_string(),
            source: source.to_string(),
        }
    }

    pub fn from_source(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
        }
    }

    /// Read a custom template, falling back to the built-in one for `layout` if it cannot be read.
    pub fn load_or_builtin(path: Option<&Path>, layout: LayoutMode) -> Self {
        let Some(path) = path else {
            tracing::info!("Using built-in {} template", layout.as_str());
            return Self::builtin(layout);
        };

        match std::fs::read_to_string(path) {
            Ok(source) => {
                tracing::info!("Using custom template {}", path.display());
                Self::from_source(path.display().to_string(), source)
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to read custom template {}: {}. Falling back to built-in {} template",
                    path.display(),
                    e,
                    layout.as_str()
                );
                Self::builtin(layout)
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn render(&self, view: &ReportView<'_>) -> Result<String, TemplateError> {
        let parse_error = |source| TemplateError::Parse {
            name: self.name.clone(),
            source,
            sample: snippet(&self.source, TEMPLATE_SAMPLE_CHARS),
        };

        let env = environment().map_err(parse_error)?;
        let template = env
            .template_from_named_str(TEX_FILE, &self.source)
            .map_err(parse_error)?;

        template.render(view).map_err(|source| TemplateError::Render {
            name: self.name.clone(),
            source,
        })
    }

    /// Render and write the TeX source to `path`
    pub async fn write(&self, view: &ReportView<'_>, path: &Path) -> Result<(), TemplateError> {
        let rendered = self.render(view)?;
        tokio::fs::write(path, rendered)
            .await
            .map_err(|source| TemplateError::Write {
                path: path.to_path_buf(),
                source,
            })?;
        tracing::info!("Created TeX file {}", path.display());
        Ok(())
    }
}

fn environment<'source>() -> Result<Environment<'source>, minijinja::Error> {
    let mut env = Environment::new();
    env.set_syntax(
        SyntaxConfig::builder()
            .block_delimiters("[%", "%]")
            .variable_delimiters("[[", "]]")
            .comment_delimiters("[#", "#]")
            .build()?,
    );
    env.add_filter("escape_latex", |value: String| escape_latex(&value));
    env.add_function("panel_image_path", |panel_id: i64| relative_image_path(panel_id));
    Ok(env)
}

const GRID_TEMPLATE: &str = r#"
\documentclass{article}
\usepackage{graphicx}
\usepackage[margin=1in]{geometry}
\usepackage{fancyhdr}
\pagestyle{fancy}

\fancyhf{}
\fancyfoot[L]{[[ title | escape_latex ]]}
\fancyfoot[C]{Generated by Grafana Reporter}
\fancyfoot[R]{Page \thepage}
\renewcommand{\headrulewidth}{0pt}

\graphicspath{ {[[ image_dir ]]/} }

[# A panel whose image could not be downloaded renders as a framed placeholder #]
[% macro panel_image(panel, width) -%]
\IfFileExists{[[ panel_image_path(panel.id) ]]}{\includegraphics[width=[[ width ]]]{[[ panel_image_path(panel.id) ]]}}{\fbox{\parbox{[[ width ]]}{\centering Image unavailable: [[ panel.title | escape_latex ]]}}}
[%- endmacro %]

\begin{document}
\title{[[ title | escape_latex ]]}
\date{From: [[ from | escape_latex ]] To: [[ to | escape_latex ]]}
\author{Grafana Reporter}
\maketitle
\thispagestyle{fancy}

\begin{center}
[% if variables %]\large [[ variables | escape_latex ]] \par \vspace{2mm}[% endif %]
[% if description %]\small [[ description | escape_latex ]] \par \vspace{4mm}[% endif %]
\end{center}

\begin{center}
[% for panel in panels if panel.kind != "text" %]
[% if layout == "grid" %]
\begin{minipage}{[[ (panel.grid_pos.w * 0.04) | round(2) ]]\textwidth}
\centering
[[ panel_image(panel, "\\textwidth") ]]
\par {\small [[ panel.title | escape_latex ]]} \par
\end{minipage}
[% elif panel.kind == "stat" %]
\begin{minipage}{0.3\textwidth}
\centering
[[ panel_image(panel, "\\textwidth") ]]
\par {\small [[ panel.title | escape_latex ]]} \par
\end{minipage}
[% else %]
\par \vspace{0.5cm}
[[ panel_image(panel, "0.9\\textwidth") ]]
\par {\small [[ panel.title | escape_latex ]]} \par
\vspace{0.5cm}
[% endif %]
[% endfor %]
\end{center}

\end{document}
"#;

const ROWS_TEMPLATE: &str = r#"
\documentclass[landscape]{article}
\usepackage[utf8]{inputenc}
\usepackage{graphicx}
\usepackage[paperwidth=11in, paperheight=8.5in, margin=0.5in]{geometry}
\usepackage{fancyhdr}
\pagestyle{fancy}

\fancyhf{}
\fancyfoot[L]{[[ title | escape_latex ]]}
\fancyfoot[C]{Generated by Grafana Reporter}
\fancyfoot[R]{Page \thepage}
\renewcommand{\headrulewidth}{0pt}

\graphicspath{ {[[ image_dir ]]/} }

[% macro panel_image(panel, width) -%]
\IfFileExists{[[ panel_image_path(panel.id) ]]}{\includegraphics[width=[[ width ]], keepaspectratio]{[[ panel_image_path(panel.id) ]]}}{\fbox{\parbox{[[ width ]]}{\centering Image unavailable: [[ panel.title | escape_latex ]]}}}
[%- endmacro %]

\begin{document}
\title{[[ title | escape_latex ]]}
\date{Time Range: [[ from | escape_latex ]] to [[ to | escape_latex ]]}
\author{Grafana Reporter}
\maketitle
\thispagestyle{fancy}

\begin{center}
[% if variables %]\large [[ variables | escape_latex ]] \par \vspace{2mm}[% endif %]
[% if description %]\small [[ description | escape_latex ]] \par \vspace{4mm}[% endif %]
\end{center}

\begin{center}
\large{The following pages contain the rows of the dashboard}
\end{center}

[% for row in rows %]
\newpage
\thispagestyle{fancy}
\begin{center}
[% if row.visible %]\Large\textbf{[[ row.title | escape_latex ]]}[% else %]\large [[ row.title | escape_latex ]] (collapsed)[% endif %]
\vspace{0.5cm}
\end{center}

\begin{center}
[% for panel in row.panels if panel.kind != "text" %]
\par
[[ panel_image(panel, "0.9\\textwidth") ]]
\par {\small [[ panel.title | escape_latex ]]} \par
\vspace{0.5cm}
[% endfor %]
\end{center}
[% endfor %]

\end{document}
"#;
