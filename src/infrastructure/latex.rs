// pdflatex invocation and LaTeX text escaping
use crate::domain::text::tail;
use crate::infrastructure::config::CompilerSettings;
use crate::infrastructure::workspace::{Workspace, TEX_FILE};
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;

/// Cross-references and the table of contents settle after the second run
const PASSES: u8 = 2;
const LOG_TAIL_CHARS: usize = 2000;

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("could not start {program} (pass {pass}): {source}")]
    Spawn {
        program: String,
        pass: u8,
        #[source]
        source: io::Error,
    },

    #[error("{program} failed on pass {pass} ({status}). Output logged to {}\n-- compiler output --\n{tail}\n-- end of output --", .log.display())]
    Failed {
        program: String,
        pass: u8,
        status: String,
        log: PathBuf,
        tail: String,
    },

    #[error("compiler finished but {} was not produced. Check the log in {}\n{tail}", .pdf.display(), .log.display())]
    MissingOutput {
        pdf: PathBuf,
        log: PathBuf,
        tail: String,
    },
}

/// Escape characters that LaTeX treats specially
pub fn escape_latex(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '\\' => escaped.push_str(r"\textbackslash{}"),
            '&' | '%' | '$' | '#' | '_' | '{' | '}' => {
                escaped.push('\\');
                escaped.push(c);
            }
            '~' => escaped.push_str(r"\textasciitilde{}"),
            '^' => escaped.push_str(r"\textasciicircum{}"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[derive(Debug, Clone)]
pub struct LatexCompiler {
    program: String,
    args: Vec<String>,
}

impl LatexCompiler {
    pub fn new(settings: &CompilerSettings) -> Self {
        Self {
            program: settings.program.clone(),
            args: settings.args.clone(),
        }
    }

    /// Run the compiler twice over `report.tex` inside the workspace.
    pub async fn compile(&self, workspace: &Workspace) -> Result<(), CompileError> {
        for pass in 1..=PASSES {
            self.run_pass(workspace, pass).await?;
        }
        Ok(())
    }

    async fn run_pass(&self, workspace: &Workspace, pass: u8) -> Result<(), CompileError> {
        tracing::info!(
            "Running {} (pass {}) in {}",
            self.program,
            pass,
            workspace.root().display()
        );

        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(TEX_FILE)
            .current_dir(workspace.root())
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| CompileError::Spawn {
                program: self.program.clone(),
                pass,
                source,
            })?;

        let mut combined = output.stdout;
        combined.extend_from_slice(&output.stderr);
        let log_path = workspace.log_path();
        if let Err(e) = tokio::fs::write(&log_path, &combined).await {
            tracing::warn!("Could not write compiler log to {}: {}", log_path.display(), e);
        }

        if !output.status.success() {
            return Err(CompileError::Failed {
                program: self.program.clone(),
                pass,
                status: output.status.to_string(),
                log: log_path,
                tail: tail(&String::from_utf8_lossy(&combined), LOG_TAIL_CHARS),
            });
        }

        tracing::info!("{} pass {} completed", self.program, pass);
        Ok(())
    }

    /// Check that the compiler produced the PDF
    pub async fn verify_output(&self, workspace: &Workspace) -> Result<PathBuf, CompileError> {
        let pdf = workspace.pdf_path();
        if tokio::fs::try_exists(&pdf).await.unwrap_or(false) {
            return Ok(pdf);
        }

        let log = workspace.log_path();
        let log_content = tokio::fs::read(&log).await.unwrap_or_default();
        Err(CompileError::MissingOutput {
            pdf,
            tail: tail(&String::from_utf8_lossy(&log_content), LOG_TAIL_CHARS),
            log,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shell(script: &str) -> LatexCompiler {
        LatexCompiler::new(&CompilerSettings {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
        })
    }

    #[test]
    fn test_escape_latex() {
        assert_eq!(escape_latex("50% of $5 & #1"), r"50\% of \$5 \& \#1");
        assert_eq!(escape_latex("a_b {c}"), r"a\_b \{c\}");
        assert_eq!(escape_latex(r"C:\temp"), r"C:\textbackslash{}temp");
        assert_eq!(escape_latex("~^"), r"\textasciitilde{}\textasciicircum{}");
        assert_eq!(escape_latex("plain text"), "plain text");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_compile_runs_two_passes() {
        let base = tempfile::tempdir().unwrap();
        let workspace = Workspace::create(base.path()).unwrap();
        std::fs::write(workspace.tex_path(), "tex").unwrap();
        // $0 is the TeX file name appended after the script
        let compiler = shell("echo pass >> passes.txt; cp \"$0\" report.pdf");

        compiler.compile(&workspace).await.unwrap();
        let pdf = compiler.verify_output(&workspace).await.unwrap();

        assert_eq!(pdf, workspace.pdf_path());
        let passes = std::fs::read_to_string(workspace.root().join("passes.txt")).unwrap();
        assert_eq!(passes.lines().count(), 2);
        assert!(workspace.log_path().exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_pass_reports_log() {
        let base = tempfile::tempdir().unwrap();
        let workspace = Workspace::create(base.path()).unwrap();
        let compiler = shell("echo '! Undefined control sequence.'; exit 1");

        let err = compiler.compile(&workspace).await.unwrap_err();

        match &err {
            CompileError::Failed { pass, log, tail, .. } => {
                assert_eq!(*pass, 1);
                assert_eq!(log, &workspace.log_path());
                assert!(tail.contains("Undefined control sequence"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        let logged = std::fs::read_to_string(workspace.log_path()).unwrap();
        assert!(logged.contains("Undefined control sequence"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_missing_pdf_includes_log_tail() {
        let base = tempfile::tempdir().unwrap();
        let workspace = Workspace::create(base.path()).unwrap();
        let compiler = shell("echo 'no output written'");

        compiler.compile(&workspace).await.unwrap();
        let err = compiler.verify_output(&workspace).await.unwrap_err();

        assert!(matches!(err, CompileError::MissingOutput { .. }));
        assert!(err.to_string().contains("no output written"));
    }

    #[tokio::test]
    async fn test_missing_program_is_a_spawn_error() {
        let base = tempfile::tempdir().unwrap();
        let workspace = Workspace::create(base.path()).unwrap();
        let compiler = LatexCompiler::new(&CompilerSettings {
            program: "definitely-not-a-latex-binary".to_string(),
            args: Vec::new(),
        });

        let err = compiler.compile(&workspace).await.unwrap_err();

        assert!(matches!(err, CompileError::Spawn { pass: 1, .. }));
    }
}
