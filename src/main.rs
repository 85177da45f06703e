// Main entry point - CLI, dependency injection and server setup
mod domain;
mod application;
mod infrastructure;
mod presentation;
#[cfg(test)]
mod test_support;

use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::application::report::Report;
use crate::application::report_service::{ReportRequest, ReportService};
use crate::domain::dashboard::{LayoutMode, TimeRange};
use crate::infrastructure::config::{load_settings, Settings};
use crate::infrastructure::grafana_client::ApiVersion;
use crate::presentation::app_state::AppState;
use crate::presentation::handlers::routes;

/// Generates PDF reports from Grafana dashboards.
#[derive(Parser)]
#[command(author, version, about = "Grafana dashboard to PDF reporter")]
struct Cli {
    /// Configuration file; defaults to config/reporter.toml when present
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve reports over HTTP.
    Serve {
        /// Address to listen on, overrides `server.listen`
        #[arg(long)]
        listen: Option<String>,
    },

    /// Generate a single report and write it to a file.
    Render(RenderArgs),
}

#[derive(Args)]
struct RenderArgs {
    /// Dashboard uid (v5) or slug (v4)
    #[arg(long)]
    dashboard: String,

    #[arg(long, default_value = "report.pdf")]
    output: PathBuf,

    /// Start of the time range, e.g. now-3h; defaults to the dashboard's own range
    #[arg(long)]
    from: Option<String>,

    #[arg(long)]
    to: Option<String>,

    /// Custom TeX template file
    #[arg(long)]
    template: Option<PathBuf>,

    #[arg(long)]
    api_token: Option<String>,

    #[arg(long, value_parser = parse_api_version)]
    api_version: Option<ApiVersion>,

    #[arg(long, value_parser = parse_layout)]
    layout: Option<LayoutMode>,

    /// Template variable as name=value; may be repeated
    #[arg(long = "var", value_parser = parse_variable)]
    variables: Vec<(String, String)>,
}

fn parse_api_version(value: &str) -> Result<ApiVersion, String> {
    match value.to_ascii_lowercase().as_str() {
        "v4" => Ok(ApiVersion::V4),
        "v5" => Ok(ApiVersion::V5),
        other => Err(format!("unknown API version '{}', expected v4 or v5", other)),
    }
}

fn parse_layout(value: &str) -> Result<LayoutMode, String> {
    match value.to_ascii_lowercase().as_str() {
        "sequential" => Ok(LayoutMode::Sequential),
        "grid" => Ok(LayoutMode::Grid),
        "rows" => Ok(LayoutMode::Rows),
        other => Err(format!(
            "unknown layout '{}', expected sequential, grid or rows",
            other
        )),
    }
}

fn parse_variable(value: &str) -> Result<(String, String), String> {
    match value.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(format!("expected name=value, got '{}'", value)),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    // Load configuration
    let settings = load_settings(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { listen } => serve(settings, listen).await,
        Commands::Render(args) => render(settings, args).await,
    }
}

async fn serve(settings: Settings, listen: Option<String>) -> anyhow::Result<()> {
    let report_service =
        ReportService::new(&settings).context("Failed to build the Grafana client")?;
    let state = Arc::new(AppState { report_service });

    let router = routes(state).layer(TraceLayer::new_for_http());

    let listen = listen.unwrap_or(settings.server.listen);
    let addr: SocketAddr = listen
        .parse()
        .with_context(|| format!("Invalid listen address '{}'", listen))?;
    tracing::info!(
        "Starting grafana-reporter on {} (Grafana at {})",
        addr,
        settings.grafana.url
    );

    axum::serve(tokio::net::TcpListener::bind(addr).await?, router).await?;

    Ok(())
}

async fn render(settings: Settings, args: RenderArgs) -> anyhow::Result<()> {
    let report_service =
        ReportService::new(&settings).context("Failed to build the Grafana client")?;

    let time_range = match (args.from, args.to) {
        (None, None) => None,
        (from, to) => {
            let default = TimeRange::default();
            Some(TimeRange::new(
                from.unwrap_or(default.from),
                to.unwrap_or(default.to),
            ))
        }
    };
    let mut report = report_service.create_report(ReportRequest {
        dashboard: args.dashboard,
        time_range,
        api_token: args.api_token,
        api_version: args.api_version,
        variables: args.variables,
        layout: args.layout,
        template: args.template,
    })?;

    let result = write_report(&mut report, &args.output).await;
    report.clean();
    result
}

async fn write_report(report: &mut Report, output: &std::path::Path) -> anyhow::Result<()> {
    let mut pdf = report.generate().await?;
    let mut file = tokio::fs::File::create(output)
        .await
        .with_context(|| format!("Failed to create {}", output.display()))?;
    let bytes = tokio::io::copy(&mut pdf, &mut file)
        .await
        .with_context(|| format!("Failed to write {}", output.display()))?;
    tracing::info!(
        "Wrote report '{}' to {} ({} bytes)",
        report.title(),
        output.display(),
        bytes
    );
    Ok(())
}
