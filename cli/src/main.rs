use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use pgschema_diff_core::{CompareOutcome, Engine, NullProgressReporter, ProgressReporter};
use pgschema_diff_types::{AppConfig, OverwritePolicy};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

mod config;
mod progress;

#[derive(Debug, Parser)]
#[command(name = "pgschema-diff", version, about = "Compares two PostgreSQL schemas and renders a structural diff report")]
struct CliArgs {
    #[arg(long, short = 'c', env = "PGSCHEMA_DIFF_CONFIG", help = "Path to the YAML configuration file")]
    config: PathBuf,

    #[arg(long, help = "Print status lines instead of a progress bar")]
    no_progress: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "comparison failed");
            let code = err
                .downcast_ref::<pgschema_diff_core::Error>()
                .map(|e| e.exit_code())
                .unwrap_or(1);
            ExitCode::from(code.clamp(0, 255) as u8)
        }
    }
}

async fn run() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    let app_config = config::load(&args.config)?;

    let reporter: Box<dyn ProgressReporter> = if args.no_progress {
        Box::new(NullProgressReporter)
    } else {
        Box::new(progress::IndicatifReporter::new())
    };

    let engine = Engine::new(&app_config);
    let outcome = tokio::select! {
        result = engine.compare(&app_config, reporter.as_ref()) => result?,
        _ = shutdown_signal() => {
            engine.shutdown().await;
            anyhow::bail!("comparison interrupted by shutdown signal");
        }
    };

    write_reports(&app_config, &outcome)?;
    tracing::info!(total_changes = outcome.diff.total_changes(), "comparison complete");
    Ok(())
}

/// Writes every successfully-rendered report to `output.directory`,
/// honoring the configured filename template and overwrite policy. A
/// report that failed to render is logged and skipped — it never aborts
/// the others.
fn write_reports(app_config: &AppConfig, outcome: &CompareOutcome) -> anyhow::Result<()> {
    std::fs::create_dir_all(&app_config.output.directory)?;
    let timestamp = chrono::Utc::now().format(&app_config.output.timestamp_format).to_string();

    for report in &outcome.reports {
        let bytes = match &report.result {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!(format = %report.format, error = %err, "skipping failed report");
                continue;
            }
        };

        let filename = app_config
            .output
            .filename_template
            .replace("{timestamp}", &timestamp)
            .replace("{format}", &report.format.to_string())
            .replace("{ext}", report.format.file_extension());
        let path = app_config.output.directory.join(filename);

        if path.exists() && app_config.output.overwrite_policy == OverwritePolicy::Forbid {
            anyhow::bail!("refusing to overwrite existing report at {}", path.display());
        }
        std::fs::write(&path, bytes)?;
        tracing::info!(path = %path.display(), format = %report.format, "wrote report");
    }
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    async fn terminate() {
        let mut signal = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        signal.recv().await;
    }
    #[cfg(not(unix))]
    async fn terminate() {
        std::future::pending::<()>().await
    }
    tokio::select! {
        _ = terminate() => {},
        _ = tokio::signal::ctrl_c() => {},
    }
    tracing::debug!("shutdown signal received, cancelling in-flight comparison");
}
