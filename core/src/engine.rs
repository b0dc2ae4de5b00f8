//! Orchestration (spec.md §2's control flow): one `Engine` owns the
//! `Manager`, the `Collector`, and ties init -> collect (source ‖ target)
//! -> diff -> optional group -> render -> close together for a single
//! comparison run.

use chrono::Utc;
use pgschema_diff_types::{AppConfig, DiffResult, Role};
use tracing::{info, instrument};

use crate::collector::Collector;
use crate::diff;
use crate::error::Result;
use crate::manager::Manager;
use crate::render::{self, RenderedReport, ReportMetadata};

/// The fixed stage boundaries the Engine reports progress at. The boundary
/// maps these to whatever percent-complete display it wants; the engine
/// never computes a percentage itself beyond what's passed here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressStage {
    Init,
    CollectSource,
    CollectTarget,
    Diff,
    Render,
}

impl ProgressStage {
    pub fn label(self) -> &'static str {
        match self {
            ProgressStage::Init => "init",
            ProgressStage::CollectSource => "collect-source",
            ProgressStage::CollectTarget => "collect-target",
            ProgressStage::Diff => "diff",
            ProgressStage::Render => "render",
        }
    }
}

/// A progress sink the Engine calls at fixed stage boundaries. Must never
/// block the core — an `indicatif`-backed implementation at the boundary
/// is the expected consumer.
pub trait ProgressReporter: Send + Sync {
    fn show(&self, stage: ProgressStage, percent: u8);
    fn status(&self, message: &str);
    fn warning(&self, message: &str);
    fn error(&self, message: &str);
}

/// A reporter that drops every event, for callers that don't want progress
/// output (tests, library embedding).
pub struct NullProgressReporter;

impl ProgressReporter for NullProgressReporter {
    fn show(&self, _stage: ProgressStage, _percent: u8) {}
    fn status(&self, _message: &str) {}
    fn warning(&self, _message: &str) {}
    fn error(&self, _message: &str) {}
}

pub struct CompareOutcome {
    pub diff: DiffResult,
    pub reports: Vec<RenderedReport>,
}

pub struct Engine {
    manager: Manager,
    collector: Collector,
}

impl Engine {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            manager: Manager::new(config.source.clone(), config.target.clone(), config.system.max_connections),
            collector: Collector::new(),
        }
    }

    /// Runs one full comparison: verify both sides, collect both
    /// snapshots (concurrently), diff, optionally group, render every
    /// configured format. Pools are torn down before returning, on both
    /// the success and the failure path.
    #[instrument(skip(self, config, progress))]
    pub async fn compare(&self, config: &AppConfig, progress: &dyn ProgressReporter) -> Result<CompareOutcome> {
        let result = self.run(config, progress).await;
        self.shutdown().await;
        result
    }

    async fn run(&self, config: &AppConfig, progress: &dyn ProgressReporter) -> Result<CompareOutcome> {
        progress.show(ProgressStage::Init, 0);
        progress.status("verifying source and target");
        self.manager.init().await?;
        progress.show(ProgressStage::Init, 100);

        progress.show(ProgressStage::CollectSource, 0);
        progress.show(ProgressStage::CollectTarget, 0);
        let (source_snapshot, target_snapshot) = tokio::try_join!(
            self.collect(Role::Source, &config.source.schema, progress),
            self.collect(Role::Target, &config.target.schema, progress),
        )?;
        progress.show(ProgressStage::CollectSource, 100);
        progress.show(ProgressStage::CollectTarget, 100);

        progress.show(ProgressStage::Diff, 0);
        progress.status("computing differences");
        let diff_result = diff::diff(&source_snapshot, &target_snapshot);
        progress.show(ProgressStage::Diff, 100);
        info!(total_changes = diff_result.total_changes(), "diff complete");

        progress.show(ProgressStage::Render, 0);
        let metadata = ReportMetadata {
            source_label: format!("{}@{}/{}", config.source.host, config.source.port, config.source.database),
            target_label: format!("{}@{}/{}", config.target.host, config.target.port, config.target.database),
            source_version: self.manager.versions().0.cloned(),
            target_version: self.manager.versions().1.cloned(),
            generated_at: Utc::now(),
            include_summary: config.output.include_summary,
            include_details: config.output.include_details,
        };
        let reports = render::render_all(&diff_result, &config.output, &metadata);
        for report in &reports {
            match &report.result {
                Ok(_) => {}
                Err(err) => progress.warning(&format!("{} report generation failed: {err}", report.format)),
            }
        }
        progress.show(ProgressStage::Render, 100);

        Ok(CompareOutcome {
            diff: diff_result,
            reports,
        })
    }

    async fn collect(
        &self,
        role: Role,
        schema_name: &str,
        progress: &dyn ProgressReporter,
    ) -> Result<pgschema_diff_types::SchemaSnapshot> {
        let lease = match role {
            Role::Source => self.manager.get_source().await?,
            Role::Target => self.manager.get_target().await?,
        };
        let result = self.collector.collect(role, schema_name, &lease, false).await;
        match role {
            Role::Source => self.manager.release_source(lease).await,
            Role::Target => self.manager.release_target(lease).await,
        }
        if let Err(err) = &result {
            progress.error(&format!("{role} collection failed: {err}"));
        }
        result
    }

    /// Closes both pools in reverse registration order (target, then
    /// source), matching the Manager's own teardown ordering.
    pub async fn shutdown(&self) {
        self.manager.close().await;
    }
}
