//! Runs one project import end to end from environment configuration.
//!
//! The worker imports into a [`MemoryStore`] seeded from an optional catalog
//! file, reports progress on an [`EventBus`] and writes the task report
//! (task context plus summary) as JSON when asked to.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use carryover_core::catalog::TargetCatalog;
use carryover_core::options::{ImportTaskContext, ProjectImportOptions};
use carryover_core::results::ImportSummary;
use carryover_events::{EventBus, ImportEvent};
use carryover_pipeline::{ImportConfig, MemoryStore, ProjectImportManager};

/// Worker configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    pub backup_path: PathBuf,
    pub project_key: String,
    pub attachment_path: Option<PathBuf>,
    pub overwrite_details: bool,
    /// Where the task report is written, if anywhere.
    pub task_context_path: Option<PathBuf>,
    /// JSON [`TargetCatalog`] the in-memory target starts from.
    pub catalog_path: Option<PathBuf>,
    pub import: ImportConfig,
}

impl WorkerConfig {
    /// Load configuration from environment variables.
    ///
    /// | Env Var             | Default    |
    /// |---------------------|------------|
    /// | `BACKUP_PATH`       | (required) |
    /// | `PROJECT_KEY`       | (required) |
    /// | `ATTACHMENT_PATH`   | unset      |
    /// | `OVERWRITE_DETAILS` | `false`    |
    /// | `TASK_CONTEXT_PATH` | unset      |
    /// | `TARGET_CATALOG`    | unset      |
    ///
    /// Executor tuning comes from [`ImportConfig::from_env`].
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let backup_path = non_empty("BACKUP_PATH").context("BACKUP_PATH must be set")?;
        let project_key = non_empty("PROJECT_KEY").context("PROJECT_KEY must be set")?;
        let overwrite_details = match non_empty("OVERWRITE_DETAILS") {
            None => false,
            Some(raw) => parse_flag(&raw)
                .with_context(|| format!("OVERWRITE_DETAILS must be a boolean, got '{raw}'"))?,
        };

        Ok(Self {
            backup_path: backup_path.into(),
            project_key: project_key.trim().to_string(),
            attachment_path: non_empty("ATTACHMENT_PATH").map(PathBuf::from),
            overwrite_details,
            task_context_path: non_empty("TASK_CONTEXT_PATH").map(PathBuf::from),
            catalog_path: non_empty("TARGET_CATALOG").map(PathBuf::from),
            import: ImportConfig::from_lookup(&lookup)?,
        })
    }

    pub fn options(&self) -> ProjectImportOptions {
        let options = ProjectImportOptions::new(&self.backup_path, &self.project_key)
            .with_overwrite_project_details(self.overwrite_details);
        match &self.attachment_path {
            Some(path) => options.with_attachment_path(path),
            None => options,
        }
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// What the worker leaves behind for one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskReport {
    pub context: ImportTaskContext,
    /// Absent while the import is running.
    pub summary: Option<ImportSummary>,
}

async fn write_report(path: &Path, report: &TaskReport) -> anyhow::Result<()> {
    let json = serde_json::to_vec_pretty(report)?;
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("writing task report to {}", path.display()))
}

async fn load_store(catalog_path: Option<&Path>) -> anyhow::Result<MemoryStore> {
    let Some(path) = catalog_path else {
        return Ok(MemoryStore::new());
    };
    let raw = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading target catalog {}", path.display()))?;
    let catalog: TargetCatalog = serde_json::from_slice(&raw)
        .with_context(|| format!("parsing target catalog {}", path.display()))?;
    Ok(MemoryStore::with_catalog(catalog))
}

/// Log every event published on `bus` until it is dropped.
fn spawn_event_logger(bus: &EventBus) -> tokio::task::JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        use tokio::sync::broadcast::error::RecvError;
        loop {
            match rx.recv().await {
                Ok(event) => tracing::info!(
                    event_type = %event.event_type,
                    percent = event.percent,
                    phase = %event.phase,
                    "{}",
                    event.message.as_deref().unwrap_or("")
                ),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event logger lagged behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

/// Import the configured project and write the task report.
///
/// The report is written before and after the import; a failed import still
/// leaves its partial summary in the report.
pub async fn run(config: WorkerConfig) -> anyhow::Result<ImportSummary> {
    let mut context = ImportTaskContext::new(config.options());
    if let Some(path) = &config.task_context_path {
        write_report(
            path,
            &TaskReport {
                context: context.clone(),
                summary: None,
            },
        )
        .await?;
    }

    let store = Arc::new(load_store(config.catalog_path.as_deref()).await?);
    let bus = Arc::new(EventBus::default().for_task(context.task_id));
    let logger = spawn_event_logger(&bus);
    bus.publish(ImportEvent::started(&context));
    tracing::info!(task_id = %context.task_id, project_key = %context.project_key(), "Import task started");

    let manager = ProjectImportManager::new(
        store.clone(),
        store.clone(),
        store.clone(),
        config.import.clone(),
    )
    .with_progress_sink(bus.clone());
    let outcome = manager.run(&context.options).await;
    drop(manager);

    let summary = match &outcome {
        Ok(summary) => summary.clone(),
        Err(failure) => failure.results.clone(),
    };
    context.set_phase(summary.phase);
    bus.publish(ImportEvent::finished(context.task_id, &summary));
    drop(bus);
    if let Err(err) = logger.await {
        tracing::warn!(error = %err, "Event logger task failed");
    }

    if let Some(path) = &config.task_context_path {
        write_report(
            path,
            &TaskReport {
                context,
                summary: Some(summary),
            },
        )
        .await?;
    }

    outcome.map_err(anyhow::Error::new)
}
