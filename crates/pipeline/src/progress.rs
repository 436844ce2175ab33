//! Progress sink that writes updates to the log.

use carryover_core::options::ImportPhase;
use carryover_core::progress::ProgressSink;

/// Logs every progress update at `info`, tagged with the task it belongs to.
#[derive(Debug, Clone, Default)]
pub struct TracingProgressSink {
    task: Option<String>,
}

impl TracingProgressSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_task(task: impl Into<String>) -> Self {
        Self {
            task: Some(task.into()),
        }
    }
}

impl ProgressSink for TracingProgressSink {
    fn make_progress(&self, percent: u8, phase: ImportPhase, message: &str) {
        match &self.task {
            Some(task) => tracing::info!(task = %task, percent, phase = %phase, "{message}"),
            None => tracing::info!(percent, phase = %phase, "{message}"),
        }
    }
}
