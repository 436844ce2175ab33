//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] fans [`ImportEvent`]s out to any number of subscribers. It is
//! shared via `Arc<EventBus>`; give one to the import manager as its progress
//! sink and every progress update becomes an `import.progress` event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use carryover_core::options::{ImportPhase, ImportTaskContext};
use carryover_core::progress::ProgressSink;
use carryover_core::results::ImportSummary;

pub const EVENT_IMPORT_STARTED: &str = "import.started";
pub const EVENT_IMPORT_PROGRESS: &str = "import.progress";
pub const EVENT_IMPORT_COMPLETED: &str = "import.completed";
pub const EVENT_IMPORT_FAILED: &str = "import.failed";

// ---------------------------------------------------------------------------
// ImportEvent
// ---------------------------------------------------------------------------

/// Something that happened to an import task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportEvent {
    /// Dot-separated event name, e.g. `"import.progress"`.
    pub event_type: String,

    /// Task the event belongs to, when known.
    pub task_id: Option<Uuid>,

    pub phase: ImportPhase,

    /// Overall progress, 0..=100.
    pub percent: u8,

    pub message: Option<String>,

    /// Event-specific data (the summary for terminal events).
    pub payload: serde_json::Value,

    pub timestamp: DateTime<Utc>,
}

impl ImportEvent {
    pub fn new(event_type: impl Into<String>, phase: ImportPhase) -> Self {
        Self {
            event_type: event_type.into(),
            task_id: None,
            phase,
            percent: 0,
            message: None,
            payload: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    pub fn progress(percent: u8, phase: ImportPhase, message: impl Into<String>) -> Self {
        Self {
            percent: percent.min(100),
            message: Some(message.into()),
            ..Self::new(EVENT_IMPORT_PROGRESS, phase)
        }
    }

    pub fn started(context: &ImportTaskContext) -> Self {
        Self::new(EVENT_IMPORT_STARTED, context.phase)
            .with_task(context.task_id)
            .with_message(format!("Importing project {}", context.project_key()))
    }

    /// `import.completed` or `import.failed`, carrying the summary.
    pub fn finished(task_id: Uuid, summary: &ImportSummary) -> Self {
        let event_type = if summary.is_complete() {
            EVENT_IMPORT_COMPLETED
        } else {
            EVENT_IMPORT_FAILED
        };
        let percent = if summary.is_complete() { 100 } else { 0 };
        let payload = serde_json::to_value(summary).unwrap_or_default();
        Self {
            percent,
            ..Self::new(event_type, summary.phase)
        }
        .with_task(task_id)
        .with_payload(payload)
    }

    pub fn with_task(mut self, task_id: Uuid) -> Self {
        self.task_id = Some(task_id);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// # Usage
///
/// ```rust
/// use carryover_core::options::ImportPhase;
/// use carryover_events::bus::{EventBus, ImportEvent};
///
/// let bus = EventBus::default();
/// let mut rx = bus.subscribe();
///
/// bus.publish(ImportEvent::progress(10, ImportPhase::NotStarted, "Reading backup"));
/// ```
pub struct EventBus {
    sender: broadcast::Sender<ImportEvent>,
    task_id: Option<Uuid>,
}

impl EventBus {
    /// When the buffer is full the oldest events are dropped and slow
    /// receivers observe `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            task_id: None,
        }
    }

    /// Stamp progress events published through [`ProgressSink`] with `task_id`.
    pub fn for_task(mut self, task_id: Uuid) -> Self {
        self.task_id = Some(task_id);
        self
    }

    /// Publish to every current subscriber. Without subscribers the event is dropped.
    pub fn publish(&self, event: ImportEvent) {
        tracing::trace!(event_type = %event.event_type, percent = event.percent, "Publishing import event");
        // A send error only means there are no receivers.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ImportEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ProgressSink for EventBus {
    fn make_progress(&self, percent: u8, phase: ImportPhase, message: &str) {
        let mut event = ImportEvent::progress(percent, phase, message);
        event.task_id = self.task_id;
        self.publish(event);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
