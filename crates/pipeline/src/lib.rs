//! Import pipeline: reads a project backup, partitions it, maps and
//! validates it against the target system, then persists it.
//!
//! - [`scanner`]: streaming dispatch of backup elements to handlers.
//! - [`overview`]: discovery pass building every [`BackupProject`](carryover_core::backup::BackupProject).
//! - [`partition`]: per-entity-class partition files plus id registration.
//! - [`mapping`]: automatic mapping and validation.
//! - [`executor`]: bounded worker pool used during persistence.
//! - [`persist`]: the dependency-ordered persistence stage.
//! - [`manager`]: [`ProjectImportManager`], driving all of the above.
//! - [`store`]: interfaces to the target system and an in-memory store.

pub mod config;
pub mod error;
pub mod executor;
pub mod manager;
pub mod mapping;
pub mod overview;
pub mod partition;
pub mod persist;
pub mod progress;
pub mod scanner;
pub mod store;

pub use config::ImportConfig;
pub use error::{ImportError, ImportFailure};
pub use manager::{ProjectImportData, ProjectImportManager};
pub use progress::TracingProgressSink;
pub use store::memory::MemoryStore;
pub use store::{ProjectImportPersister, TargetSystem, UserDirectory};
