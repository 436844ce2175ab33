//! Partitioning stage.
//!
//! Splits the backup into small per-entity-class documents holding only the
//! selected project's data, and registers every old id the later stages
//! need. Partition files live in a temporary directory owned by
//! [`Partitions`] and disappear when it is dropped.

pub mod handlers;
pub mod registration;
pub mod writer;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use carryover_core::error::{AbortImport, AbortReason};

pub use handlers::{PartitionHandler, SecondDegreePartitionHandler};
pub use registration::MapperRegistrationHandler;
pub use writer::PartitionWriter;

/// Entity classes that get their own partition file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PartitionKind {
    Issues,
    IssueRelated,
    SecondDegree,
    CustomFieldValues,
    Attachments,
}

impl PartitionKind {
    pub fn file_name(self) -> &'static str {
        match self {
            Self::Issues => "issues.xml",
            Self::IssueRelated => "issue-related.xml",
            Self::SecondDegree => "second-degree.xml",
            Self::CustomFieldValues => "custom-field-values.xml",
            Self::Attachments => "attachments.xml",
        }
    }
}

impl fmt::Display for PartitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_name().trim_end_matches(".xml"))
    }
}

/// One finished partition file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionFile {
    pub path: PathBuf,
    pub entity_count: usize,
}

/// The partition files of one import.
#[derive(Debug)]
pub struct Partitions {
    dir: TempDir,
    files: BTreeMap<PartitionKind, PartitionFile>,
}

impl Partitions {
    pub fn new() -> std::io::Result<Self> {
        let dir = tempfile::Builder::new().prefix("carryover-").tempdir()?;
        Ok(Self {
            dir,
            files: BTreeMap::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn path_for(&self, kind: PartitionKind) -> PathBuf {
        self.dir.path().join(kind.file_name())
    }

    pub fn insert(&mut self, kind: PartitionKind, file: PartitionFile) {
        self.files.insert(kind, file);
    }

    pub fn get(&self, kind: PartitionKind) -> Option<&PartitionFile> {
        self.files.get(&kind)
    }

    pub fn entity_count(&self, kind: PartitionKind) -> usize {
        self.get(kind).map_or(0, |f| f.entity_count)
    }
}

/// Partition writes are fatal: later phases would silently miss data.
pub(crate) fn partition_write_failed(kind: PartitionKind, err: std::io::Error) -> AbortImport {
    tracing::error!(partition = %kind, error = %err, "Failed to write partition file");
    AbortImport::new(AbortReason::PartitionWrite(format!("{kind}: {err}")))
}
