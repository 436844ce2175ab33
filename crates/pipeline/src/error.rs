//! Error types of the import pipeline.
//!
//! Per-entity persistence failures never show up here: they are recorded in
//! the import results. These types cover what stops a stage or an import.

use std::path::PathBuf;

use carryover_core::error::{AbortImport, CoreError};
use carryover_core::results::ImportSummary;
use carryover_core::validation::MappingResult;

/// Invalid environment configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} has invalid value '{value}'")]
    Invalid { var: &'static str, value: String },

    #[error("{0} must be set")]
    Missing(&'static str),
}

/// A handler refused to go on with the scan.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error(transparent)]
    Abort(#[from] AbortImport),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reading a backup or partition file failed.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("malformed backup {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },

    #[error(transparent)]
    Handler(#[from] HandlerError),
}

/// Failure reported by the target store, directory or target system.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The store refused this one entity.
    #[error("rejected: {0}")]
    Rejected(String),

    /// An entity the write depends on does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store consistency error: {0}")]
    Consistency(String),

    #[error("store I/O error: {0}")]
    Io(String),
}

impl StoreError {
    /// Errors no later write can recover from.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Unavailable(_) | Self::Consistency(_) | Self::Io(_)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ExecutorError {
    #[error("executor is shut down")]
    ShutDown,
}

/// Why an import did not run to completion.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error(transparent)]
    Scan(ScanError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Aborted(#[from] AbortImport),

    #[error("mapping has {} blocking error(s)", .0.error_count())]
    MappingBlocked(Box<MappingResult>),

    #[error("project '{0}' is not in the backup")]
    ProjectNotInBackup(String),

    #[error("project data has not been validated")]
    NotValidated,

    #[error(transparent)]
    Validation(#[from] CoreError),
}

impl From<ScanError> for ImportError {
    /// An abort raised inside a handler stays an abort.
    fn from(err: ScanError) -> Self {
        match err {
            ScanError::Handler(HandlerError::Abort(abort)) => Self::Aborted(abort),
            other => Self::Scan(other),
        }
    }
}

impl From<ExecutorError> for HandlerError {
    fn from(err: ExecutorError) -> Self {
        HandlerError::Io(std::io::Error::other(err))
    }
}

/// A failed import together with what it achieved before failing.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct ImportFailure {
    #[source]
    pub error: ImportError,
    pub results: ImportSummary,
}

impl ImportFailure {
    pub fn new(error: ImportError, results: ImportSummary) -> Self {
        Self { error, results }
    }

    pub fn is_abort(&self) -> bool {
        matches!(self.error, ImportError::Aborted(_))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn handler_abort_surfaces_as_import_abort() {
        let scan = ScanError::Handler(HandlerError::Abort(AbortImport::error_threshold(11, 10)));
        assert_matches!(ImportError::from(scan), ImportError::Aborted(_));

        let scan = ScanError::Malformed {
            path: "backup.xml".into(),
            reason: "no root element".into(),
        };
        assert_matches!(ImportError::from(scan), ImportError::Scan(ScanError::Malformed { .. }));
    }

    #[test]
    fn only_infrastructure_errors_are_fatal() {
        assert!(!StoreError::Rejected("duplicate key".into()).is_fatal());
        assert!(!StoreError::NotFound("issue 10".into()).is_fatal());
        assert!(StoreError::Unavailable("down".into()).is_fatal());
        assert!(StoreError::Io("disk full".into()).is_fatal());
    }
}
