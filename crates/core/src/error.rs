//! Error types shared by every stage of a project import.

use std::fmt;

/// Programmer-error conditions raised by the core domain.
///
/// Data-quality problems are never reported through this type; those end up
/// as messages in a [`MessageSet`](crate::message::MessageSet).
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Mapper(#[from] MapperError),
}

/// Violations of the ID mapper invariants.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MapperError {
    #[error("old id '{old_id}' was never registered with the {kind} mapper")]
    NotRegistered { kind: &'static str, old_id: String },

    #[error(
        "old id '{old_id}' of the {kind} mapper is already mapped to '{existing}', refusing '{requested}'"
    )]
    AlreadyMapped {
        kind: &'static str,
        old_id: String,
        existing: String,
        requested: String,
    },
}

/// A backup element could not be turned into an external entity.
///
/// Always recoverable: the offending element is logged and skipped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("<{entity}> is missing required attribute '{attribute}'")]
    MissingAttribute {
        entity: String,
        attribute: &'static str,
    },

    #[error("<{entity}> has invalid value '{value}' for attribute '{attribute}'")]
    InvalidAttribute {
        entity: String,
        attribute: &'static str,
        value: String,
    },

    #[error("expected <{expected}> element, found <{found}>")]
    UnexpectedEntity {
        expected: &'static str,
        found: String,
    },
}

/// Why a running import was halted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    /// The running error count went past the configured threshold.
    ErrorThreshold { errors: usize, threshold: usize },
    /// A partition file could not be written.
    PartitionWrite(String),
    /// The project could not be created or updated.
    ProjectWrite(String),
    /// A version, component or user write failed in a way later steps cannot survive.
    DependencyWrite(String),
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ErrorThreshold { errors, threshold } => write!(
                f,
                "{errors} errors recorded, more than the allowed {threshold}"
            ),
            Self::PartitionWrite(detail) => write!(f, "failed to write partition file: {detail}"),
            Self::ProjectWrite(detail) => write!(f, "failed to write project: {detail}"),
            Self::DependencyWrite(detail) => write!(f, "failed to write dependency: {detail}"),
        }
    }
}

/// Hard stop of a running import. Entities written before the abort stay in place.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("project import aborted: {reason}")]
pub struct AbortImport {
    pub reason: AbortReason,
}

impl AbortImport {
    pub fn new(reason: AbortReason) -> Self {
        Self { reason }
    }

    pub fn error_threshold(errors: usize, threshold: usize) -> Self {
        Self::new(AbortReason::ErrorThreshold { errors, threshold })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abort_message_names_the_reason() {
        let err = AbortImport::error_threshold(11, 10);
        assert_eq!(
            err.to_string(),
            "project import aborted: 11 errors recorded, more than the allowed 10"
        );
    }

    #[test]
    fn mapper_error_converts_into_core_error() {
        let err: CoreError = MapperError::NotRegistered {
            kind: "issue",
            old_id: "10000".into(),
        }
        .into();
        assert!(err.to_string().contains("never registered with the issue mapper"));
    }
}
