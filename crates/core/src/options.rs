//! What the operator asked for, and where an import currently stands.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::Timestamp;

/// Operator choices for one project import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectImportOptions {
    /// Path of the backup XML file.
    pub backup_path: PathBuf,
    /// Key of the project to import out of the backup.
    pub project_key: String,
    /// Root directory holding attachment files. `None` skips attachments.
    pub attachment_path: Option<PathBuf>,
    /// Overwrite name, lead, description and friends of an existing project.
    /// Role memberships are only imported when this is set or the project is new.
    pub overwrite_project_details: bool,
}

impl ProjectImportOptions {
    pub fn new(backup_path: impl Into<PathBuf>, project_key: impl Into<String>) -> Self {
        Self {
            backup_path: backup_path.into(),
            project_key: project_key.into(),
            attachment_path: None,
            overwrite_project_details: false,
        }
    }

    pub fn with_attachment_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.attachment_path = Some(path.into());
        self
    }

    pub fn with_overwrite_project_details(mut self, overwrite: bool) -> Self {
        self.overwrite_project_details = overwrite;
        self
    }

    pub fn attachment_path(&self) -> Option<&Path> {
        self.attachment_path.as_deref()
    }
}

/// Persistence phases, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportPhase {
    NotStarted,
    UsersCreated,
    ProjectCreatedOrUpdated,
    VersionsCreated,
    ComponentsCreated,
    IssuesImported,
    IssueRelatedDataImported,
    CustomFieldValuesImported,
    AttachmentsImported,
    RoleMembersImported,
    Complete,
    Aborted,
}

impl ImportPhase {
    /// The phase that follows on success. Terminal phases have none.
    pub fn next(self) -> Option<Self> {
        use ImportPhase::*;
        match self {
            NotStarted => Some(UsersCreated),
            UsersCreated => Some(ProjectCreatedOrUpdated),
            ProjectCreatedOrUpdated => Some(VersionsCreated),
            VersionsCreated => Some(ComponentsCreated),
            ComponentsCreated => Some(IssuesImported),
            IssuesImported => Some(IssueRelatedDataImported),
            IssueRelatedDataImported => Some(CustomFieldValuesImported),
            CustomFieldValuesImported => Some(AttachmentsImported),
            AttachmentsImported => Some(RoleMembersImported),
            RoleMembersImported => Some(Complete),
            Complete | Aborted => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Aborted)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::UsersCreated => "users_created",
            Self::ProjectCreatedOrUpdated => "project_created_or_updated",
            Self::VersionsCreated => "versions_created",
            Self::ComponentsCreated => "components_created",
            Self::IssuesImported => "issues_imported",
            Self::IssueRelatedDataImported => "issue_related_data_imported",
            Self::CustomFieldValuesImported => "custom_field_values_imported",
            Self::AttachmentsImported => "attachments_imported",
            Self::RoleMembersImported => "role_members_imported",
            Self::Complete => "complete",
            Self::Aborted => "aborted",
        }
    }
}

impl fmt::Display for ImportPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record written when an import task starts, so a crashed or finished task
/// can be traced back to its inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportTaskContext {
    pub task_id: Uuid,
    pub options: ProjectImportOptions,
    pub phase: ImportPhase,
    pub started_at: Timestamp,
    pub updated_at: Timestamp,
}

impl ImportTaskContext {
    pub fn new(options: ProjectImportOptions) -> Self {
        let now = chrono::Utc::now();
        Self {
            task_id: Uuid::new_v4(),
            options,
            phase: ImportPhase::NotStarted,
            started_at: now,
            updated_at: now,
        }
    }

    pub fn project_key(&self) -> &str {
        &self.options.project_key
    }

    pub fn set_phase(&mut self, phase: ImportPhase) {
        self.phase = phase;
        self.updated_at = chrono::Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_advance_in_order_until_complete() {
        let mut phase = ImportPhase::NotStarted;
        let mut seen = vec![phase];
        while let Some(next) = phase.next() {
            assert!(next > phase);
            phase = next;
            seen.push(phase);
        }
        assert_eq!(phase, ImportPhase::Complete);
        assert_eq!(seen.len(), 11);
        assert!(ImportPhase::Aborted.next().is_none());
        assert!(ImportPhase::Aborted.is_terminal());
    }

    #[test]
    fn task_context_round_trips_through_json() {
        let mut context = ImportTaskContext::new(
            ProjectImportOptions::new("/backups/site.xml", "MNK")
                .with_attachment_path("/backups/attachments")
                .with_overwrite_project_details(true),
        );
        context.set_phase(ImportPhase::VersionsCreated);
        let json = serde_json::to_string(&context).unwrap();
        let back: ImportTaskContext = serde_json::from_str(&json).unwrap();
        assert_eq!(back, context);
        assert_eq!(back.project_key(), "MNK");
        assert_eq!(ImportPhase::IssuesImported.to_string(), "issues_imported");
    }
}
