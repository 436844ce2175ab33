//! Aggregates describing what a backup contains.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::external::{
    ExternalComponent, ExternalCustomFieldConfiguration, ExternalProject, ExternalVersion,
};

/// One project of the backup with the collections it owns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupProject {
    pub project: ExternalProject,
    pub versions: Vec<ExternalVersion>,
    pub components: Vec<ExternalComponent>,
    pub custom_fields: Vec<ExternalCustomFieldConfiguration>,
    pub issue_ids: BTreeSet<String>,
    pub issue_security_level_ids: BTreeSet<String>,
}

impl BackupProject {
    pub fn key(&self) -> &str {
        &self.project.key
    }

    pub fn contains_issue(&self, issue_id: &str) -> bool {
        self.issue_ids.contains(issue_id)
    }

    pub fn custom_field_configuration(
        &self,
        custom_field_id: &str,
    ) -> Option<&ExternalCustomFieldConfiguration> {
        self.custom_fields
            .iter()
            .find(|config| config.field.id == custom_field_id)
    }
}

/// Backup-wide facts that outlive a single project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupSystemInformation {
    /// Issue key for every issue in the backup, across all projects.
    pub issue_keys_by_id: BTreeMap<String, String>,
    /// Number of top-level elements in the backup.
    pub entity_count: usize,
    /// Build number of the system that wrote the backup.
    pub build_number: Option<String>,
    /// Plugin key to the plugin version installed when the backup was taken.
    pub plugin_versions: BTreeMap<String, String>,
    /// Whether the source system allowed issues without an assignee.
    pub unassigned_issues_allowed: bool,
}

impl BackupSystemInformation {
    pub fn issue_key(&self, issue_id: &str) -> Option<&str> {
        self.issue_keys_by_id.get(issue_id).map(String::as_str)
    }

    pub fn plugin_version(&self, plugin_key: &str) -> Option<&str> {
        self.plugin_versions.get(plugin_key).map(String::as_str)
    }
}

/// Result of the discovery scan over a backup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupOverview {
    pub projects: BTreeMap<String, BackupProject>,
    pub system: BackupSystemInformation,
}

impl BackupOverview {
    pub fn project(&self, key: &str) -> Option<&BackupProject> {
        self.projects.get(key)
    }

    pub fn project_keys(&self) -> impl Iterator<Item = &str> {
        self.projects.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::ExternalCustomField;

    #[test]
    fn finds_custom_field_configuration_by_field_id() {
        let project = BackupProject {
            custom_fields: vec![ExternalCustomFieldConfiguration {
                field: ExternalCustomField {
                    id: "10001".into(),
                    name: "Colour".into(),
                    type_key: "textfield".into(),
                },
                ..Default::default()
            }],
            ..Default::default()
        };
        assert!(project.custom_field_configuration("10001").is_some());
        assert!(project.custom_field_configuration("10002").is_none());
    }
}
