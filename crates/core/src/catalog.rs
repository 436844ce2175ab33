//! Snapshot of the target system consulted by automatic mapping and validation.
//!
//! Loaded once per import by the pipeline; everything here is plain data so
//! mapping and validation stay pure.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Any target entity identified by id and matched by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedEntity {
    pub id: String,
    pub name: String,
}

impl NamedEntity {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetIssueType {
    pub id: String,
    pub name: String,
    pub subtask: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetStatus {
    pub id: String,
    pub name: String,
    /// Issue types whose workflow (for the imported project) contains this
    /// status. `None` means every issue type.
    pub workflow_issue_types: Option<BTreeSet<String>>,
}

impl TargetStatus {
    pub fn valid_for_issue_type(&self, issue_type_id: &str) -> bool {
        self.workflow_issue_types
            .as_ref()
            .map_or(true, |types| types.contains(issue_type_id))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetOption {
    pub id: String,
    pub value: String,
    pub parent_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetCustomField {
    pub id: String,
    pub name: String,
    pub type_key: String,
    /// Projects the field is configured for. `None` means a global context.
    pub project_ids: Option<BTreeSet<String>>,
    /// Issue types the field is configured for. `None` means every issue type.
    pub issue_type_ids: Option<BTreeSet<String>>,
    pub options: Vec<TargetOption>,
}

impl TargetCustomField {
    /// A project that does not exist yet only sees global contexts.
    pub fn in_project_context(&self, project_id: Option<&str>) -> bool {
        match (&self.project_ids, project_id) {
            (None, _) => true,
            (Some(ids), Some(id)) => ids.contains(id),
            (Some(_), None) => false,
        }
    }

    pub fn in_issue_type_context(&self, issue_type_id: &str) -> bool {
        self.issue_type_ids
            .as_ref()
            .map_or(true, |types| types.contains(issue_type_id))
    }
}

/// Summary of the target project sharing the backup project's key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExistingProject {
    pub id: String,
    pub key: String,
    pub name: String,
    pub description: Option<String>,
    pub lead: Option<String>,
    pub counter: i64,
    pub issue_count: usize,
    pub version_count: usize,
    pub component_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetCatalog {
    pub priorities: Vec<NamedEntity>,
    pub resolutions: Vec<NamedEntity>,
    pub issue_types: Vec<TargetIssueType>,
    pub statuses: Vec<TargetStatus>,
    pub custom_fields: Vec<TargetCustomField>,
    /// Custom field types the target cannot import values for.
    pub unsupported_field_types: BTreeSet<String>,
    pub project_roles: Vec<NamedEntity>,
    pub issue_link_types: Vec<NamedEntity>,
    /// Levels of the security scheme attached to the target project.
    pub security_levels: Vec<NamedEntity>,
    pub existing_project: Option<ExistingProject>,
    /// Users known to exist in the directory (only required ones are looked up).
    pub users: BTreeSet<String>,
    /// Groups known to exist in the directory.
    pub groups: BTreeSet<String>,
    /// Build number of the target. `None` skips the build comparison.
    #[serde(default)]
    pub build_number: Option<String>,
    /// Plugin key to installed version.
    #[serde(default)]
    pub plugin_versions: BTreeMap<String, String>,
    #[serde(default)]
    pub unassigned_issues_allowed: bool,
}

impl TargetCatalog {
    pub fn existing_project_id(&self) -> Option<&str> {
        self.existing_project.as_ref().map(|p| p.id.as_str())
    }

    pub fn issue_type(&self, id: &str) -> Option<&TargetIssueType> {
        self.issue_types.iter().find(|t| t.id == id)
    }

    pub fn status(&self, id: &str) -> Option<&TargetStatus> {
        self.statuses.iter().find(|s| s.id == id)
    }

    pub fn custom_field(&self, id: &str) -> Option<&TargetCustomField> {
        self.custom_fields.iter().find(|f| f.id == id)
    }
}

/// Case-insensitive, whitespace-trimmed name comparison.
pub fn same_name(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

/// First entity whose name matches.
pub fn find_by_name<'a>(entities: &'a [NamedEntity], name: &str) -> Option<&'a NamedEntity> {
    entities.iter().find(|e| same_name(&e.name, name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_context_rules() {
        let global = TargetCustomField::default();
        assert!(global.in_project_context(None));
        assert!(global.in_project_context(Some("1")));

        let scoped = TargetCustomField {
            project_ids: Some(["1".to_string()].into()),
            ..Default::default()
        };
        assert!(scoped.in_project_context(Some("1")));
        assert!(!scoped.in_project_context(Some("2")));
        assert!(!scoped.in_project_context(None));
    }

    #[test]
    fn name_lookup_ignores_case() {
        let priorities = vec![NamedEntity::new("1", "Blocker"), NamedEntity::new("2", "Major")];
        assert_eq!(find_by_name(&priorities, " major ").map(|p| p.id.as_str()), Some("2"));
        assert!(find_by_name(&priorities, "Trivial").is_none());
    }
}
