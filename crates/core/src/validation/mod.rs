//! Validation of the populated mappers before anything is written.
//!
//! Every validator is a pure function of the mappers, the backup project,
//! the target catalog and a message catalog. Validators never touch the
//! mappers mutably and report data problems as messages, not errors.

pub mod custom_field;
pub mod issue_type;
pub mod project;
pub mod simple;
pub mod status;
pub mod user;
pub mod value;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::backup::BackupProject;
use crate::catalog::TargetCatalog;
use crate::i18n::I18n;
use crate::mapper::MapperRegistry;
use crate::message::MessageSet;

pub use custom_field::validate_custom_fields;
pub use issue_type::validate_issue_types;
pub use project::validate_project_importable;
pub use simple::{validate_issue_security_levels, validate_simple_mapper};
pub use status::validate_statuses;
pub use user::{validate_groups, validate_project_role_actors, validate_users};
pub use value::{validate_custom_field_options, CustomFieldValueValidator};

/// Entity kinds reported separately in a [`MappingResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationKind {
    Project,
    IssueType,
    CustomField,
    Priority,
    Resolution,
    Status,
    ProjectRole,
    ProjectRoleActor,
    User,
    Group,
    IssueLinkType,
    IssueSecurityLevel,
    FileAttachment,
}

impl ValidationKind {
    pub const ALL: &'static [ValidationKind] = &[
        Self::Project,
        Self::IssueType,
        Self::CustomField,
        Self::Priority,
        Self::Resolution,
        Self::Status,
        Self::ProjectRole,
        Self::ProjectRoleActor,
        Self::User,
        Self::Group,
        Self::IssueLinkType,
        Self::IssueSecurityLevel,
        Self::FileAttachment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::IssueType => "issue_type",
            Self::CustomField => "custom_field",
            Self::Priority => "priority",
            Self::Resolution => "resolution",
            Self::Status => "status",
            Self::ProjectRole => "project_role",
            Self::ProjectRoleActor => "project_role_actor",
            Self::User => "user",
            Self::Group => "group",
            Self::IssueLinkType => "issue_link_type",
            Self::IssueSecurityLevel => "issue_security_level",
            Self::FileAttachment => "file_attachment",
        }
    }
}

impl std::fmt::Display for ValidationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message sets of one mapping/validation run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingResult {
    sets: BTreeMap<ValidationKind, MessageSet>,
    /// Value-level messages keyed by old custom field id.
    custom_field_values: BTreeMap<String, MessageSet>,
}

impl MappingResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, kind: ValidationKind, messages: MessageSet) {
        self.sets.insert(kind, messages);
    }

    pub fn get(&self, kind: ValidationKind) -> Option<&MessageSet> {
        self.sets.get(&kind)
    }

    pub fn set_custom_field_value_messages(&mut self, messages: BTreeMap<String, MessageSet>) {
        self.custom_field_values = messages;
    }

    pub fn custom_field_value_messages(&self) -> &BTreeMap<String, MessageSet> {
        &self.custom_field_values
    }

    pub fn has_errors_for(&self, kind: ValidationKind) -> bool {
        self.get(kind).is_some_and(MessageSet::has_any_errors)
    }

    /// True only when no message set holds an error.
    pub fn can_import(&self) -> bool {
        self.sets.values().all(|s| !s.has_any_errors())
            && self.custom_field_values.values().all(|s| !s.has_any_errors())
    }

    pub fn error_count(&self) -> usize {
        self.sets
            .values()
            .chain(self.custom_field_values.values())
            .map(MessageSet::error_count)
            .sum()
    }

    /// Every error, prefixed by the kind it belongs to.
    pub fn errors(&self) -> Vec<(ValidationKind, &str)> {
        let mut out: Vec<(ValidationKind, &str)> = self
            .sets
            .iter()
            .flat_map(|(kind, set)| set.errors().map(move |e| (*kind, e)))
            .collect();
        out.extend(
            self.custom_field_values
                .values()
                .flat_map(|set| set.errors().map(|e| (ValidationKind::CustomField, e))),
        );
        out
    }
}

/// Whether role memberships will be written for this import.
///
/// Memberships are imported when the operator overwrites project details,
/// and always for a project the import creates.
pub fn imports_role_members(overwrite_project_details: bool, catalog: &TargetCatalog) -> bool {
    overwrite_project_details || catalog.existing_project.is_none()
}

/// Validate priorities, resolutions, statuses, roles, role actors, users,
/// groups, link types and security levels into `result`.
pub fn validate_system_fields(
    i18n: &dyn I18n,
    mappers: &MapperRegistry,
    backup_project: &BackupProject,
    catalog: &TargetCatalog,
    overwrite_project_details: bool,
    result: &mut MappingResult,
) {
    use crate::i18n::keys;

    result.set(
        ValidationKind::Priority,
        validate_simple_mapper(i18n, &mappers.priority, keys::PRIORITY_MISSING),
    );
    result.set(
        ValidationKind::Resolution,
        validate_simple_mapper(i18n, &mappers.resolution, keys::RESOLUTION_MISSING),
    );
    result.set(
        ValidationKind::Status,
        validate_statuses(i18n, &mappers.status, &mappers.issue_type, catalog),
    );
    result.set(
        ValidationKind::ProjectRole,
        validate_simple_mapper(i18n, &mappers.project_role, keys::PROJECT_ROLE_MISSING),
    );
    let role_actor_messages = if imports_role_members(overwrite_project_details, catalog) {
        validate_project_role_actors(i18n, mappers)
    } else {
        MessageSet::new()
    };
    result.set(ValidationKind::ProjectRoleActor, role_actor_messages);
    result.set(ValidationKind::User, validate_users(i18n, &mappers.user));
    result.set(ValidationKind::Group, validate_groups(i18n, &mappers.group));
    result.set(
        ValidationKind::IssueLinkType,
        validate_simple_mapper(i18n, &mappers.issue_link_type, keys::ISSUE_LINK_TYPE_MISSING),
    );
    result.set(
        ValidationKind::IssueSecurityLevel,
        validate_issue_security_levels(i18n, &mappers.issue_security_level, backup_project),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::i18n::EnglishCatalog;

    #[test]
    fn can_import_only_without_errors() {
        let mut result = MappingResult::new();
        let mut warn = MessageSet::new();
        warn.add_warning("heads up");
        result.set(ValidationKind::User, warn);
        assert!(result.can_import());

        let mut values = BTreeMap::new();
        let mut err = MessageSet::new();
        err.add_error("option missing");
        values.insert("10001".to_string(), err);
        result.set_custom_field_value_messages(values);
        assert!(!result.can_import());
        assert_eq!(result.error_count(), 1);
        assert_eq!(result.errors()[0].0, ValidationKind::CustomField);
    }

    #[test]
    fn system_field_validation_leaves_mappers_untouched() {
        let mut mappers = MapperRegistry::new();
        mappers.priority.register_old_value("1", Some("Blocker"));
        mappers.priority.flag_value_as_required("1");
        mappers.status.ids.register_old_value("2", Some("Open"));
        mappers.status.flag_value_as_required("2", "1");
        mappers.user.flag_user_as_in_use("fred");
        mappers.group.flag_value_as_required("devs");
        let before = mappers.clone();

        let mut result = MappingResult::new();
        validate_system_fields(
            &EnglishCatalog,
            &mappers,
            &BackupProject::default(),
            &TargetCatalog::default(),
            false,
            &mut result,
        );

        assert_eq!(mappers, before);
        assert!(result.has_errors_for(ValidationKind::Priority));
        assert!(result.has_errors_for(ValidationKind::Status));
        assert!(result.has_errors_for(ValidationKind::User));
        assert!(result.has_errors_for(ValidationKind::Group));
        assert!(!result.has_errors_for(ValidationKind::Resolution));
    }

    #[test]
    fn kinds_serialize_as_map_keys() {
        let mut result = MappingResult::new();
        result.set(ValidationKind::IssueLinkType, MessageSet::new());
        let json = serde_json::to_value(&result).unwrap();
        assert!(json["sets"]["issue_link_type"].is_object());
    }
}
