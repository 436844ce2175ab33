use crate::backup::{BackupProject, BackupSystemInformation};
use crate::catalog::TargetCatalog;
use crate::i18n::{keys, I18n};
use crate::message::MessageSet;

/// Whether the target can take this project: same build, same versions of
/// the plugins its custom fields come from, an acceptable default assignee
/// and, when the project already exists, an empty one.
pub fn validate_project_importable(
    i18n: &dyn I18n,
    backup_project: &BackupProject,
    system: &BackupSystemInformation,
    catalog: &TargetCatalog,
) -> MessageSet {
    let mut messages = MessageSet::new();
    validate_build_number(i18n, system, catalog, &mut messages);
    validate_plugin_versions(i18n, backup_project, system, catalog, &mut messages);

    let project = &backup_project.project;
    if project.default_assignee_unassigned(system.unassigned_issues_allowed)
        && !catalog.unassigned_issues_allowed
    {
        messages.add_error(i18n.text(keys::PROJECT_DEFAULT_ASSIGNEE_NOT_ALLOWED, &[&project.name]));
    }

    let Some(existing) = &catalog.existing_project else {
        messages.add_warning(i18n.text(keys::PROJECT_WILL_BE_CREATED, &[backup_project.key()]));
        return messages;
    };

    let checks = [
        (existing.issue_count, keys::PROJECT_HAS_ISSUES),
        (existing.version_count, keys::PROJECT_HAS_VERSIONS),
        (existing.component_count, keys::PROJECT_HAS_COMPONENTS),
    ];
    for (count, key) in checks {
        if count > 0 {
            messages.add_error(i18n.text(key, &[&existing.key, &count.to_string()]));
        }
    }
    messages
}

fn validate_build_number(
    i18n: &dyn I18n,
    system: &BackupSystemInformation,
    catalog: &TargetCatalog,
    messages: &mut MessageSet,
) {
    let Some(current) = catalog.build_number.as_deref() else {
        return;
    };
    let backup = system.build_number.as_deref();
    if !backup.is_some_and(|b| b.trim().eq_ignore_ascii_case(current.trim())) {
        messages.add_error(i18n.text(
            keys::BACKUP_WRONG_BUILD_NUMBER,
            &[current, backup.unwrap_or("unknown")],
        ));
    }
}

/// Plugins missing from the target are left to custom field validation.
fn validate_plugin_versions(
    i18n: &dyn I18n,
    backup_project: &BackupProject,
    system: &BackupSystemInformation,
    catalog: &TargetCatalog,
    messages: &mut MessageSet,
) {
    let project_name = backup_project.project.name.as_str();
    for config in &backup_project.custom_fields {
        let field = &config.field;
        let plugin = field.plugin_key();
        let Some(current) = catalog.plugin_versions.get(plugin) else {
            continue;
        };
        match system.plugin_version(plugin) {
            Some(backup) if backup == current => {}
            Some(backup) => messages.add_error(i18n.text(
                keys::PLUGIN_WRONG_VERSION,
                &[project_name, &field.name, &field.type_key, current, backup],
            )),
            None => messages.add_error(i18n.text(
                keys::PLUGIN_VERSION_NOT_IN_BACKUP,
                &[project_name, &field.name, &field.type_key, current],
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ExistingProject;
    use crate::external::{ExternalCustomField, ExternalCustomFieldConfiguration, ExternalProject};
    use crate::i18n::EnglishCatalog;

    fn validate(project: &BackupProject, system: &BackupSystemInformation, catalog: &TargetCatalog) -> MessageSet {
        validate_project_importable(&EnglishCatalog, project, system, catalog)
    }

    fn project_with_field(type_key: &str) -> BackupProject {
        BackupProject {
            project: ExternalProject {
                name: "Monkey".into(),
                ..Default::default()
            },
            custom_fields: vec![ExternalCustomFieldConfiguration {
                field: ExternalCustomField {
                    id: "500".into(),
                    name: "Colour".into(),
                    type_key: type_key.into(),
                },
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn absent_project_is_a_warning() {
        let messages = validate(
            &BackupProject::default(),
            &BackupSystemInformation::default(),
            &TargetCatalog::default(),
        );
        assert!(!messages.has_any_errors());
        assert_eq!(messages.warning_count(), 1);
    }

    #[test]
    fn populated_project_is_rejected() {
        let catalog = TargetCatalog {
            existing_project: Some(ExistingProject {
                id: "1".into(),
                key: "MNK".into(),
                issue_count: 3,
                component_count: 1,
                ..Default::default()
            }),
            ..Default::default()
        };
        let messages = validate(&BackupProject::default(), &BackupSystemInformation::default(), &catalog);
        let errors: Vec<&str> = messages.errors().collect();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("3 issue(s)"));
        assert!(errors[1].contains("1 component(s)"));
    }

    #[test]
    fn empty_existing_project_passes() {
        let catalog = TargetCatalog {
            existing_project: Some(ExistingProject::default()),
            ..Default::default()
        };
        assert!(validate(&BackupProject::default(), &BackupSystemInformation::default(), &catalog).is_empty());
    }

    // -----------------------------------------------------------------------
    // Test: build number
    // -----------------------------------------------------------------------

    #[test]
    fn build_number_must_match_ignoring_case() {
        let catalog = TargetCatalog {
            build_number: Some("805B".into()),
            ..Default::default()
        };
        let mut system = BackupSystemInformation {
            build_number: Some("805b".into()),
            ..Default::default()
        };
        assert!(!validate(&BackupProject::default(), &system, &catalog).has_any_errors());

        system.build_number = Some("804".into());
        let messages = validate(&BackupProject::default(), &system, &catalog);
        let errors: Vec<&str> = messages.errors().collect();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("build '804'"));
        assert!(errors[0].contains("build '805B'"));

        system.build_number = None;
        assert!(validate(&BackupProject::default(), &system, &catalog).has_any_errors());
    }

    #[test]
    fn unknown_target_build_skips_the_comparison() {
        let system = BackupSystemInformation {
            build_number: Some("804".into()),
            ..Default::default()
        };
        assert!(!validate(&BackupProject::default(), &system, &TargetCatalog::default()).has_any_errors());
    }

    // -----------------------------------------------------------------------
    // Test: plugin versions
    // -----------------------------------------------------------------------

    #[test]
    fn plugin_version_must_match_backup() {
        let project = project_with_field("com.acme.fields:select");
        let catalog = TargetCatalog {
            plugin_versions: [("com.acme.fields".to_string(), "2.0".to_string())].into(),
            ..Default::default()
        };
        let mut system = BackupSystemInformation {
            plugin_versions: [("com.acme.fields".to_string(), "2.0".to_string())].into(),
            ..Default::default()
        };
        assert!(!validate(&project, &system, &catalog).has_any_errors());

        system.plugin_versions.insert("com.acme.fields".into(), "1.4".into());
        let messages = validate(&project, &system, &catalog);
        let errors: Vec<&str> = messages.errors().collect();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("'Colour'"));
        assert!(errors[0].contains("version '1.4' in the backup"));
        assert!(errors[0].contains("version '2.0' in the target"));

        system.plugin_versions.clear();
        let messages = validate(&project, &system, &catalog);
        let errors: Vec<&str> = messages.errors().collect();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("does not record a version"));
    }

    #[test]
    fn plugin_absent_from_target_is_not_checked() {
        let project = project_with_field("com.other:textfield");
        let system = BackupSystemInformation {
            plugin_versions: [("com.other".to_string(), "1.0".to_string())].into(),
            ..Default::default()
        };
        assert!(!validate(&project, &system, &TargetCatalog::default()).has_any_errors());
    }

    // -----------------------------------------------------------------------
    // Test: default assignee
    // -----------------------------------------------------------------------

    #[test]
    fn unassigned_default_needs_target_support() {
        let mut project = project_with_field("x:textfield");
        project.project.assignee_type = Some("3".into());
        let mut catalog = TargetCatalog::default();

        let messages = validate(&project, &BackupSystemInformation::default(), &catalog);
        let errors: Vec<&str> = messages.errors().collect();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("'Monkey'"));

        catalog.unassigned_issues_allowed = true;
        assert!(!validate(&project, &BackupSystemInformation::default(), &catalog).has_any_errors());
    }

    #[test]
    fn missing_assignee_type_follows_backup_setting() {
        let project = project_with_field("x:textfield");
        let system = BackupSystemInformation {
            unassigned_issues_allowed: true,
            ..Default::default()
        };
        assert!(validate(&project, &system, &TargetCatalog::default()).has_any_errors());
        assert!(!validate(&project, &BackupSystemInformation::default(), &TargetCatalog::default())
            .has_any_errors());
    }
}
