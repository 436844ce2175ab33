//! Message catalog used for every user-facing validation and result message.
//!
//! Templates use positional placeholders (`{0}`, `{1}`, ...). Lookups of
//! unknown keys return the key itself so a missing translation is visible
//! rather than fatal.

/// Locale-aware text lookup.
pub trait I18n: Send + Sync {
    fn text(&self, key: &str, args: &[&str]) -> String;
}

/// Message keys.
pub mod keys {
    pub const ISSUE_TYPE_MISSING: &str = "import.issuetype.missing";
    pub const ISSUE_TYPE_SUBTASK_IN_BACKUP: &str = "import.issuetype.subtask.in.backup";
    pub const ISSUE_TYPE_SUBTASK_IN_TARGET: &str = "import.issuetype.subtask.in.target";

    pub const CUSTOM_FIELD_MISSING: &str = "import.customfield.missing";
    pub const CUSTOM_FIELD_WRONG_TYPE: &str = "import.customfield.wrong.type";
    pub const CUSTOM_FIELD_NOT_IN_PROJECT: &str = "import.customfield.not.in.project";
    pub const CUSTOM_FIELD_NOT_FOR_ISSUE_TYPE: &str = "import.customfield.not.for.issuetype";
    pub const CUSTOM_FIELD_DUPLICATE: &str = "import.customfield.duplicate";
    pub const CUSTOM_FIELD_OPTION_MISSING: &str = "import.customfield.option.missing";

    pub const STATUS_MISSING: &str = "import.status.missing";
    pub const STATUS_NOT_IN_WORKFLOW: &str = "import.status.not.in.workflow";
    pub const STATUS_DUPLICATE: &str = "import.status.duplicate";

    pub const PRIORITY_MISSING: &str = "import.priority.missing";
    pub const RESOLUTION_MISSING: &str = "import.resolution.missing";
    pub const PROJECT_ROLE_MISSING: &str = "import.projectrole.missing";
    pub const ISSUE_LINK_TYPE_MISSING: &str = "import.issuelinktype.missing";
    pub const SECURITY_LEVEL_MISSING: &str = "import.securitylevel.missing";

    pub const USER_MISSING: &str = "import.user.missing";
    pub const USER_WILL_BE_CREATED: &str = "import.user.will.be.created";
    pub const GROUP_MISSING: &str = "import.group.missing";
    pub const ROLE_ACTOR_USER_MISSING: &str = "import.roleactor.user.missing";
    pub const ROLE_ACTOR_GROUP_MISSING: &str = "import.roleactor.group.missing";

    pub const ATTACHMENT_FILE_MISSING: &str = "import.attachment.file.missing";

    pub const PROJECT_HAS_ISSUES: &str = "import.project.has.issues";
    pub const PROJECT_HAS_VERSIONS: &str = "import.project.has.versions";
    pub const PROJECT_HAS_COMPONENTS: &str = "import.project.has.components";
    pub const PROJECT_WILL_BE_CREATED: &str = "import.project.will.be.created";
    pub const PROJECT_DEFAULT_ASSIGNEE_NOT_ALLOWED: &str = "import.project.default.assignee.not.allowed";
    pub const BACKUP_WRONG_BUILD_NUMBER: &str = "import.backup.wrong.build.number";
    pub const PLUGIN_WRONG_VERSION: &str = "import.plugin.wrong.version";
    pub const PLUGIN_VERSION_NOT_IN_BACKUP: &str = "import.plugin.version.not.in.backup";

    pub const PERSIST_USER_FAILED: &str = "import.persist.user.failed";
    pub const PERSIST_VERSION_FAILED: &str = "import.persist.version.failed";
    pub const PERSIST_COMPONENT_FAILED: &str = "import.persist.component.failed";
    pub const PERSIST_ISSUE_FAILED: &str = "import.persist.issue.failed";
    pub const PERSIST_ENTITY_FAILED: &str = "import.persist.entity.failed";
    pub const PERSIST_CUSTOM_FIELD_VALUE_FAILED: &str = "import.persist.customfieldvalue.failed";
    pub const PERSIST_ATTACHMENT_FAILED: &str = "import.persist.attachment.failed";
    pub const PERSIST_ROLE_ACTOR_FAILED: &str = "import.persist.roleactor.failed";
    pub const PERSIST_REINDEX_FAILED: &str = "import.persist.reindex.failed";
    pub const PERSIST_TASK_PANICKED: &str = "import.persist.task.panicked";

    pub const PROGRESS_ENTITY_COUNT: &str = "import.progress.entity.count";
    pub const PROGRESS_USERS: &str = "import.progress.users";
    pub const PROGRESS_PROJECT: &str = "import.progress.project";
    pub const PROGRESS_ISSUES: &str = "import.progress.issues";
    pub const PROGRESS_ISSUE_RELATED: &str = "import.progress.issue.related";
    pub const PROGRESS_SECOND_DEGREE: &str = "import.progress.second.degree";
    pub const PROGRESS_CUSTOM_FIELD_VALUES: &str = "import.progress.customfieldvalues";
    pub const PROGRESS_ATTACHMENTS: &str = "import.progress.attachments";
    pub const PROGRESS_ROLE_MEMBERS: &str = "import.progress.role.members";
    pub const PROGRESS_REINDEX: &str = "import.progress.reindex";
}

/// Built-in English catalog.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnglishCatalog;

impl EnglishCatalog {
    fn template(key: &str) -> Option<&'static str> {
        use keys::*;

        let template = match key {
            ISSUE_TYPE_MISSING => "The issue type '{0}' is required for the import but does not exist in the target system.",
            ISSUE_TYPE_SUBTASK_IN_BACKUP => "The issue type '{0}' is a sub-task type in the backup but a standard issue type in the target system.",
            ISSUE_TYPE_SUBTASK_IN_TARGET => "The issue type '{0}' is a standard issue type in the backup but a sub-task type in the target system.",
            CUSTOM_FIELD_MISSING => "The custom field '{0}' of type '{1}' is required for the import but does not exist in the target system.",
            CUSTOM_FIELD_WRONG_TYPE => "The custom field '{0}' is of type '{1}' in the backup but of type '{2}' in the target system.",
            CUSTOM_FIELD_NOT_IN_PROJECT => "The custom field '{0}' is not configured for project '{1}' in the target system.",
            CUSTOM_FIELD_NOT_FOR_ISSUE_TYPE => "The custom field '{0}' is not configured for issue type '{1}' in the target system.",
            CUSTOM_FIELD_DUPLICATE => "The custom fields {0} from the backup are all mapped to the target custom field '{1}'.",
            CUSTOM_FIELD_OPTION_MISSING => "The custom field '{0}' requires option '{1}' for the import but it does not exist in the target system.",
            STATUS_MISSING => "The status '{0}' is required for the import but does not exist in the target system.",
            STATUS_NOT_IN_WORKFLOW => "The status '{0}' is used by issues of type '{1}' but is not part of that issue type's workflow in the target system.",
            STATUS_DUPLICATE => "The statuses {0} from the backup are all mapped to the target status '{1}'.",
            PRIORITY_MISSING => "The priority '{0}' is required for the import but does not exist in the target system.",
            RESOLUTION_MISSING => "The resolution '{0}' is required for the import but does not exist in the target system.",
            PROJECT_ROLE_MISSING => "The project role '{0}' is required for the import but does not exist in the target system.",
            ISSUE_LINK_TYPE_MISSING => "The issue link type '{0}' is required for the import but does not exist in the target system.",
            SECURITY_LEVEL_MISSING => "The issue security level '{0}' is required for the import but does not exist in the security scheme of project '{1}'.",
            USER_MISSING => "The user '{0}' is required for the import but does not exist in the target system and the backup holds no details to create it.",
            USER_WILL_BE_CREATED => "The user '{0}' does not exist in the target system and will be created by the import.",
            GROUP_MISSING => "The group '{0}' is required for the import but does not exist in the target system.",
            ROLE_ACTOR_USER_MISSING => "The user '{0}' does not exist and will not be added to the project role '{1}'.",
            ROLE_ACTOR_GROUP_MISSING => "The group '{0}' does not exist and will not be added to the project role '{1}'.",
            ATTACHMENT_FILE_MISSING => "The attachment '{0}' of issue '{1}' was not found at '{2}' and will not be imported.",
            PROJECT_HAS_ISSUES => "The existing project '{0}' already contains {1} issue(s); only an empty project can be imported into.",
            PROJECT_HAS_VERSIONS => "The existing project '{0}' already contains {1} version(s); only an empty project can be imported into.",
            PROJECT_HAS_COMPONENTS => "The existing project '{0}' already contains {1} component(s); only an empty project can be imported into.",
            PROJECT_WILL_BE_CREATED => "The project '{0}' does not exist in the target system and will be created.",
            PROJECT_DEFAULT_ASSIGNEE_NOT_ALLOWED => "The project '{0}' has 'Unassigned' as its default assignee but the target system does not allow unassigned issues.",
            BACKUP_WRONG_BUILD_NUMBER => "The backup was created by build '{1}' but the target system runs build '{0}'; only backups of the same build can be imported.",
            PLUGIN_WRONG_VERSION => "The project '{0}' uses custom field '{1}' of type '{2}', provided by plugin version '{4}' in the backup but version '{3}' in the target system.",
            PLUGIN_VERSION_NOT_IN_BACKUP => "The project '{0}' uses custom field '{1}' of type '{2}', provided by plugin version '{3}' in the target system, but the backup does not record a version for that plugin.",
            PERSIST_USER_FAILED => "Could not create user '{0}': {1}",
            PERSIST_VERSION_FAILED => "Could not create version '{0}': {1}",
            PERSIST_COMPONENT_FAILED => "Could not create component '{0}': {1}",
            PERSIST_ISSUE_FAILED => "Could not create issue '{0}': {1}",
            PERSIST_ENTITY_FAILED => "Could not create {0} '{1}' of issue '{2}': {3}",
            PERSIST_CUSTOM_FIELD_VALUE_FAILED => "Could not create a value of custom field '{0}' on issue '{1}': {2}",
            PERSIST_ATTACHMENT_FAILED => "Could not create attachment '{0}' of issue '{1}': {2}",
            PERSIST_ROLE_ACTOR_FAILED => "Could not add '{0}' to project role '{1}': {2}",
            PERSIST_REINDEX_FAILED => "Reindexing the imported issues failed: {0}",
            PERSIST_TASK_PANICKED => "An import task failed unexpectedly: {0}",
            PROGRESS_ENTITY_COUNT => "{0}: {1} of {2} processed",
            PROGRESS_USERS => "Creating users",
            PROGRESS_PROJECT => "Creating project, versions and components",
            PROGRESS_ISSUES => "Importing issues",
            PROGRESS_ISSUE_RELATED => "Importing issue-related data",
            PROGRESS_SECOND_DEGREE => "Importing change items and properties",
            PROGRESS_CUSTOM_FIELD_VALUES => "Importing custom field values",
            PROGRESS_ATTACHMENTS => "Importing attachments",
            PROGRESS_ROLE_MEMBERS => "Importing project role members",
            PROGRESS_REINDEX => "Reindexing imported issues",
            _ => return None,
        };
        Some(template)
    }
}

impl I18n for EnglishCatalog {
    fn text(&self, key: &str, args: &[&str]) -> String {
        match Self::template(key) {
            Some(template) => format_template(template, args),
            None => key.to_string(),
        }
    }
}

/// Replace `{n}` placeholders with `args[n]`. Placeholders without an argument are kept.
pub fn format_template(template: &str, args: &[&str]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                let inner = &after[..close];
                match inner.parse::<usize>().ok().and_then(|i| args.get(i)) {
                    Some(arg) => out.push_str(arg),
                    None => {
                        out.push('{');
                        out.push_str(inner);
                        out.push('}');
                    }
                }
                rest = &after[close + 1..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_positional_arguments() {
        let text = EnglishCatalog.text(keys::CUSTOM_FIELD_MISSING, &["Colour", "select"]);
        assert_eq!(
            text,
            "The custom field 'Colour' of type 'select' is required for the import but does not exist in the target system."
        );
    }

    #[test]
    fn unknown_key_is_returned_verbatim() {
        assert_eq!(EnglishCatalog.text("no.such.key", &[]), "no.such.key");
    }

    #[test]
    fn missing_arguments_leave_placeholder() {
        assert_eq!(format_template("{0} and {1}", &["a"]), "a and {1}");
        assert_eq!(format_template("{not a number}", &[]), "{not a number}");
        assert_eq!(format_template("dangling {", &[]), "dangling {");
    }
}
