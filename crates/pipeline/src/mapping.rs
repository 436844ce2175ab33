//! Automatic mapping and validation of a partitioned project.
//!
//! Steps run in dependency order and later steps are skipped when an earlier
//! one left blocking errors:
//!
//! 1. issue types
//! 2. system fields (priorities, resolutions, statuses, projects, link types,
//!    security levels, roles, users, groups, role members)
//! 3. custom fields, only without issue type errors
//! 4. custom field options and values, only without custom field errors
//! 5. project importability and attachment files
//!
//! Nothing here writes to the target; the only I/O is reading the value and
//! attachment partitions and probing the user directory.

use std::path::Path;

use async_trait::async_trait;

use carryover_core::automap;
use carryover_core::backup::{BackupProject, BackupSystemInformation};
use carryover_core::catalog::TargetCatalog;
use carryover_core::error::CoreError;
use carryover_core::external::{names, BackupElement, ExternalAttachment, ExternalCustomFieldValue, FromElement};
use carryover_core::i18n::{keys, I18n};
use carryover_core::mapper::MapperRegistry;
use carryover_core::message::MessageSet;
use carryover_core::options::ProjectImportOptions;
use carryover_core::validation::{
    self, CustomFieldValueValidator, MappingResult, ValidationKind,
};

use crate::error::{HandlerError, ImportError, StoreError};
use crate::partition::{PartitionKind, Partitions};
use crate::scanner::{scan, DispatchTable, EntityHandler};
use crate::store::UserDirectory;

/// Outcome of [`map_and_validate`].
#[derive(Debug, Clone, Default)]
pub struct MappingOutcome {
    pub result: MappingResult,
    /// Attachments whose file was found under the attachment root.
    pub valid_attachment_count: usize,
}

/// Look up every user and group the import needs in the directory and add
/// the existing ones to `catalog`.
pub async fn augment_catalog(
    directory: &dyn UserDirectory,
    mappers: &MapperRegistry,
    catalog: &mut TargetCatalog,
) -> Result<(), StoreError> {
    let mut users: Vec<String> = mappers.user.ids.required_old_ids().map(str::to_string).collect();
    let mut groups: Vec<String> = mappers.group.required_old_ids().map(str::to_string).collect();
    for actor in mappers.project_role_actor.project_role_actors() {
        if actor.is_user_actor() {
            users.push(actor.role_actor.clone());
        } else if actor.is_group_actor() {
            groups.push(actor.role_actor.clone());
        }
    }

    for user in users {
        if !catalog.users.contains(&user) && directory.user_exists(&user).await? {
            catalog.users.insert(user);
        }
    }
    for group in groups {
        if !catalog.groups.contains(&group) && directory.group_exists(&group).await? {
            catalog.groups.insert(group);
        }
    }
    Ok(())
}

/// Map every required id onto the target and validate the result.
///
/// Mapping is idempotent: ids an operator mapped beforehand are kept.
pub async fn map_and_validate(
    i18n: &dyn I18n,
    mappers: &mut MapperRegistry,
    backup_project: &BackupProject,
    system: &BackupSystemInformation,
    catalog: &TargetCatalog,
    options: &ProjectImportOptions,
    partitions: &Partitions,
) -> Result<MappingOutcome, ImportError> {
    let mut result = MappingResult::new();

    automap::map_issue_types(&mut mappers.issue_type, catalog).map_err(CoreError::from)?;
    result.set(
        ValidationKind::IssueType,
        validation::validate_issue_types(i18n, &mappers.issue_type, catalog),
    );

    automap::map_system_fields(mappers, backup_project, catalog).map_err(CoreError::from)?;

    if result.has_errors_for(ValidationKind::IssueType) {
        tracing::info!("Issue types unresolved, skipping custom field mapping");
    } else {
        automap::map_custom_fields(&mut mappers.custom_field, &mappers.issue_type, catalog)
            .map_err(CoreError::from)?;
        result.set(
            ValidationKind::CustomField,
            validation::validate_custom_fields(
                i18n,
                backup_project,
                &mappers.custom_field,
                &mappers.issue_type,
                catalog,
            ),
        );

        if result.has_errors_for(ValidationKind::CustomField) {
            tracing::info!("Custom fields unresolved, skipping option and value validation");
        } else {
            automap::map_custom_field_options(
                &mut mappers.custom_field_option,
                &mappers.custom_field,
                catalog,
            )
            .map_err(CoreError::from)?;
            let value_messages = validate_custom_field_values(i18n, mappers, partitions).await?;
            result.set_custom_field_value_messages(value_messages);
        }
    }

    validation::validate_system_fields(
        i18n,
        mappers,
        backup_project,
        catalog,
        options.overwrite_project_details,
        &mut result,
    );
    result.set(
        ValidationKind::Project,
        validation::validate_project_importable(i18n, backup_project, system, catalog),
    );

    let mut valid_attachment_count = 0;
    if let Some(root) = options.attachment_path() {
        let (messages, valid) =
            validate_attachment_files(i18n, root, backup_project, system, partitions).await?;
        result.set(ValidationKind::FileAttachment, messages);
        valid_attachment_count = valid;
    }

    tracing::info!(
        project_key = %backup_project.key(),
        errors = result.error_count(),
        can_import = result.can_import(),
        "Mapping validated"
    );
    Ok(MappingOutcome {
        result,
        valid_attachment_count,
    })
}

// ---------------------------------------------------------------------------
// Custom field values
// ---------------------------------------------------------------------------

struct ValueValidationHandler<'a> {
    validator: CustomFieldValueValidator<'a>,
}

#[async_trait]
impl EntityHandler for ValueValidationHandler<'_> {
    fn entity_names(&self) -> &'static [&'static str] {
        &[names::CUSTOM_FIELD_VALUE]
    }

    async fn handle_entity(&mut self, element: &BackupElement) -> Result<(), HandlerError> {
        match ExternalCustomFieldValue::from_element(element) {
            Ok(value) => self.validator.validate(&value),
            Err(err) => tracing::warn!(error = %err, "Skipping malformed custom field value"),
        }
        Ok(())
    }
}

/// Option-level messages merged with value-level messages, per old field id.
async fn validate_custom_field_values(
    i18n: &dyn I18n,
    mappers: &MapperRegistry,
    partitions: &Partitions,
) -> Result<std::collections::BTreeMap<String, MessageSet>, ImportError> {
    let mut messages = validation::validate_custom_field_options(i18n, mappers);

    if let Some(file) = partitions.get(PartitionKind::CustomFieldValues) {
        let mut handler = ValueValidationHandler {
            validator: CustomFieldValueValidator::new(i18n, mappers),
        };
        {
            let mut table = DispatchTable::new();
            table.register(&mut handler);
            scan(&file.path, &mut table).await?;
        }
        for (field_id, set) in handler.validator.into_message_sets() {
            messages.entry(field_id).or_default().add_message_set(&set);
        }
    }
    Ok(messages)
}

// ---------------------------------------------------------------------------
// Attachment files
// ---------------------------------------------------------------------------

struct AttachmentFileHandler<'a> {
    i18n: &'a dyn I18n,
    root: &'a Path,
    project_key: &'a str,
    system: &'a BackupSystemInformation,
    messages: MessageSet,
    valid: usize,
}

#[async_trait]
impl EntityHandler for AttachmentFileHandler<'_> {
    fn entity_names(&self) -> &'static [&'static str] {
        &[names::FILE_ATTACHMENT]
    }

    async fn handle_entity(&mut self, element: &BackupElement) -> Result<(), HandlerError> {
        let attachment = match ExternalAttachment::from_element(element) {
            Ok(attachment) => attachment,
            Err(err) => {
                tracing::warn!(error = %err, "Skipping malformed attachment");
                return Ok(());
            }
        };
        let Some(issue_key) = self.system.issue_key(&attachment.issue_id) else {
            return Ok(());
        };
        let path = attachment.file_path(self.root, self.project_key, issue_key);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            self.valid += 1;
        } else {
            self.messages.add_warning(self.i18n.text(
                keys::ATTACHMENT_FILE_MISSING,
                &[&attachment.file_name, issue_key, &path.display().to_string()],
            ));
        }
        Ok(())
    }
}

async fn validate_attachment_files(
    i18n: &dyn I18n,
    root: &Path,
    backup_project: &BackupProject,
    system: &BackupSystemInformation,
    partitions: &Partitions,
) -> Result<(MessageSet, usize), ImportError> {
    let Some(file) = partitions.get(PartitionKind::Attachments) else {
        return Ok((MessageSet::new(), 0));
    };
    let mut handler = AttachmentFileHandler {
        i18n,
        root,
        project_key: backup_project.key(),
        system,
        messages: MessageSet::new(),
        valid: 0,
    };
    {
        let mut table = DispatchTable::new();
        table.register(&mut handler);
        scan(&file.path, &mut table).await?;
    }
    tracing::debug!(
        valid = handler.valid,
        missing = handler.messages.warning_count(),
        "Attachment files checked"
    );
    Ok((handler.messages, handler.valid))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use carryover_core::external::role::GROUP_ROLE_ACTOR_TYPE;
    use carryover_core::external::ExternalProjectRoleActor;

    use super::*;
    use crate::store::memory::MemoryStore;

    #[tokio::test]
    async fn catalog_learns_existing_users_and_groups() {
        let store = MemoryStore::new();
        store.add_user("fred");
        store.add_group("devs");

        let mut mappers = MapperRegistry::new();
        mappers.user.flag_user_as_in_use("fred");
        mappers.user.flag_user_as_in_use("ghost");
        mappers.group.flag_value_as_required("devs");
        mappers.project_role_actor.flag_value_actor_as_in_use(ExternalProjectRoleActor {
            id: Some("1".into()),
            role_id: "10".into(),
            role_type: GROUP_ROLE_ACTOR_TYPE.into(),
            role_actor: "admins".into(),
            ..Default::default()
        });

        let mut catalog = TargetCatalog::default();
        augment_catalog(&store, &mappers, &mut catalog).await.unwrap();

        assert_eq!(catalog.users, BTreeSet::from(["fred".to_string()]));
        assert_eq!(catalog.groups, BTreeSet::from(["devs".to_string()]));
    }
}
