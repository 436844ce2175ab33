//! Automatic mapping of backup ids onto equivalent target entities.
//!
//! Each function handles one entity kind and consumes only mappers resolved
//! by earlier steps. The required order is:
//!
//! 1. priorities, resolutions
//! 2. issue types
//! 3. statuses (need issue types)
//! 4. custom fields (need issue types)
//! 5. custom field options (need custom fields)
//! 6. projects, issue link types, issue security levels, project roles
//! 7. users, groups
//!
//! Ids that already carry a mapping (set by an operator) are left alone, so
//! running a step twice changes nothing.

use crate::backup::BackupProject;
use crate::catalog::{find_by_name, same_name, NamedEntity, TargetCatalog};
use crate::error::MapperError;
use crate::mapper::{
    CustomFieldMapper, CustomFieldOptionMapper, IdMapper, IssueTypeMapper, MapperRegistry,
    StatusMapper, UserMapper,
};

/// Registered, still unmapped old ids with their display key.
fn unmapped_with_keys(mapper: &IdMapper) -> Vec<(String, String)> {
    mapper
        .registered_old_ids()
        .filter(|id| mapper.mapped_id(id).is_none())
        .filter_map(|id| mapper.key(id).map(|key| (id.to_string(), key.to_string())))
        .collect()
}

fn map_by_name(mapper: &mut IdMapper, targets: &[NamedEntity]) -> Result<(), MapperError> {
    for (old_id, name) in unmapped_with_keys(mapper) {
        if let Some(target) = find_by_name(targets, &name) {
            mapper.map_value(&old_id, &target.id)?;
        }
    }
    Ok(())
}

pub fn map_priorities(mapper: &mut IdMapper, catalog: &TargetCatalog) -> Result<(), MapperError> {
    map_by_name(mapper, &catalog.priorities)
}

pub fn map_resolutions(mapper: &mut IdMapper, catalog: &TargetCatalog) -> Result<(), MapperError> {
    map_by_name(mapper, &catalog.resolutions)
}

/// Same name and same sub-task flag.
pub fn map_issue_types(
    mapper: &mut IssueTypeMapper,
    catalog: &TargetCatalog,
) -> Result<(), MapperError> {
    for (old_id, name) in unmapped_with_keys(&mapper.ids) {
        let subtask = mapper.is_subtask(&old_id);
        let found = catalog
            .issue_types
            .iter()
            .find(|t| same_name(&t.name, &name) && t.subtask == subtask);
        if let Some(target) = found {
            mapper.ids.map_value(&old_id, &target.id)?;
        }
    }
    Ok(())
}

/// Same name, and valid in the workflow of every mapped issue type using it.
pub fn map_statuses(
    mapper: &mut StatusMapper,
    issue_types: &IssueTypeMapper,
    catalog: &TargetCatalog,
) -> Result<(), MapperError> {
    for (old_id, name) in unmapped_with_keys(&mapper.ids) {
        let Some(target) = catalog.statuses.iter().find(|s| same_name(&s.name, &name)) else {
            continue;
        };
        let valid = mapper
            .issue_types_for_status(&old_id)
            .filter_map(|old_type| issue_types.ids.mapped_id(old_type))
            .all(|new_type| target.valid_for_issue_type(new_type));
        if valid {
            mapper.ids.map_value(&old_id, &target.id)?;
        }
    }
    Ok(())
}

/// Same name and type, configured for the project and every mapped issue type using it.
///
/// Required fields whose type the target cannot import are marked ignored.
pub fn map_custom_fields(
    mapper: &mut CustomFieldMapper,
    issue_types: &IssueTypeMapper,
    catalog: &TargetCatalog,
) -> Result<(), MapperError> {
    let unsupported: Vec<String> = mapper
        .ids
        .required_old_ids()
        .filter(|id| {
            mapper
                .type_key(id)
                .is_some_and(|t| catalog.unsupported_field_types.contains(t))
        })
        .map(str::to_string)
        .collect();
    for id in unsupported {
        mapper.ignore_custom_field(&id);
    }

    let project_id = catalog.existing_project_id();
    let candidates: Vec<String> = mapper
        .required_fields()
        .filter(|id| mapper.ids.mapped_id(id).is_none())
        .map(str::to_string)
        .collect();

    for old_id in candidates {
        let (Some(name), Some(type_key)) = (mapper.ids.key(&old_id), mapper.type_key(&old_id))
        else {
            continue;
        };
        let found = catalog.custom_fields.iter().find(|f| {
            same_name(&f.name, name)
                && f.type_key == type_key
                && f.in_project_context(project_id)
                && mapper
                    .issue_types_in_use(&old_id)
                    .filter_map(|old_type| issue_types.ids.mapped_id(old_type))
                    .all(|new_type| f.in_issue_type_context(new_type))
        });
        if let Some(target) = found {
            let new_id = target.id.clone();
            mapper.ids.map_value(&old_id, &new_id)?;
        }
    }
    Ok(())
}

/// Same value under the mapped field; child options also need their parent mapped.
pub fn map_custom_field_options(
    mapper: &mut CustomFieldOptionMapper,
    custom_fields: &CustomFieldMapper,
    catalog: &TargetCatalog,
) -> Result<(), MapperError> {
    for (old_field, new_field) in custom_fields.ids.mapped_values() {
        let Some(target_field) = catalog.custom_field(new_field) else {
            continue;
        };
        let pending: Vec<(String, String, Option<String>)> = mapper
            .options_for_field(old_field)
            .into_iter()
            .filter(|o| mapper.ids.mapped_id(&o.id).is_none())
            .map(|o| (o.id.clone(), o.value.clone(), o.parent_id.clone()))
            .collect();

        for (old_id, value, old_parent) in pending {
            let new_parent = match &old_parent {
                None => None,
                Some(parent) => match mapper.ids.mapped_id(parent) {
                    Some(mapped) => Some(mapped.to_string()),
                    None => continue,
                },
            };
            let found = target_field
                .options
                .iter()
                .find(|o| o.value == value && o.parent_id == new_parent);
            if let Some(target) = found {
                mapper.ids.map_value(&old_id, &target.id)?;
            }
        }
    }
    Ok(())
}

/// Same key. A project missing from the target stays unmapped until it is created.
pub fn map_projects(
    mapper: &mut IdMapper,
    backup_project: &BackupProject,
    catalog: &TargetCatalog,
) -> Result<(), MapperError> {
    let old_id = &backup_project.project.id;
    if mapper.mapped_id(old_id).is_some() {
        return Ok(());
    }
    if let Some(existing) = &catalog.existing_project {
        if existing.key == backup_project.project.key {
            mapper.register_old_value(old_id, Some(&backup_project.project.key));
            mapper.map_value(old_id, &existing.id)?;
        }
    }
    Ok(())
}

pub fn map_issue_link_types(
    mapper: &mut IdMapper,
    catalog: &TargetCatalog,
) -> Result<(), MapperError> {
    map_by_name(mapper, &catalog.issue_link_types)
}

pub fn map_issue_security_levels(
    mapper: &mut IdMapper,
    catalog: &TargetCatalog,
) -> Result<(), MapperError> {
    map_by_name(mapper, &catalog.security_levels)
}

pub fn map_project_roles(mapper: &mut IdMapper, catalog: &TargetCatalog) -> Result<(), MapperError> {
    map_by_name(mapper, &catalog.project_roles)
}

/// Required users present in the directory map onto themselves.
pub fn map_users(mapper: &mut UserMapper, catalog: &TargetCatalog) -> Result<(), MapperError> {
    let existing: Vec<String> = mapper
        .ids
        .unmapped_required()
        .into_iter()
        .filter(|name| catalog.users.contains(*name))
        .map(str::to_string)
        .collect();
    for name in existing {
        mapper.map_existing_user(&name)?;
    }
    Ok(())
}

/// Required groups present in the directory map onto themselves.
pub fn map_groups(mapper: &mut IdMapper, catalog: &TargetCatalog) -> Result<(), MapperError> {
    let existing: Vec<String> = mapper
        .unmapped_required()
        .into_iter()
        .filter(|name| catalog.groups.contains(*name))
        .map(str::to_string)
        .collect();
    for name in existing {
        mapper.register_old_value(&name, Some(&name));
        mapper.map_value(&name, &name)?;
    }
    Ok(())
}

/// Role members that exist in the directory map onto themselves.
///
/// Role actors are not flagged required, so they are resolved separately;
/// the ones left unmapped are skipped with a warning.
pub fn map_role_actor_members(mappers: &mut MapperRegistry, catalog: &TargetCatalog) -> Result<(), MapperError> {
    let actors = mappers.project_role_actor.project_role_actors().to_vec();
    for actor in actors {
        let name = actor.role_actor.as_str();
        if actor.is_user_actor() && catalog.users.contains(name) && !mappers.user.user_exists(name) {
            mappers.user.map_existing_user(name)?;
        } else if actor.is_group_actor()
            && catalog.groups.contains(name)
            && mappers.group.mapped_id(name).is_none()
        {
            mappers.group.register_old_value(name, Some(name));
            mappers.group.map_value(name, name)?;
        }
    }
    Ok(())
}

/// Steps 1 to 3 plus the kinds in step 6 and 7 that do not depend on custom fields.
pub fn map_system_fields(
    mappers: &mut MapperRegistry,
    backup_project: &BackupProject,
    catalog: &TargetCatalog,
) -> Result<(), MapperError> {
    map_priorities(&mut mappers.priority, catalog)?;
    map_resolutions(&mut mappers.resolution, catalog)?;
    map_statuses(&mut mappers.status, &mappers.issue_type, catalog)?;
    map_projects(&mut mappers.project, backup_project, catalog)?;
    map_issue_link_types(&mut mappers.issue_link_type, catalog)?;
    map_issue_security_levels(&mut mappers.issue_security_level, catalog)?;
    map_project_roles(&mut mappers.project_role, catalog)?;
    map_users(&mut mappers.user, catalog)?;
    map_groups(&mut mappers.group, catalog)?;
    map_role_actor_members(mappers, catalog)?;
    Ok(())
}
