use crate::i18n::{keys, I18n};
use crate::mapper::{IdMapper, MapperRegistry, UserMapper};
use crate::message::MessageSet;

/// Missing users the backup can describe are created by the import (warning);
/// the rest block it.
pub fn validate_users(i18n: &dyn I18n, mapper: &UserMapper) -> MessageSet {
    let mut messages = MessageSet::new();
    for name in mapper.unresolvable_users() {
        messages.add_error(i18n.text(keys::USER_MISSING, &[name]));
    }
    for user in mapper.users_to_auto_create() {
        messages.add_warning(i18n.text(keys::USER_WILL_BE_CREATED, &[&user.name]));
    }
    messages
}

pub fn validate_groups(i18n: &dyn I18n, mapper: &IdMapper) -> MessageSet {
    let mut messages = MessageSet::new();
    for name in mapper.unmapped_required() {
        messages.add_error(i18n.text(keys::GROUP_MISSING, &[name]));
    }
    messages
}

/// Role members that will be skipped because their user or group is unknown.
pub fn validate_project_role_actors(i18n: &dyn I18n, mappers: &MapperRegistry) -> MessageSet {
    let mut messages = MessageSet::new();
    for actor in mappers.project_role_actor.project_role_actors() {
        let name = actor.role_actor.as_str();
        let role = mappers.project_role.display_name(&actor.role_id);
        if actor.is_user_actor() && !mappers.user.user_exists(name) {
            let created = mappers
                .user
                .users_to_auto_create()
                .iter()
                .any(|u| u.name == name);
            if !created {
                messages.add_warning(i18n.text(keys::ROLE_ACTOR_USER_MISSING, &[name, &role]));
            }
        } else if actor.is_group_actor() && mappers.group.mapped_id(name).is_none() {
            messages.add_warning(i18n.text(keys::ROLE_ACTOR_GROUP_MISSING, &[name, &role]));
        }
    }
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::role::{GROUP_ROLE_ACTOR_TYPE, USER_ROLE_ACTOR_TYPE};
    use crate::external::{ExternalProjectRoleActor, ExternalUser};
    use crate::i18n::EnglishCatalog;

    #[test]
    fn users_with_details_are_created_others_block() {
        let mut mapper = UserMapper::default();
        mapper.register_user(ExternalUser {
            name: "fred".into(),
            full_name: Some("Fred".into()),
            email: Some("fred@example.com".into()),
            active: true,
        });
        mapper.flag_user_as_in_use("fred");
        mapper.flag_user_as_in_use("ghost");
        mapper.flag_user_as_in_use("admin");
        mapper.map_existing_user("admin").unwrap();

        let messages = validate_users(&EnglishCatalog, &mapper);
        assert_eq!(messages.error_count(), 1);
        assert!(messages.errors().next().unwrap().contains("'ghost'"));
        assert_eq!(messages.warning_count(), 1);
        assert!(messages.warnings().next().unwrap().contains("'fred'"));
    }

    #[test]
    fn unknown_role_members_are_warnings() {
        let mut mappers = MapperRegistry::new();
        mappers.project_role.register_old_value("10", Some("Developers"));
        mappers.project_role_actor.flag_value_actor_as_in_use(ExternalProjectRoleActor {
            role_id: "10".into(),
            role_type: USER_ROLE_ACTOR_TYPE.into(),
            role_actor: "ghost".into(),
            ..Default::default()
        });
        mappers.project_role_actor.flag_value_actor_as_in_use(ExternalProjectRoleActor {
            role_id: "10".into(),
            role_type: GROUP_ROLE_ACTOR_TYPE.into(),
            role_actor: "devs".into(),
            ..Default::default()
        });

        let messages = validate_project_role_actors(&EnglishCatalog, &mappers);
        assert!(!messages.has_any_errors());
        let warnings: Vec<&str> = messages.warnings().collect();
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].contains("project role 'Developers'"));

        mappers.group.register_old_value("devs", Some("devs"));
        mappers.group.map_value("devs", "devs").unwrap();
        assert_eq!(validate_project_role_actors(&EnglishCatalog, &mappers).warning_count(), 1);
    }
}
