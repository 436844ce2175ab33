use std::collections::BTreeMap;

use super::IdMapper;
use crate::error::MapperError;
use crate::external::ExternalUser;

/// User mapper. Old and new ids are user names.
///
/// Keeps the backup's account details so missing users can be created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserMapper {
    pub ids: IdMapper,
    users: BTreeMap<String, ExternalUser>,
}

impl Default for UserMapper {
    fn default() -> Self {
        Self {
            ids: IdMapper::new("user"),
            users: BTreeMap::new(),
        }
    }
}

impl UserMapper {
    pub fn register_user(&mut self, user: ExternalUser) {
        self.ids
            .register_old_value(&user.name, Some(user.display_name()));
        self.users.insert(user.name.clone(), user);
    }

    pub fn flag_user_as_in_use(&mut self, user_name: &str) {
        self.ids.flag_value_as_required(user_name);
    }

    pub fn external_user(&self, user_name: &str) -> Option<&ExternalUser> {
        self.users.get(user_name)
    }

    /// Record that `user_name` exists in the target directory.
    pub fn map_existing_user(&mut self, user_name: &str) -> Result<(), MapperError> {
        self.ids.register_old_value(user_name, None);
        self.ids.map_value(user_name, user_name)
    }

    pub fn user_exists(&self, user_name: &str) -> bool {
        self.ids.mapped_id(user_name).is_some()
    }

    /// Target user name for a backup user name. Unresolved names pass through unchanged.
    pub fn mapped_user_key<'a>(&'a self, user_name: &'a str) -> &'a str {
        self.ids.mapped_id(user_name).unwrap_or(user_name)
    }

    /// Required users missing from the target whose details are in the backup.
    pub fn users_to_auto_create(&self) -> Vec<&ExternalUser> {
        self.ids
            .unmapped_required()
            .into_iter()
            .filter_map(|name| self.users.get(name))
            .collect()
    }

    /// Required users missing from the target with no details to create them from.
    pub fn unresolvable_users(&self) -> Vec<&str> {
        self.ids
            .unmapped_required()
            .into_iter()
            .filter(|name| !self.users.contains_key(*name))
            .collect()
    }

    pub fn display_name(&self, user_name: &str) -> String {
        self.ids.display_name(user_name)
    }
}
