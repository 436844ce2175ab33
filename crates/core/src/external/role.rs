use serde::{Deserialize, Serialize};

use super::{expect_entity, names, BackupElement, FromElement};
use crate::error::ParseError;

pub const USER_ROLE_ACTOR_TYPE: &str = "atlassian-user-role-actor";
pub const GROUP_ROLE_ACTOR_TYPE: &str = "atlassian-group-role-actor";

/// Membership of a user or group in a project role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalProjectRoleActor {
    pub id: Option<String>,
    /// `None` for default role actors that belong to no project.
    pub project_id: Option<String>,
    pub role_id: String,
    pub role_type: String,
    /// User name or group name, depending on `role_type`.
    pub role_actor: String,
}

impl ExternalProjectRoleActor {
    pub fn is_user_actor(&self) -> bool {
        self.role_type == USER_ROLE_ACTOR_TYPE
    }

    pub fn is_group_actor(&self) -> bool {
        self.role_type == GROUP_ROLE_ACTOR_TYPE
    }
}

impl FromElement for ExternalProjectRoleActor {
    const ENTITY: &'static str = names::PROJECT_ROLE_ACTOR;

    fn from_element(el: &BackupElement) -> Result<Self, ParseError> {
        expect_entity::<Self>(el)?;
        Ok(Self {
            id: el.optional("id"),
            project_id: el.optional("pid"),
            role_id: el.require("projectroleid")?,
            role_type: el.require("roletype")?,
            role_actor: el.require("roletypeparameter")?,
        })
    }
}
