use super::{
    CustomFieldMapper, CustomFieldOptionMapper, IdMapper, IssueTypeMapper, ProjectRoleActorMapper,
    StatusMapper, UserMapper,
};

/// Every mapper used by one import.
///
/// Created empty when the import starts. Filled during partitioning and
/// mapping, then read during validation and persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapperRegistry {
    pub project: IdMapper,
    pub issue: IdMapper,
    pub user: UserMapper,
    pub group: IdMapper,
    pub issue_type: IssueTypeMapper,
    pub status: StatusMapper,
    pub priority: IdMapper,
    pub resolution: IdMapper,
    pub version: IdMapper,
    pub component: IdMapper,
    pub custom_field: CustomFieldMapper,
    pub custom_field_option: CustomFieldOptionMapper,
    pub project_role: IdMapper,
    pub project_role_actor: ProjectRoleActorMapper,
    pub issue_link_type: IdMapper,
    pub issue_security_level: IdMapper,
    pub comment: IdMapper,
    pub change_group: IdMapper,
}

impl Default for MapperRegistry {
    fn default() -> Self {
        Self {
            project: IdMapper::new("project"),
            issue: IdMapper::new("issue"),
            user: UserMapper::default(),
            group: IdMapper::new("group"),
            issue_type: IssueTypeMapper::default(),
            status: StatusMapper::default(),
            priority: IdMapper::new("priority"),
            resolution: IdMapper::new("resolution"),
            version: IdMapper::new("version"),
            component: IdMapper::new("component"),
            custom_field: CustomFieldMapper::default(),
            custom_field_option: CustomFieldOptionMapper::default(),
            project_role: IdMapper::new("project role"),
            project_role_actor: ProjectRoleActorMapper::default(),
            issue_link_type: IdMapper::new("issue link type"),
            issue_security_level: IdMapper::new("issue security level"),
            comment: IdMapper::new("comment"),
            change_group: IdMapper::new("change group"),
        }
    }
}

impl MapperRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}
