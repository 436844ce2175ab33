use crate::external::ExternalProjectRoleActor;

/// Role memberships collected from the backup for the imported project.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectRoleActorMapper {
    actors: Vec<ExternalProjectRoleActor>,
}

impl ProjectRoleActorMapper {
    pub fn flag_value_actor_as_in_use(&mut self, actor: ExternalProjectRoleActor) {
        self.actors.push(actor);
    }

    pub fn project_role_actors(&self) -> &[ExternalProjectRoleActor] {
        &self.actors
    }

    pub fn len(&self) -> usize {
        self.actors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }
}
