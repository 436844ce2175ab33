//! In-memory target system.
//!
//! Backs the worker's dry runs and the test suite. Enforces the referential
//! rules a real store would: issues need their project, issue-related rows
//! need their issue, change items need their change group, and issue keys
//! are unique.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use carryover_core::catalog::{ExistingProject, TargetCatalog};
use carryover_core::external::{
    names, EntityRepresentation, ExternalAttachment, ExternalComponent, ExternalIssue,
    ExternalProject, ExternalUser, ExternalVersion,
};

use super::{ProjectImportPersister, TargetRoleActor, TargetSystem, UserDirectory};
use crate::error::StoreError;

const FIRST_ID: u64 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredProject {
    pub id: String,
    pub project: ExternalProject,
    pub counter: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredAttachment {
    pub attachment: ExternalAttachment,
    pub size: u64,
}

#[derive(Debug, Default)]
struct State {
    next_id: u64,
    catalog: TargetCatalog,
    projects: BTreeMap<String, StoredProject>,
    versions: BTreeMap<String, ExternalVersion>,
    components: BTreeMap<String, ExternalComponent>,
    issues: BTreeMap<String, ExternalIssue>,
    issue_ids_by_key: BTreeMap<String, String>,
    entities: BTreeMap<String, EntityRepresentation>,
    attachments: BTreeMap<String, StoredAttachment>,
    role_actors: BTreeSet<TargetRoleActor>,
    users: BTreeMap<String, Option<ExternalUser>>,
    groups: BTreeSet<String>,
    reindexed: Vec<String>,
    operations: Vec<String>,
}

impl State {
    fn allocate_id(&mut self) -> String {
        let id = FIRST_ID + self.next_id;
        self.next_id += 1;
        id.to_string()
    }

    fn require_issue(&self, issue_id: Option<&str>, entity: &str) -> Result<(), StoreError> {
        match issue_id {
            Some(id) if self.issues.contains_key(id) => Ok(()),
            Some(id) => Err(StoreError::NotFound(format!("{entity} refers to unknown issue {id}"))),
            None => Err(StoreError::Rejected(format!("{entity} has no issue"))),
        }
    }

    /// Referential checks per entity kind.
    fn check_references(&self, entity: &EntityRepresentation) -> Result<(), StoreError> {
        let name = entity.entity_name.as_str();
        match name {
            names::ISSUE_LINK => {
                self.require_issue(entity.get("source"), name)?;
                self.require_issue(entity.get("destination"), name)
            }
            names::NODE_ASSOCIATION => self.require_issue(entity.get("sourceNodeId"), name),
            names::USER_ASSOCIATION => self.require_issue(entity.get("sinkNodeId"), name),
            names::CHANGE_ITEM => match entity.get("group") {
                Some(group) if self.entities.contains_key(group) => Ok(()),
                other => Err(StoreError::NotFound(format!(
                    "change item refers to unknown change group {}",
                    other.unwrap_or_default()
                ))),
            },
            names::ENTITY_PROPERTY => match entity.get("entityId") {
                Some(id) if self.issues.contains_key(id) || self.entities.contains_key(id) => Ok(()),
                other => Err(StoreError::NotFound(format!(
                    "entity property refers to unknown entity {}",
                    other.unwrap_or_default()
                ))),
            },
            _ => self.require_issue(entity.get("issue"), name),
        }
    }

    fn log(&mut self, operation: String) {
        self.operations.push(operation);
    }
}

/// Target system held entirely in memory.
#[derive(Debug)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_catalog(TargetCatalog::default())
    }

    /// Store whose configuration (priorities, statuses, fields, ...) is `catalog`.
    ///
    /// Users, groups and the existing project in `catalog` are replaced by
    /// what the store itself holds when the catalog is loaded.
    pub fn with_catalog(catalog: TargetCatalog) -> Self {
        let mut state = State {
            catalog,
            ..State::default()
        };
        for user in std::mem::take(&mut state.catalog.users) {
            state.users.insert(user, None);
        }
        state.groups = std::mem::take(&mut state.catalog.groups);
        Self {
            state: Mutex::new(state),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // -----------------------------------------------------------------------
    // Seeding
    // -----------------------------------------------------------------------

    pub fn add_user(&self, user_name: &str) {
        self.state().users.insert(user_name.to_string(), None);
    }

    pub fn add_group(&self, group_name: &str) {
        self.state().groups.insert(group_name.to_string());
    }

    /// Seed an existing project and return its id.
    pub fn add_project(&self, project: ExternalProject) -> String {
        let mut state = self.state();
        let id = state.allocate_id();
        let counter = project.counter_value().unwrap_or(0);
        state.projects.insert(
            id.clone(),
            StoredProject {
                id: id.clone(),
                project,
                counter,
            },
        );
        id
    }

    /// Seed an issue into an existing project and return its id.
    pub fn add_issue(&self, project_id: &str, mut issue: ExternalIssue) -> String {
        let mut state = self.state();
        let id = state.allocate_id();
        issue.id = id.clone();
        issue.project_id = project_id.to_string();
        state.issue_ids_by_key.insert(issue.key.clone(), id.clone());
        state.issues.insert(id.clone(), issue);
        id
    }

    // -----------------------------------------------------------------------
    // Inspection
    // -----------------------------------------------------------------------

    pub fn project_by_key(&self, key: &str) -> Option<StoredProject> {
        self.state()
            .projects
            .values()
            .find(|p| p.project.key == key)
            .cloned()
    }

    pub fn issue_by_key(&self, key: &str) -> Option<ExternalIssue> {
        let state = self.state();
        let id = state.issue_ids_by_key.get(key)?;
        state.issues.get(id).cloned()
    }

    pub fn issue_count(&self) -> usize {
        self.state().issues.len()
    }

    pub fn versions(&self) -> Vec<ExternalVersion> {
        self.state().versions.values().cloned().collect()
    }

    pub fn components(&self) -> Vec<ExternalComponent> {
        self.state().components.values().cloned().collect()
    }

    /// Stored rows of one entity kind, in creation order.
    pub fn entities(&self, entity_name: &str) -> Vec<EntityRepresentation> {
        self.state()
            .entities
            .values()
            .filter(|e| e.entity_name == entity_name)
            .cloned()
            .collect()
    }

    pub fn attachments(&self) -> Vec<StoredAttachment> {
        self.state().attachments.values().cloned().collect()
    }

    pub fn role_actors(&self) -> Vec<TargetRoleActor> {
        self.state().role_actors.iter().cloned().collect()
    }

    pub fn created_users(&self) -> Vec<ExternalUser> {
        self.state().users.values().flatten().cloned().collect()
    }

    pub fn reindexed(&self) -> Vec<String> {
        self.state().reindexed.clone()
    }

    /// Every write, in the order it happened (`"<operation> <subject>"`).
    pub fn operations(&self) -> Vec<String> {
        self.state().operations.clone()
    }
}

#[async_trait]
impl ProjectImportPersister for MemoryStore {
    async fn create_project(&self, project: &ExternalProject) -> Result<String, StoreError> {
        let mut state = self.state();
        if state.projects.values().any(|p| p.project.key == project.key) {
            return Err(StoreError::Rejected(format!("project key {} is taken", project.key)));
        }
        let id = state.allocate_id();
        state.projects.insert(
            id.clone(),
            StoredProject {
                id: id.clone(),
                project: ExternalProject {
                    id: id.clone(),
                    counter: None,
                    ..project.clone()
                },
                counter: 0,
            },
        );
        state.log(format!("create_project {}", project.key));
        Ok(id)
    }

    async fn update_project_details(
        &self,
        project_id: &str,
        project: &ExternalProject,
    ) -> Result<(), StoreError> {
        let mut state = self.state();
        let stored = state
            .projects
            .get_mut(project_id)
            .ok_or_else(|| StoreError::NotFound(format!("project {project_id}")))?;
        stored.project = ExternalProject {
            id: stored.project.id.clone(),
            key: stored.project.key.clone(),
            counter: stored.project.counter.clone(),
            ..project.clone()
        };
        state.log(format!("update_project_details {project_id}"));
        Ok(())
    }

    async fn update_project_issue_counter(&self, project_id: &str, counter: i64) -> Result<(), StoreError> {
        let mut state = self.state();
        let stored = state
            .projects
            .get_mut(project_id)
            .ok_or_else(|| StoreError::NotFound(format!("project {project_id}")))?;
        stored.counter = stored.counter.max(counter);
        state.log(format!("update_project_issue_counter {project_id}"));
        Ok(())
    }

    async fn create_version(&self, version: &ExternalVersion) -> Result<String, StoreError> {
        let mut state = self.state();
        if !state.projects.contains_key(&version.project_id) {
            return Err(StoreError::NotFound(format!("project {}", version.project_id)));
        }
        let id = state.allocate_id();
        state.versions.insert(
            id.clone(),
            ExternalVersion {
                id: id.clone(),
                ..version.clone()
            },
        );
        state.log(format!("create_version {}", version.name));
        Ok(id)
    }

    async fn create_component(&self, component: &ExternalComponent) -> Result<String, StoreError> {
        let mut state = self.state();
        if !state.projects.contains_key(&component.project_id) {
            return Err(StoreError::NotFound(format!("project {}", component.project_id)));
        }
        let id = state.allocate_id();
        state.components.insert(
            id.clone(),
            ExternalComponent {
                id: id.clone(),
                ..component.clone()
            },
        );
        state.log(format!("create_component {}", component.name));
        Ok(id)
    }

    async fn create_issue(&self, issue: &ExternalIssue) -> Result<String, StoreError> {
        let mut state = self.state();
        if !state.projects.contains_key(&issue.project_id) {
            return Err(StoreError::NotFound(format!("project {}", issue.project_id)));
        }
        if state.issue_ids_by_key.contains_key(&issue.key) {
            return Err(StoreError::Rejected(format!("issue key {} is taken", issue.key)));
        }
        let id = state.allocate_id();
        state.issue_ids_by_key.insert(issue.key.clone(), id.clone());
        state.issues.insert(
            id.clone(),
            ExternalIssue {
                id: id.clone(),
                ..issue.clone()
            },
        );
        state.log(format!("create_issue {}", issue.key));
        Ok(id)
    }

    async fn create_entity(&self, entity: &EntityRepresentation) -> Result<String, StoreError> {
        let mut state = self.state();
        state.check_references(entity)?;
        let id = state.allocate_id();
        state.entities.insert(id.clone(), entity.clone());
        state.log(format!("create_entity {}", entity.entity_name));
        Ok(id)
    }

    async fn create_attachment_copying_file(
        &self,
        attachment: &ExternalAttachment,
        file: &Path,
    ) -> Result<String, StoreError> {
        self.state().require_issue(Some(attachment.issue_id.as_str()), names::FILE_ATTACHMENT)?;
        let size = tokio::fs::metadata(file)
            .await
            .map_err(|e| StoreError::Io(format!("{}: {e}", file.display())))?
            .len();

        let mut state = self.state();
        let id = state.allocate_id();
        state.attachments.insert(
            id.clone(),
            StoredAttachment {
                attachment: ExternalAttachment {
                    id: id.clone(),
                    ..attachment.clone()
                },
                size,
            },
        );
        state.log(format!("create_attachment {}", attachment.file_name));
        Ok(id)
    }

    async fn create_role_actor(&self, actor: &TargetRoleActor) -> Result<(), StoreError> {
        let mut state = self.state();
        if !state.projects.contains_key(&actor.project_id) {
            return Err(StoreError::NotFound(format!("project {}", actor.project_id)));
        }
        if !state.role_actors.insert(actor.clone()) {
            return Err(StoreError::Rejected(format!(
                "{} is already a member of role {}",
                actor.actor, actor.role_id
            )));
        }
        state.log(format!("create_role_actor {}", actor.actor));
        Ok(())
    }

    async fn role_actor_exists(&self, actor: &TargetRoleActor) -> Result<bool, StoreError> {
        Ok(self.state().role_actors.contains(actor))
    }

    async fn reindex_issues(&self, issue_ids: &[String]) -> Result<(), StoreError> {
        let mut state = self.state();
        if let Some(missing) = issue_ids.iter().find(|id| !state.issues.contains_key(*id)) {
            return Err(StoreError::NotFound(format!("issue {missing}")));
        }
        state.reindexed.extend(issue_ids.iter().cloned());
        state.log(format!("reindex_issues {}", issue_ids.len()));
        Ok(())
    }

    async fn issue_id_by_key(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.state().issue_ids_by_key.get(key).cloned())
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn user_exists(&self, user_name: &str) -> Result<bool, StoreError> {
        Ok(self.state().users.contains_key(user_name))
    }

    async fn create_user(&self, user: &ExternalUser) -> Result<(), StoreError> {
        let mut state = self.state();
        if state.users.contains_key(&user.name) {
            return Err(StoreError::Rejected(format!("user {} exists", user.name)));
        }
        state.users.insert(user.name.clone(), Some(user.clone()));
        state.log(format!("create_user {}", user.name));
        Ok(())
    }

    async fn group_exists(&self, group_name: &str) -> Result<bool, StoreError> {
        Ok(self.state().groups.contains(group_name))
    }
}

#[async_trait]
impl TargetSystem for MemoryStore {
    async fn load_catalog(&self, project_key: &str) -> Result<TargetCatalog, StoreError> {
        let state = self.state();
        let mut catalog = state.catalog.clone();
        catalog.users = state.users.keys().cloned().collect();
        catalog.groups = state.groups.clone();
        catalog.existing_project = state
            .projects
            .values()
            .find(|p| p.project.key == project_key)
            .map(|stored| ExistingProject {
                id: stored.id.clone(),
                key: stored.project.key.clone(),
                name: stored.project.name.clone(),
                description: stored.project.description.clone(),
                lead: stored.project.lead.clone(),
                counter: stored.counter,
                issue_count: state.issues.values().filter(|i| i.project_id == stored.id).count(),
                version_count: state
                    .versions
                    .values()
                    .filter(|v| v.project_id == stored.id)
                    .count(),
                component_count: state
                    .components
                    .values()
                    .filter(|c| c.project_id == stored.id)
                    .count(),
            });
        Ok(catalog)
    }
}
