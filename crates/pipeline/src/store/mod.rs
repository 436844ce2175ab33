//! Interfaces to the target system.
//!
//! The pipeline never talks to storage directly. It reads a
//! [`TargetCatalog`] snapshot through [`TargetSystem`], resolves and creates
//! users through [`UserDirectory`] and writes everything else through
//! [`ProjectImportPersister`]. [`memory::MemoryStore`] implements all three.

pub mod memory;

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use carryover_core::catalog::TargetCatalog;
use carryover_core::external::{
    EntityRepresentation, ExternalAttachment, ExternalComponent, ExternalIssue, ExternalProject,
    ExternalUser, ExternalVersion,
};

use crate::error::StoreError;

/// A project role membership expressed in target ids.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TargetRoleActor {
    pub project_id: String,
    pub role_id: String,
    pub role_type: String,
    /// User name or group name.
    pub actor: String,
}

/// Writes imported data into the target system.
///
/// Every entity passed in has already been remapped to target ids.
#[async_trait]
pub trait ProjectImportPersister: Send + Sync {
    /// Create the project and return its new id.
    async fn create_project(&self, project: &ExternalProject) -> Result<String, StoreError>;

    /// Overwrite name, lead, description, url, assignee type and email sender.
    async fn update_project_details(
        &self,
        project_id: &str,
        project: &ExternalProject,
    ) -> Result<(), StoreError>;

    /// Raise the project's issue counter to at least `counter`. Never lowers it.
    async fn update_project_issue_counter(&self, project_id: &str, counter: i64) -> Result<(), StoreError>;

    async fn create_version(&self, version: &ExternalVersion) -> Result<String, StoreError>;

    /// Create versions in order, returning one result per version.
    async fn create_versions(&self, versions: &[ExternalVersion]) -> Vec<Result<String, StoreError>> {
        let mut out = Vec::with_capacity(versions.len());
        for version in versions {
            out.push(self.create_version(version).await);
        }
        out
    }

    async fn create_component(&self, component: &ExternalComponent) -> Result<String, StoreError>;

    async fn create_components(
        &self,
        components: &[ExternalComponent],
    ) -> Vec<Result<String, StoreError>> {
        let mut out = Vec::with_capacity(components.len());
        for component in components {
            out.push(self.create_component(component).await);
        }
        out
    }

    async fn create_issue(&self, issue: &ExternalIssue) -> Result<String, StoreError>;

    /// Create an issue-related, second-degree or custom field value row.
    async fn create_entity(&self, entity: &EntityRepresentation) -> Result<String, StoreError>;

    /// Create the attachment row and copy `file` into the target's storage.
    async fn create_attachment_copying_file(
        &self,
        attachment: &ExternalAttachment,
        file: &Path,
    ) -> Result<String, StoreError>;

    async fn create_role_actor(&self, actor: &TargetRoleActor) -> Result<(), StoreError>;

    async fn role_actor_exists(&self, actor: &TargetRoleActor) -> Result<bool, StoreError>;

    /// Reindex the given issues in one batch.
    async fn reindex_issues(&self, issue_ids: &[String]) -> Result<(), StoreError>;

    /// Target issue id for an issue key, used to link to issues outside the project.
    async fn issue_id_by_key(&self, key: &str) -> Result<Option<String>, StoreError>;
}

/// User and group directory of the target.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn user_exists(&self, user_name: &str) -> Result<bool, StoreError>;

    async fn create_user(&self, user: &ExternalUser) -> Result<(), StoreError>;

    async fn group_exists(&self, group_name: &str) -> Result<bool, StoreError>;
}

/// Read access to the target's configuration.
#[async_trait]
pub trait TargetSystem: Send + Sync {
    /// Snapshot of everything mapping and validation consult, for the project `project_key`.
    async fn load_catalog(&self, project_key: &str) -> Result<TargetCatalog, StoreError>;
}
