//! Shared fixtures for the import integration tests.
//!
//! The reference backup holds project "MNK" with two versions, three
//! components, one issue and everything hanging off that issue. Extra
//! issues can be appended for the error threshold tests.

#![allow(dead_code)]

use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::{NamedTempFile, TempDir};

use carryover_core::catalog::{
    NamedEntity, TargetCatalog, TargetCustomField, TargetIssueType, TargetOption, TargetStatus,
};
use carryover_core::external::{
    EntityRepresentation, ExternalAttachment, ExternalComponent, ExternalIssue, ExternalProject,
    ExternalVersion,
};
use carryover_pipeline::error::StoreError;
use carryover_pipeline::store::TargetRoleActor;
use carryover_pipeline::{ImportConfig, MemoryStore, ProjectImportManager, ProjectImportPersister};

pub const PROJECT_KEY: &str = "MNK";
pub const BACKUP_COUNTER: i64 = 12;

const HEADER: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<entity-engine-xml>
    <Project id="10" key="MNK" name="Monkey" lead="fred" description="Bananas everywhere" counter="12"/>
    <Project id="20" key="OTH" name="Other"/>
    <Version id="1" project="10" name="1.0" sequence="1"/>
    <Version id="2" project="10" name="2.0" sequence="2"/>
    <Component id="3" project="10" name="Engine"/>
    <Component id="4" project="10" name="Wheels"/>
    <Component id="5" project="10" name="Doors"/>
    <Component id="6" project="20" name="Elsewhere"/>
    <User userName="fred" displayName="Fred Flintstone" emailAddress="fred@example.com"/>
    <Group groupName="developers"/>
    <IssueType id="1" name="Bug"/>
    <Status id="1" name="Open"/>
    <Priority id="2" name="Major"/>
    <ProjectRole id="10002" name="Developers"/>
    <ProjectRoleActor id="1" pid="10" projectroleid="10002" roletype="atlassian-user-role-actor" roletypeparameter="fred"/>
    <CustomField id="500" name="Colour" customfieldtypekey="x:select"/>
    <ConfigurationContext id="1" key="customfield_500" fieldconfigscheme="900"/>
    <FieldConfigSchemeIssueType id="1" fieldconfigscheme="900"/>
    <CustomFieldOption id="600" customfield="500" customfieldconfig="900" value="Red"/>
    <Issue id="100" key="MNK-12" project="10" type="1" status="1" priority="2" reporter="fred" summary="Bananas are missing"/>
    <Issue id="200" key="OTH-1" project="20" type="1" status="1" summary="Not ours"/>
    <Action id="300" issue="100" type="comment" author="fred" body="Still missing"/>
    <Action id="301" issue="200" type="comment" author="fred" body="Not ours either"/>
    <ChangeGroup id="400" issue="100" author="fred" created="2024-01-01 10:00:00.0"/>
    <ChangeItem id="401" group="400" fieldtype="jira" field="status" oldvalue="1" newvalue="1"/>
    <NodeAssociation sourceNodeId="100" sourceNodeEntity="Issue" sinkNodeId="1" sinkNodeEntity="Version" associationType="IssueFixVersion"/>
    <NodeAssociation sourceNodeId="100" sourceNodeEntity="Issue" sinkNodeId="3" sinkNodeEntity="Component" associationType="IssueComponent"/>
    <CustomFieldValue id="700" customfield="500" issue="100" stringvalue="600"/>
    <FileAttachment id="800" issue="100" filename="notes.txt" mimetype="text/plain" filesize="5" author="fred"/>
"#;

const FOOTER: &str = "</entity-engine-xml>\n";

/// The reference backup.
pub fn backup_xml() -> String {
    backup_xml_with_issues(0)
}

/// The reference backup plus `extra` issues `MNK-1` .. `MNK-<extra>`.
pub fn backup_xml_with_issues(extra: usize) -> String {
    let mut xml = HEADER.to_string();
    for n in 1..=extra {
        xml.push_str(&format!(
            "    <Issue id=\"{}\" key=\"MNK-{n}\" project=\"10\" type=\"1\" status=\"1\" summary=\"Extra {n}\"/>\n",
            1000 + n
        ));
    }
    xml.push_str(FOOTER);
    xml
}

pub fn write_backup(xml: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(xml.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

/// Attachment root holding the file of attachment 800.
pub fn attachment_root() -> TempDir {
    let dir = TempDir::new().unwrap();
    let issue_dir = dir.path().join(PROJECT_KEY).join("MNK-12");
    std::fs::create_dir_all(&issue_dir).unwrap();
    std::fs::write(issue_dir.join("800"), b"hello").unwrap();
    dir
}

/// Target configuration matching everything the reference backup needs.
pub fn catalog() -> TargetCatalog {
    TargetCatalog {
        priorities: vec![NamedEntity::new("p1", "Major")],
        issue_types: vec![TargetIssueType {
            id: "t1".into(),
            name: "Bug".into(),
            subtask: false,
        }],
        statuses: vec![TargetStatus {
            id: "s1".into(),
            name: "Open".into(),
            workflow_issue_types: None,
        }],
        custom_fields: vec![colour_field()],
        project_roles: vec![NamedEntity::new("r1", "Developers")],
        ..Default::default()
    }
}

pub fn colour_field() -> TargetCustomField {
    TargetCustomField {
        id: "cf1".into(),
        name: "Colour".into(),
        type_key: "x:select".into(),
        project_ids: None,
        issue_type_ids: None,
        options: vec![TargetOption {
            id: "o1".into(),
            value: "Red".into(),
            parent_id: None,
        }],
    }
}

pub fn test_config() -> ImportConfig {
    ImportConfig {
        pool_size: 4,
        queue_capacity: 8,
        ..ImportConfig::default()
    }
}

pub fn manager(store: &Arc<MemoryStore>, persister: Arc<dyn ProjectImportPersister>, config: ImportConfig) -> ProjectImportManager {
    ProjectImportManager::new(persister, store.clone(), store.clone(), config)
}

// ---------------------------------------------------------------------------
// Failing persister
// ---------------------------------------------------------------------------

/// Delegates to a [`MemoryStore`] but rejects every `every`-th issue, and
/// optionally reports the store as down for every version.
pub struct FlakyPersister {
    inner: Arc<MemoryStore>,
    every: usize,
    issues_seen: AtomicUsize,
    versions_unavailable: bool,
}

impl FlakyPersister {
    pub fn new(inner: Arc<MemoryStore>, every: usize) -> Self {
        Self {
            inner,
            every,
            issues_seen: AtomicUsize::new(0),
            versions_unavailable: false,
        }
    }

    /// Accepts every issue; every version fails with [`StoreError::Unavailable`].
    pub fn unavailable_versions(inner: Arc<MemoryStore>) -> Self {
        Self {
            versions_unavailable: true,
            ..Self::new(inner, usize::MAX)
        }
    }
}

#[async_trait]
impl ProjectImportPersister for FlakyPersister {
    async fn create_project(&self, project: &ExternalProject) -> Result<String, StoreError> {
        self.inner.create_project(project).await
    }

    async fn update_project_details(&self, project_id: &str, project: &ExternalProject) -> Result<(), StoreError> {
        self.inner.update_project_details(project_id, project).await
    }

    async fn update_project_issue_counter(&self, project_id: &str, counter: i64) -> Result<(), StoreError> {
        self.inner.update_project_issue_counter(project_id, counter).await
    }

    async fn create_version(&self, version: &ExternalVersion) -> Result<String, StoreError> {
        if self.versions_unavailable {
            return Err(StoreError::Unavailable(format!("cannot store version {}", version.name)));
        }
        self.inner.create_version(version).await
    }

    async fn create_component(&self, component: &ExternalComponent) -> Result<String, StoreError> {
        self.inner.create_component(component).await
    }

    async fn create_issue(&self, issue: &ExternalIssue) -> Result<String, StoreError> {
        let seen = self.issues_seen.fetch_add(1, Ordering::SeqCst) + 1;
        if seen % self.every == 0 {
            return Err(StoreError::Rejected(format!("refusing issue {}", issue.key)));
        }
        self.inner.create_issue(issue).await
    }

    async fn create_entity(&self, entity: &EntityRepresentation) -> Result<String, StoreError> {
        self.inner.create_entity(entity).await
    }

    async fn create_attachment_copying_file(
        &self,
        attachment: &ExternalAttachment,
        file: &Path,
    ) -> Result<String, StoreError> {
        self.inner.create_attachment_copying_file(attachment, file).await
    }

    async fn create_role_actor(&self, actor: &TargetRoleActor) -> Result<(), StoreError> {
        self.inner.create_role_actor(actor).await
    }

    async fn role_actor_exists(&self, actor: &TargetRoleActor) -> Result<bool, StoreError> {
        self.inner.role_actor_exists(actor).await
    }

    async fn reindex_issues(&self, issue_ids: &[String]) -> Result<(), StoreError> {
        self.inner.reindex_issues(issue_ids).await
    }

    async fn issue_id_by_key(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.issue_id_by_key(key).await
    }
}
