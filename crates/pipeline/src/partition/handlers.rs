use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use async_trait::async_trait;

use carryover_core::backup::BackupProject;
use carryover_core::external::related::{PROPERTY_CHANGE_HISTORY, PROPERTY_COMMENT, PROPERTY_ISSUE};
use carryover_core::external::{names, BackupElement, ExternalComment};

use super::{partition_write_failed, PartitionFile, PartitionKind, PartitionWriter, Partitions};
use crate::error::HandlerError;
use crate::scanner::EntityHandler;

const ISSUE_ENTITY: &str = "Issue";

const FIRST_PASS_ENTITIES: &[&str] = &[
    names::ISSUE,
    names::CUSTOM_FIELD_VALUE,
    names::FILE_ATTACHMENT,
    names::ACTION,
    names::WORKLOG,
    names::CHANGE_GROUP,
    names::ISSUE_LINK,
    names::NODE_ASSOCIATION,
    names::USER_ASSOCIATION,
    names::LABEL,
    names::ENTITY_PROPERTY,
];

/// Opens one writer per partition at document start and hands the finished
/// files over at document end.
struct WriterSet {
    pending: BTreeMap<PartitionKind, PathBuf>,
    writers: BTreeMap<PartitionKind, PartitionWriter>,
    finished: Vec<(PartitionKind, PartitionFile)>,
}

impl WriterSet {
    fn new(partitions: &Partitions, kinds: &[PartitionKind]) -> Self {
        Self {
            pending: kinds.iter().map(|k| (*k, partitions.path_for(*k))).collect(),
            writers: BTreeMap::new(),
            finished: Vec::new(),
        }
    }

    async fn open(&mut self) -> Result<(), HandlerError> {
        for (kind, path) in std::mem::take(&mut self.pending) {
            let writer = PartitionWriter::create(&path)
                .await
                .map_err(|e| partition_write_failed(kind, e))?;
            self.writers.insert(kind, writer);
        }
        Ok(())
    }

    async fn write(&mut self, kind: PartitionKind, element: &BackupElement) -> Result<(), HandlerError> {
        if let Some(writer) = self.writers.get_mut(&kind) {
            writer
                .write_element(element)
                .await
                .map_err(|e| partition_write_failed(kind, e))?;
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), HandlerError> {
        for (kind, writer) in std::mem::take(&mut self.writers) {
            let (path, entity_count) = writer
                .finish()
                .await
                .map_err(|e| partition_write_failed(kind, e))?;
            tracing::debug!(partition = %kind, entities = entity_count, "Partition written");
            self.finished.push((kind, PartitionFile { path, entity_count }));
        }
        Ok(())
    }
}

/// First partitioning pass: issues, issue-related entities, custom field
/// values and (optionally) attachments of one project.
pub struct PartitionHandler<'a> {
    project: &'a BackupProject,
    writers: WriterSet,
    comment_ids: BTreeSet<String>,
    change_group_ids: BTreeSet<String>,
}

impl<'a> PartitionHandler<'a> {
    pub fn new(project: &'a BackupProject, partitions: &Partitions, with_attachments: bool) -> Self {
        let mut kinds = vec![
            PartitionKind::Issues,
            PartitionKind::IssueRelated,
            PartitionKind::CustomFieldValues,
        ];
        if with_attachments {
            kinds.push(PartitionKind::Attachments);
        }
        Self {
            project,
            writers: WriterSet::new(partitions, &kinds),
            comment_ids: BTreeSet::new(),
            change_group_ids: BTreeSet::new(),
        }
    }

    fn in_project(&self, issue_id: Option<&str>) -> bool {
        issue_id.is_some_and(|id| self.project.contains_issue(id))
    }

    fn classify(&mut self, el: &BackupElement) -> Option<PartitionKind> {
        let owned_by_issue = self.in_project(el.get("issue"));
        match el.name.as_str() {
            names::ISSUE => self.in_project(el.get("id")).then_some(PartitionKind::Issues),
            names::CUSTOM_FIELD_VALUE => owned_by_issue.then_some(PartitionKind::CustomFieldValues),
            names::FILE_ATTACHMENT => owned_by_issue.then_some(PartitionKind::Attachments),
            names::ACTION => {
                if !(owned_by_issue && ExternalComment::is_comment(el)) {
                    return None;
                }
                if let Some(id) = el.get("id") {
                    self.comment_ids.insert(id.to_string());
                }
                Some(PartitionKind::IssueRelated)
            }
            names::CHANGE_GROUP => {
                if !owned_by_issue {
                    return None;
                }
                if let Some(id) = el.get("id") {
                    self.change_group_ids.insert(id.to_string());
                }
                Some(PartitionKind::IssueRelated)
            }
            names::WORKLOG | names::LABEL => owned_by_issue.then_some(PartitionKind::IssueRelated),
            names::ISSUE_LINK => (self.in_project(el.get("source"))
                || self.in_project(el.get("destination")))
            .then_some(PartitionKind::IssueRelated),
            names::NODE_ASSOCIATION => (el.get("sourceNodeEntity") == Some(ISSUE_ENTITY)
                && self.in_project(el.get("sourceNodeId")))
            .then_some(PartitionKind::IssueRelated),
            names::USER_ASSOCIATION => (el.get("sinkNodeEntity") == Some(ISSUE_ENTITY)
                && self.in_project(el.get("sinkNodeId")))
            .then_some(PartitionKind::IssueRelated),
            names::ENTITY_PROPERTY => (el.get("entityName") == Some(PROPERTY_ISSUE)
                && self.in_project(el.get("entityId")))
            .then_some(PartitionKind::IssueRelated),
            _ => None,
        }
    }

    /// Finished partition files; empty until the scan ended.
    pub fn take_files(&mut self) -> Vec<(PartitionKind, PartitionFile)> {
        std::mem::take(&mut self.writers.finished)
    }

    /// Comment and change group ids of the project, needed by the second pass.
    pub fn second_degree_owners(&self) -> (BTreeSet<String>, BTreeSet<String>) {
        (self.comment_ids.clone(), self.change_group_ids.clone())
    }
}

#[async_trait]
impl EntityHandler for PartitionHandler<'_> {
    fn entity_names(&self) -> &'static [&'static str] {
        FIRST_PASS_ENTITIES
    }

    async fn start_document(&mut self) -> Result<(), HandlerError> {
        self.writers.open().await
    }

    async fn handle_entity(&mut self, element: &BackupElement) -> Result<(), HandlerError> {
        if let Some(kind) = self.classify(element) {
            self.writers.write(kind, element).await?;
        }
        Ok(())
    }

    async fn end_document(&mut self) -> Result<(), HandlerError> {
        self.writers.close().await
    }
}

/// Second partitioning pass: change items of the project's change groups and
/// properties of its comments and change groups.
pub struct SecondDegreePartitionHandler {
    comment_ids: BTreeSet<String>,
    change_group_ids: BTreeSet<String>,
    writers: WriterSet,
}

impl SecondDegreePartitionHandler {
    pub fn new(
        partitions: &Partitions,
        comment_ids: BTreeSet<String>,
        change_group_ids: BTreeSet<String>,
    ) -> Self {
        Self {
            comment_ids,
            change_group_ids,
            writers: WriterSet::new(partitions, &[PartitionKind::SecondDegree]),
        }
    }

    fn belongs(&self, el: &BackupElement) -> bool {
        let owned_by = |ids: &BTreeSet<String>, key: &str| el.get(key).is_some_and(|id| ids.contains(id));
        match el.name.as_str() {
            names::CHANGE_ITEM => owned_by(&self.change_group_ids, "group"),
            names::ENTITY_PROPERTY => match el.get("entityName") {
                Some(PROPERTY_COMMENT) => owned_by(&self.comment_ids, "entityId"),
                Some(PROPERTY_CHANGE_HISTORY) => owned_by(&self.change_group_ids, "entityId"),
                _ => false,
            },
            _ => false,
        }
    }

    pub fn take_files(&mut self) -> Vec<(PartitionKind, PartitionFile)> {
        std::mem::take(&mut self.writers.finished)
    }
}

#[async_trait]
impl EntityHandler for SecondDegreePartitionHandler {
    fn entity_names(&self) -> &'static [&'static str] {
        names::SECOND_DEGREE
    }

    async fn start_document(&mut self) -> Result<(), HandlerError> {
        self.writers.open().await
    }

    async fn handle_entity(&mut self, element: &BackupElement) -> Result<(), HandlerError> {
        if self.belongs(element) {
            self.writers.write(PartitionKind::SecondDegree, element).await?;
        }
        Ok(())
    }

    async fn end_document(&mut self) -> Result<(), HandlerError> {
        self.writers.close().await
    }
}
