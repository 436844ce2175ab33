use serde::{Deserialize, Serialize};

use super::{expect_entity, names, BackupElement, FromElement};
use crate::error::ParseError;

/// An issue as it appears in the backup.
///
/// The same type carries the transformed issue handed to the persister, in
/// which case every reference field holds a target-system id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalIssue {
    pub id: String,
    pub key: String,
    pub project_id: String,
    pub issue_type: String,
    pub status: String,
    pub priority: Option<String>,
    pub resolution: Option<String>,
    pub security_level: Option<String>,
    pub reporter: Option<String>,
    pub assignee: Option<String>,
    pub creator: Option<String>,
    pub summary: String,
    pub description: Option<String>,
    pub environment: Option<String>,
    pub created: Option<String>,
    pub updated: Option<String>,
    pub due_date: Option<String>,
    pub resolution_date: Option<String>,
    pub votes: Option<i64>,
    pub original_estimate: Option<i64>,
    pub estimate: Option<i64>,
    pub time_spent: Option<i64>,
}

impl ExternalIssue {
    /// Numeric part of the issue key (`MNK-12` gives 12).
    pub fn key_number(&self) -> Option<i64> {
        self.key
            .rsplit_once('-')
            .and_then(|(_, number)| number.parse().ok())
    }
}

impl FromElement for ExternalIssue {
    const ENTITY: &'static str = names::ISSUE;

    fn from_element(el: &BackupElement) -> Result<Self, ParseError> {
        expect_entity::<Self>(el)?;
        Ok(Self {
            id: el.require("id")?,
            key: el.require("key")?,
            project_id: el.require("project")?,
            issue_type: el.require("type")?,
            status: el.require("status")?,
            priority: el.optional("priority"),
            resolution: el.optional("resolution"),
            security_level: el.optional("security"),
            reporter: el.optional("reporter"),
            assignee: el.optional("assignee"),
            creator: el.optional("creator"),
            summary: el.require("summary")?,
            description: el.optional("description"),
            environment: el.optional("environment"),
            created: el.optional("created"),
            updated: el.optional("updated"),
            due_date: el.optional("duedate"),
            resolution_date: el.optional("resolutiondate"),
            votes: el.parse_optional("votes")?,
            original_estimate: el.parse_optional("timeoriginalestimate")?,
            estimate: el.parse_optional("timeestimate")?,
            time_spent: el.parse_optional("timespent")?,
        })
    }
}
