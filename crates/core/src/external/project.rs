//! Project, version and component records.

use serde::{Deserialize, Serialize};

use super::{expect_entity, names, BackupElement, FromElement};
use crate::error::ParseError;

/// A project as it appears in the backup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalProject {
    pub id: String,
    pub key: String,
    pub name: String,
    pub lead: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub assignee_type: Option<String>,
    pub email_sender: Option<String>,
    /// Raw issue counter; kept verbatim so an unparsable value can be reported.
    pub counter: Option<String>,
}

/// `assigneetype` value meaning new issues start unassigned.
pub const ASSIGNEE_TYPE_UNASSIGNED: i64 = 3;

impl ExternalProject {
    /// Whether the project's default assignee is "Unassigned". Without a
    /// numeric assignee type the source system's default decides.
    pub fn default_assignee_unassigned(&self, system_allows_unassigned: bool) -> bool {
        match self.assignee_type.as_deref().and_then(|t| t.trim().parse::<i64>().ok()) {
            Some(kind) => kind == ASSIGNEE_TYPE_UNASSIGNED,
            None => system_allows_unassigned,
        }
    }

    /// The issue counter, if present and numeric.
    pub fn counter_value(&self) -> Option<i64> {
        self.counter.as_deref().and_then(|c| c.trim().parse().ok())
    }
}

impl FromElement for ExternalProject {
    const ENTITY: &'static str = names::PROJECT;

    fn from_element(el: &BackupElement) -> Result<Self, ParseError> {
        expect_entity::<Self>(el)?;
        Ok(Self {
            id: el.require("id")?,
            key: el.require("key")?,
            name: el.require("name")?,
            lead: el.optional("lead"),
            description: el.optional("description"),
            url: el.optional("url"),
            assignee_type: el.optional("assigneetype"),
            email_sender: el.optional("emailsender"),
            counter: el.optional("counter"),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalVersion {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub description: Option<String>,
    pub sequence: Option<i64>,
    pub released: bool,
    pub archived: bool,
    pub release_date: Option<String>,
}

impl FromElement for ExternalVersion {
    const ENTITY: &'static str = names::VERSION;

    fn from_element(el: &BackupElement) -> Result<Self, ParseError> {
        expect_entity::<Self>(el)?;
        Ok(Self {
            id: el.require("id")?,
            project_id: el.require("project")?,
            name: el.require("name")?,
            description: el.optional("description"),
            sequence: el.parse_optional("sequence")?,
            released: el.flag("released", false)?,
            archived: el.flag("archived", false)?,
            release_date: el.optional("releasedate"),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalComponent {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub description: Option<String>,
    pub lead: Option<String>,
    pub assignee_type: Option<String>,
}

impl FromElement for ExternalComponent {
    const ENTITY: &'static str = names::COMPONENT;

    fn from_element(el: &BackupElement) -> Result<Self, ParseError> {
        expect_entity::<Self>(el)?;
        Ok(Self {
            id: el.require("id")?,
            project_id: el.require("project")?,
            name: el.require("name")?,
            description: el.optional("description"),
            lead: el.optional("lead"),
            assignee_type: el.optional("assigneetype"),
        })
    }
}
