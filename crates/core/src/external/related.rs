//! Issue-related and second-degree entities.
//!
//! Issue-related entities hang directly off an issue (comments, worklogs,
//! change groups, links, associations, labels, issue properties).
//! Second-degree entities hang off one of those (change items off a change
//! group, comment properties off a comment).

use serde::{Deserialize, Serialize};

use super::{expect_entity, names, BackupElement, EntityRepresentation, FromElement};
use crate::error::ParseError;

pub const COMMENT_ACTION_TYPE: &str = "comment";

pub const ASSOCIATION_FIX_VERSION: &str = "IssueFixVersion";
pub const ASSOCIATION_AFFECTS_VERSION: &str = "IssueVersion";
pub const ASSOCIATION_COMPONENT: &str = "IssueComponent";

pub const USER_ASSOCIATION_WATCH: &str = "WatchIssue";
pub const USER_ASSOCIATION_VOTE: &str = "VoteIssue";

pub const PROPERTY_ISSUE: &str = "IssueProperty";
pub const PROPERTY_COMMENT: &str = "CommentProperty";
pub const PROPERTY_CHANGE_HISTORY: &str = "ChangeHistoryProperty";

// ---------------------------------------------------------------------------
// Comments and worklogs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalComment {
    pub id: String,
    pub issue_id: String,
    pub author: Option<String>,
    pub body: Option<String>,
    pub group_level: Option<String>,
    pub role_level: Option<String>,
    pub created: Option<String>,
    pub updated: Option<String>,
    pub update_author: Option<String>,
}

impl ExternalComment {
    /// `Action` elements also carry non-comment history; only comments are imported.
    pub fn is_comment(el: &BackupElement) -> bool {
        el.is(names::ACTION) && el.get("type") == Some(COMMENT_ACTION_TYPE)
    }

    pub fn to_representation(&self) -> EntityRepresentation {
        EntityRepresentation::new(names::ACTION)
            .field("issue", &self.issue_id)
            .field("type", COMMENT_ACTION_TYPE)
            .optional_field("author", self.author.as_deref())
            .optional_field("body", self.body.as_deref())
            .optional_field("level", self.group_level.as_deref())
            .optional_field("rolelevel", self.role_level.as_deref())
            .optional_field("created", self.created.as_deref())
            .optional_field("updated", self.updated.as_deref())
            .optional_field("updateauthor", self.update_author.as_deref())
    }
}

impl FromElement for ExternalComment {
    const ENTITY: &'static str = names::ACTION;

    fn from_element(el: &BackupElement) -> Result<Self, ParseError> {
        expect_entity::<Self>(el)?;
        if !Self::is_comment(el) {
            return Err(ParseError::InvalidAttribute {
                entity: el.name.clone(),
                attribute: "type",
                value: el.get("type").unwrap_or_default().to_string(),
            });
        }
        Ok(Self {
            id: el.require("id")?,
            issue_id: el.require("issue")?,
            author: el.optional("author"),
            body: el.optional("body"),
            group_level: el.optional("level"),
            role_level: el.optional("rolelevel"),
            created: el.optional("created"),
            updated: el.optional("updated"),
            update_author: el.optional("updateauthor"),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalWorklog {
    pub id: String,
    pub issue_id: String,
    pub author: Option<String>,
    pub body: Option<String>,
    pub group_level: Option<String>,
    pub role_level: Option<String>,
    pub time_worked: Option<i64>,
    pub start_date: Option<String>,
    pub created: Option<String>,
    pub updated: Option<String>,
    pub update_author: Option<String>,
}

impl ExternalWorklog {
    pub fn to_representation(&self) -> EntityRepresentation {
        EntityRepresentation::new(names::WORKLOG)
            .field("issue", &self.issue_id)
            .optional_field("author", self.author.as_deref())
            .optional_field("body", self.body.as_deref())
            .optional_field("grouplevel", self.group_level.as_deref())
            .optional_field("rolelevel", self.role_level.as_deref())
            .optional_field(
                "timeworked",
                self.time_worked.map(|t| t.to_string()).as_deref(),
            )
            .optional_field("startdate", self.start_date.as_deref())
            .optional_field("created", self.created.as_deref())
            .optional_field("updated", self.updated.as_deref())
            .optional_field("updateauthor", self.update_author.as_deref())
    }
}

impl FromElement for ExternalWorklog {
    const ENTITY: &'static str = names::WORKLOG;

    fn from_element(el: &BackupElement) -> Result<Self, ParseError> {
        expect_entity::<Self>(el)?;
        Ok(Self {
            id: el.require("id")?,
            issue_id: el.require("issue")?,
            author: el.optional("author"),
            body: el.optional("body"),
            group_level: el.optional("grouplevel"),
            role_level: el.optional("rolelevel"),
            time_worked: el.parse_optional("timeworked")?,
            start_date: el.optional("startdate"),
            created: el.optional("created"),
            updated: el.optional("updated"),
            update_author: el.optional("updateauthor"),
        })
    }
}

// ---------------------------------------------------------------------------
// Change history
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalChangeGroup {
    pub id: String,
    pub issue_id: String,
    pub author: Option<String>,
    pub created: Option<String>,
}

impl ExternalChangeGroup {
    pub fn to_representation(&self) -> EntityRepresentation {
        EntityRepresentation::new(names::CHANGE_GROUP)
            .field("issue", &self.issue_id)
            .optional_field("author", self.author.as_deref())
            .optional_field("created", self.created.as_deref())
    }
}

impl FromElement for ExternalChangeGroup {
    const ENTITY: &'static str = names::CHANGE_GROUP;

    fn from_element(el: &BackupElement) -> Result<Self, ParseError> {
        expect_entity::<Self>(el)?;
        Ok(Self {
            id: el.require("id")?,
            issue_id: el.require("issue")?,
            author: el.optional("author"),
            created: el.optional("created"),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalChangeItem {
    pub id: String,
    pub change_group_id: String,
    pub field_type: Option<String>,
    pub field: Option<String>,
    pub old_value: Option<String>,
    pub old_string: Option<String>,
    pub new_value: Option<String>,
    pub new_string: Option<String>,
}

impl ExternalChangeItem {
    pub fn to_representation(&self) -> EntityRepresentation {
        EntityRepresentation::new(names::CHANGE_ITEM)
            .field("group", &self.change_group_id)
            .optional_field("fieldtype", self.field_type.as_deref())
            .optional_field("field", self.field.as_deref())
            .optional_field("oldvalue", self.old_value.as_deref())
            .optional_field("oldstring", self.old_string.as_deref())
            .optional_field("newvalue", self.new_value.as_deref())
            .optional_field("newstring", self.new_string.as_deref())
    }
}

impl FromElement for ExternalChangeItem {
    const ENTITY: &'static str = names::CHANGE_ITEM;

    fn from_element(el: &BackupElement) -> Result<Self, ParseError> {
        expect_entity::<Self>(el)?;
        Ok(Self {
            id: el.require("id")?,
            change_group_id: el.require("group")?,
            field_type: el.optional("fieldtype"),
            field: el.optional("field"),
            old_value: el.optional("oldvalue"),
            old_string: el.optional("oldstring"),
            new_value: el.optional("newvalue"),
            new_string: el.optional("newstring"),
        })
    }
}

// ---------------------------------------------------------------------------
// Links and associations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalLink {
    pub id: String,
    pub link_type: String,
    pub source_id: String,
    pub destination_id: String,
    pub sequence: Option<i64>,
}

impl ExternalLink {
    pub fn to_representation(&self) -> EntityRepresentation {
        EntityRepresentation::new(names::ISSUE_LINK)
            .field("linktype", &self.link_type)
            .field("source", &self.source_id)
            .field("destination", &self.destination_id)
            .optional_field("sequence", self.sequence.map(|s| s.to_string()).as_deref())
    }
}

impl FromElement for ExternalLink {
    const ENTITY: &'static str = names::ISSUE_LINK;

    fn from_element(el: &BackupElement) -> Result<Self, ParseError> {
        expect_entity::<Self>(el)?;
        Ok(Self {
            id: el.require("id")?,
            link_type: el.require("linktype")?,
            source_id: el.require("source")?,
            destination_id: el.require("destination")?,
            sequence: el.parse_optional("sequence")?,
        })
    }
}

/// Issue to version/component association.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalNodeAssociation {
    pub source_node_id: String,
    pub source_node_entity: String,
    pub sink_node_id: String,
    pub sink_node_entity: String,
    pub association_type: String,
}

impl ExternalNodeAssociation {
    pub fn is_version_association(&self) -> bool {
        self.association_type == ASSOCIATION_FIX_VERSION
            || self.association_type == ASSOCIATION_AFFECTS_VERSION
    }

    pub fn is_component_association(&self) -> bool {
        self.association_type == ASSOCIATION_COMPONENT
    }

    pub fn to_representation(&self) -> EntityRepresentation {
        EntityRepresentation::new(names::NODE_ASSOCIATION)
            .field("sourceNodeId", &self.source_node_id)
            .field("sourceNodeEntity", &self.source_node_entity)
            .field("sinkNodeId", &self.sink_node_id)
            .field("sinkNodeEntity", &self.sink_node_entity)
            .field("associationType", &self.association_type)
    }
}

impl FromElement for ExternalNodeAssociation {
    const ENTITY: &'static str = names::NODE_ASSOCIATION;

    fn from_element(el: &BackupElement) -> Result<Self, ParseError> {
        expect_entity::<Self>(el)?;
        Ok(Self {
            source_node_id: el.require("sourceNodeId")?,
            source_node_entity: el.require("sourceNodeEntity")?,
            sink_node_id: el.require("sinkNodeId")?,
            sink_node_entity: el.require("sinkNodeEntity")?,
            association_type: el.require("associationType")?,
        })
    }
}

/// Watch or vote of a user on an issue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalUserAssociation {
    pub source_name: String,
    pub sink_node_id: String,
    pub sink_node_entity: String,
    pub association_type: String,
}

impl ExternalUserAssociation {
    pub fn to_representation(&self) -> EntityRepresentation {
        EntityRepresentation::new(names::USER_ASSOCIATION)
            .field("sourceName", &self.source_name)
            .field("sinkNodeId", &self.sink_node_id)
            .field("sinkNodeEntity", &self.sink_node_entity)
            .field("associationType", &self.association_type)
    }
}

impl FromElement for ExternalUserAssociation {
    const ENTITY: &'static str = names::USER_ASSOCIATION;

    fn from_element(el: &BackupElement) -> Result<Self, ParseError> {
        expect_entity::<Self>(el)?;
        Ok(Self {
            source_name: el.require("sourceName")?,
            sink_node_id: el.require("sinkNodeId")?,
            sink_node_entity: el.require("sinkNodeEntity")?,
            association_type: el.require("associationType")?,
        })
    }
}

// ---------------------------------------------------------------------------
// Labels and properties
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalLabel {
    pub id: String,
    pub issue_id: String,
    /// Set when the label belongs to a labels custom field rather than the system field.
    pub field_id: Option<String>,
    pub label: String,
}

impl ExternalLabel {
    pub fn to_representation(&self) -> EntityRepresentation {
        EntityRepresentation::new(names::LABEL)
            .field("issue", &self.issue_id)
            .field("label", &self.label)
            .optional_field("fieldid", self.field_id.as_deref())
    }
}

impl FromElement for ExternalLabel {
    const ENTITY: &'static str = names::LABEL;

    fn from_element(el: &BackupElement) -> Result<Self, ParseError> {
        expect_entity::<Self>(el)?;
        Ok(Self {
            id: el.require("id")?,
            issue_id: el.require("issue")?,
            field_id: el.optional("fieldid"),
            label: el.require("label")?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalEntityProperty {
    pub id: String,
    pub entity_name: String,
    pub entity_id: String,
    pub key: String,
    pub value: Option<String>,
    pub created: Option<String>,
    pub updated: Option<String>,
}

impl ExternalEntityProperty {
    pub fn is_issue_property(&self) -> bool {
        self.entity_name == PROPERTY_ISSUE
    }

    pub fn is_second_degree(&self) -> bool {
        self.entity_name == PROPERTY_COMMENT || self.entity_name == PROPERTY_CHANGE_HISTORY
    }

    pub fn to_representation(&self) -> EntityRepresentation {
        EntityRepresentation::new(names::ENTITY_PROPERTY)
            .field("entityName", &self.entity_name)
            .field("entityId", &self.entity_id)
            .field("propertyKey", &self.key)
            .optional_field("value", self.value.as_deref())
            .optional_field("created", self.created.as_deref())
            .optional_field("updated", self.updated.as_deref())
    }
}

impl FromElement for ExternalEntityProperty {
    const ENTITY: &'static str = names::ENTITY_PROPERTY;

    fn from_element(el: &BackupElement) -> Result<Self, ParseError> {
        expect_entity::<Self>(el)?;
        Ok(Self {
            id: el.require("id")?,
            entity_name: el.require("entityName")?,
            entity_id: el.require("entityId")?,
            key: el.require("propertyKey")?,
            value: el.optional("value"),
            created: el.optional("created"),
            updated: el.optional("updated"),
        })
    }
}
