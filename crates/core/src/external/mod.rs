//! External entities: immutable records rebuilt from backup XML elements.
//!
//! Every top-level element of a backup arrives as a [`BackupElement`] (tag
//! name plus a flat attribute map). The typed records in the submodules are
//! built from it through [`FromElement`]; a failed conversion is a
//! [`ParseError`] and the element is skipped by the caller.

pub mod attachment;
pub mod custom_field;
pub mod issue;
pub mod project;
pub mod related;
pub mod representation;
pub mod role;
pub mod user;

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ParseError;

pub use attachment::ExternalAttachment;
pub use custom_field::{
    ExternalCustomField, ExternalCustomFieldConfiguration, ExternalCustomFieldOption,
    ExternalCustomFieldValue,
};
pub use issue::ExternalIssue;
pub use project::{ExternalComponent, ExternalProject, ExternalVersion};
pub use related::{
    ExternalChangeGroup, ExternalChangeItem, ExternalComment, ExternalEntityProperty,
    ExternalLabel, ExternalLink, ExternalNodeAssociation, ExternalUserAssociation,
    ExternalWorklog,
};
pub use representation::EntityRepresentation;
pub use role::ExternalProjectRoleActor;
pub use user::ExternalUser;

/// Tag names of the backup elements the import understands.
pub mod names {
    pub const ROOT: &str = "entity-engine-xml";

    pub const PROJECT: &str = "Project";
    pub const VERSION: &str = "Version";
    pub const COMPONENT: &str = "Component";
    pub const ISSUE: &str = "Issue";
    pub const USER: &str = "User";
    pub const GROUP: &str = "Group";
    pub const ISSUE_TYPE: &str = "IssueType";
    pub const STATUS: &str = "Status";
    pub const PRIORITY: &str = "Priority";
    pub const RESOLUTION: &str = "Resolution";
    pub const CUSTOM_FIELD: &str = "CustomField";
    pub const CONFIGURATION_CONTEXT: &str = "ConfigurationContext";
    pub const FIELD_CONFIG_SCHEME_ISSUE_TYPE: &str = "FieldConfigSchemeIssueType";
    pub const CUSTOM_FIELD_OPTION: &str = "CustomFieldOption";
    pub const CUSTOM_FIELD_VALUE: &str = "CustomFieldValue";
    pub const FILE_ATTACHMENT: &str = "FileAttachment";
    pub const ACTION: &str = "Action";
    pub const WORKLOG: &str = "Worklog";
    pub const CHANGE_GROUP: &str = "ChangeGroup";
    pub const CHANGE_ITEM: &str = "ChangeItem";
    pub const ISSUE_LINK: &str = "IssueLink";
    pub const ISSUE_LINK_TYPE: &str = "IssueLinkType";
    pub const NODE_ASSOCIATION: &str = "NodeAssociation";
    pub const USER_ASSOCIATION: &str = "UserAssociation";
    pub const LABEL: &str = "Label";
    pub const ENTITY_PROPERTY: &str = "EntityProperty";
    pub const PROJECT_ROLE: &str = "ProjectRole";
    pub const PROJECT_ROLE_ACTOR: &str = "ProjectRoleActor";
    pub const SECURITY_LEVEL: &str = "SchemeIssueSecurityLevels";
    pub const PLUGIN_VERSION: &str = "PluginVersion";
    pub const OS_PROPERTY_ENTRY: &str = "OSPropertyEntry";
    pub const OS_PROPERTY_STRING: &str = "OSPropertyString";
    pub const OS_PROPERTY_NUMBER: &str = "OSPropertyNumber";

    /// Issue-related entities: owned directly by an issue.
    pub const ISSUE_RELATED: &[&str] = &[
        ACTION,
        WORKLOG,
        CHANGE_GROUP,
        ISSUE_LINK,
        NODE_ASSOCIATION,
        USER_ASSOCIATION,
        LABEL,
        ENTITY_PROPERTY,
    ];

    /// Second-degree entities: owned by an issue-related entity.
    pub const SECOND_DEGREE: &[&str] = &[CHANGE_ITEM, ENTITY_PROPERTY];
}

/// One top-level element of a backup document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupElement {
    pub name: String,
    pub attributes: BTreeMap<String, String>,
}

impl BackupElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Builder-style attribute setter, mostly useful for fixtures.
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Attribute value; empty strings are treated as absent.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.attributes
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn optional(&self, key: &str) -> Option<String> {
        self.get(key).map(str::to_string)
    }

    pub fn require(&self, key: &'static str) -> Result<String, ParseError> {
        self.get(key)
            .map(str::to_string)
            .ok_or_else(|| ParseError::MissingAttribute {
                entity: self.name.clone(),
                attribute: key,
            })
    }

    pub fn parse_optional<T: FromStr>(&self, key: &'static str) -> Result<Option<T>, ParseError> {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => raw
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| ParseError::InvalidAttribute {
                    entity: self.name.clone(),
                    attribute: key,
                    value: raw.to_string(),
                }),
        }
    }

    /// Boolean attribute. Accepts `true`/`false` and `1`/`0`; absent means `default`.
    pub fn flag(&self, key: &'static str, default: bool) -> Result<bool, ParseError> {
        match self.get(key) {
            None => Ok(default),
            Some("true") | Some("1") => Ok(true),
            Some("false") | Some("0") => Ok(false),
            Some(other) => Err(ParseError::InvalidAttribute {
                entity: self.name.clone(),
                attribute: key,
                value: other.to_string(),
            }),
        }
    }

    pub fn is(&self, name: &str) -> bool {
        self.name == name
    }
}

/// Conversion from a raw backup element into a typed external entity.
pub trait FromElement: Sized {
    /// Tag name this entity is read from.
    const ENTITY: &'static str;

    fn from_element(element: &BackupElement) -> Result<Self, ParseError>;
}

/// Reject elements whose tag does not match `T::ENTITY`.
pub(crate) fn expect_entity<T: FromElement>(element: &BackupElement) -> Result<(), ParseError> {
    if element.is(T::ENTITY) {
        Ok(())
    } else {
        Err(ParseError::UnexpectedEntity {
            expected: T::ENTITY,
            found: element.name.clone(),
        })
    }
}
