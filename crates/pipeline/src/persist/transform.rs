//! Rewriting backup entities onto target ids.
//!
//! Every function here is pure: it reads the mappers and returns the entity
//! to write. `Ok(None)` means the entity is dropped on purpose (its owner was
//! never written); an `Err` is recorded against the import.

use carryover_core::error::ParseError;
use carryover_core::external::custom_field::type_uses_options;
use carryover_core::external::related::{PROPERTY_CHANGE_HISTORY, PROPERTY_COMMENT};
use carryover_core::external::{
    names, BackupElement, EntityRepresentation, ExternalAttachment, ExternalChangeGroup,
    ExternalChangeItem, ExternalComment, ExternalComponent, ExternalCustomFieldValue,
    ExternalEntityProperty, ExternalIssue, ExternalLabel, ExternalLink, ExternalNodeAssociation,
    ExternalProject, ExternalUserAssociation, ExternalVersion, ExternalWorklog, FromElement,
};
use carryover_core::mapper::{IdMapper, MapperRegistry};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransformError {
    #[error("{kind} '{old_id}' has no mapped id in the target system")]
    Unmapped { kind: &'static str, old_id: String },
}

fn require(mapper: &IdMapper, old_id: &str) -> Result<String, TransformError> {
    mapper
        .mapped_id(old_id)
        .map(str::to_string)
        .ok_or_else(|| TransformError::Unmapped {
            kind: mapper.kind(),
            old_id: old_id.to_string(),
        })
}

fn optional(mapper: &IdMapper, old_id: Option<&str>) -> Result<Option<String>, TransformError> {
    old_id.map(|id| require(mapper, id)).transpose()
}

fn user(mappers: &MapperRegistry, name: Option<&str>) -> Option<String> {
    name.map(|n| mappers.user.mapped_user_key(n).to_string())
}

/// Group visibility levels keep their name when the group is not mapped.
fn group(mappers: &MapperRegistry, name: Option<&str>) -> Option<String> {
    name.map(|n| mappers.group.mapped_id(n).unwrap_or(n).to_string())
}

// ---------------------------------------------------------------------------
// Project, versions, components
// ---------------------------------------------------------------------------

pub fn project(mappers: &MapperRegistry, project: &ExternalProject) -> ExternalProject {
    ExternalProject {
        lead: user(mappers, project.lead.as_deref()),
        ..project.clone()
    }
}

pub fn version(version: &ExternalVersion, project_id: &str) -> ExternalVersion {
    ExternalVersion {
        project_id: project_id.to_string(),
        ..version.clone()
    }
}

pub fn component(mappers: &MapperRegistry, component: &ExternalComponent, project_id: &str) -> ExternalComponent {
    ExternalComponent {
        project_id: project_id.to_string(),
        lead: user(mappers, component.lead.as_deref()),
        ..component.clone()
    }
}

// ---------------------------------------------------------------------------
// Issues
// ---------------------------------------------------------------------------

/// The issue with every reference remapped. The id stays the backup id; the
/// store assigns the new one.
pub fn issue(mappers: &MapperRegistry, issue: &ExternalIssue, project_id: &str) -> Result<ExternalIssue, TransformError> {
    Ok(ExternalIssue {
        project_id: project_id.to_string(),
        issue_type: require(&mappers.issue_type.ids, &issue.issue_type)?,
        status: require(&mappers.status.ids, &issue.status)?,
        priority: optional(&mappers.priority, issue.priority.as_deref())?,
        resolution: optional(&mappers.resolution, issue.resolution.as_deref())?,
        security_level: optional(&mappers.issue_security_level, issue.security_level.as_deref())?,
        reporter: user(mappers, issue.reporter.as_deref()),
        assignee: user(mappers, issue.assignee.as_deref()),
        creator: user(mappers, issue.creator.as_deref()),
        ..issue.clone()
    })
}

// ---------------------------------------------------------------------------
// Issue-related entities
// ---------------------------------------------------------------------------

/// An entity owned directly by an issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssueRelated {
    Comment(ExternalComment),
    Worklog(ExternalWorklog),
    ChangeGroup(ExternalChangeGroup),
    Link(ExternalLink),
    NodeAssociation(ExternalNodeAssociation),
    UserAssociation(ExternalUserAssociation),
    Label(ExternalLabel),
    Property(ExternalEntityProperty),
}

impl IssueRelated {
    /// `Ok(None)` for elements of a related tag that are not imported
    /// (non-comment actions).
    pub fn from_element(el: &BackupElement) -> Result<Option<Self>, ParseError> {
        let entity = match el.name.as_str() {
            names::ACTION if !ExternalComment::is_comment(el) => return Ok(None),
            names::ACTION => Self::Comment(ExternalComment::from_element(el)?),
            names::WORKLOG => Self::Worklog(ExternalWorklog::from_element(el)?),
            names::CHANGE_GROUP => Self::ChangeGroup(ExternalChangeGroup::from_element(el)?),
            names::ISSUE_LINK => Self::Link(ExternalLink::from_element(el)?),
            names::NODE_ASSOCIATION => Self::NodeAssociation(ExternalNodeAssociation::from_element(el)?),
            names::USER_ASSOCIATION => Self::UserAssociation(ExternalUserAssociation::from_element(el)?),
            names::LABEL => Self::Label(ExternalLabel::from_element(el)?),
            names::ENTITY_PROPERTY => Self::Property(ExternalEntityProperty::from_element(el)?),
            _ => return Ok(None),
        };
        Ok(Some(entity))
    }

    pub fn entity_name(&self) -> &'static str {
        match self {
            Self::Comment(_) => names::ACTION,
            Self::Worklog(_) => names::WORKLOG,
            Self::ChangeGroup(_) => names::CHANGE_GROUP,
            Self::Link(_) => names::ISSUE_LINK,
            Self::NodeAssociation(_) => names::NODE_ASSOCIATION,
            Self::UserAssociation(_) => names::USER_ASSOCIATION,
            Self::Label(_) => names::LABEL,
            Self::Property(_) => names::ENTITY_PROPERTY,
        }
    }

    /// Backup id of the owning issue. For links, the source.
    pub fn issue_id(&self) -> &str {
        match self {
            Self::Comment(c) => &c.issue_id,
            Self::Worklog(w) => &w.issue_id,
            Self::ChangeGroup(g) => &g.issue_id,
            Self::Link(l) => &l.source_id,
            Self::NodeAssociation(a) => &a.source_node_id,
            Self::UserAssociation(a) => &a.sink_node_id,
            Self::Label(l) => &l.issue_id,
            Self::Property(p) => &p.entity_id,
        }
    }

    /// Backup id used in messages; associations have none of their own.
    pub fn display_id(&self) -> &str {
        match self {
            Self::Comment(c) => &c.id,
            Self::Worklog(w) => &w.id,
            Self::ChangeGroup(g) => &g.id,
            Self::Link(l) => &l.id,
            Self::NodeAssociation(a) => &a.sink_node_id,
            Self::UserAssociation(a) => &a.source_name,
            Self::Label(l) => &l.id,
            Self::Property(p) => &p.id,
        }
    }
}

fn issue_id(mappers: &MapperRegistry, old_id: &str) -> Option<String> {
    mappers.issue.mapped_id(old_id).map(str::to_string)
}

/// Remap a non-link issue-related entity. Links go through [`link`].
pub fn issue_related(mappers: &MapperRegistry, entity: &IssueRelated) -> Result<Option<EntityRepresentation>, TransformError> {
    if let IssueRelated::Link(_) = entity {
        return Ok(None);
    }
    let Some(new_issue) = issue_id(mappers, entity.issue_id()) else {
        return Ok(None);
    };
    let representation = match entity {
        IssueRelated::Comment(c) => ExternalComment {
            issue_id: new_issue,
            author: user(mappers, c.author.as_deref()),
            update_author: user(mappers, c.update_author.as_deref()),
            group_level: group(mappers, c.group_level.as_deref()),
            role_level: optional(&mappers.project_role, c.role_level.as_deref())?,
            ..c.clone()
        }
        .to_representation(),
        IssueRelated::Worklog(w) => ExternalWorklog {
            issue_id: new_issue,
            author: user(mappers, w.author.as_deref()),
            update_author: user(mappers, w.update_author.as_deref()),
            group_level: group(mappers, w.group_level.as_deref()),
            role_level: optional(&mappers.project_role, w.role_level.as_deref())?,
            ..w.clone()
        }
        .to_representation(),
        IssueRelated::ChangeGroup(g) => ExternalChangeGroup {
            issue_id: new_issue,
            author: user(mappers, g.author.as_deref()),
            ..g.clone()
        }
        .to_representation(),
        IssueRelated::NodeAssociation(a) => {
            let sink_mapper = if a.is_version_association() {
                &mappers.version
            } else if a.is_component_association() {
                &mappers.component
            } else {
                return Ok(None);
            };
            // Versions or components that failed to write drop their associations.
            let Some(sink) = sink_mapper.mapped_id(&a.sink_node_id) else {
                return Ok(None);
            };
            ExternalNodeAssociation {
                source_node_id: new_issue,
                sink_node_id: sink.to_string(),
                ..a.clone()
            }
            .to_representation()
        }
        IssueRelated::UserAssociation(a) => ExternalUserAssociation {
            source_name: mappers.user.mapped_user_key(&a.source_name).to_string(),
            sink_node_id: new_issue,
            ..a.clone()
        }
        .to_representation(),
        IssueRelated::Label(l) => ExternalLabel {
            issue_id: new_issue,
            field_id: optional(&mappers.custom_field.ids, l.field_id.as_deref())?,
            ..l.clone()
        }
        .to_representation(),
        IssueRelated::Property(p) => ExternalEntityProperty {
            entity_id: new_issue,
            ..p.clone()
        }
        .to_representation(),
        IssueRelated::Link(_) => return Ok(None),
    };
    Ok(Some(representation))
}

/// Remap a link whose ends were resolved to target issue ids.
pub fn link(mappers: &MapperRegistry, link: &ExternalLink, source: String, destination: String) -> Result<EntityRepresentation, TransformError> {
    Ok(ExternalLink {
        link_type: require(&mappers.issue_link_type, &link.link_type)?,
        source_id: source,
        destination_id: destination,
        ..link.clone()
    }
    .to_representation())
}

// ---------------------------------------------------------------------------
// Second-degree entities
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecondDegree {
    ChangeItem(ExternalChangeItem),
    Property(ExternalEntityProperty),
}

impl SecondDegree {
    pub fn from_element(el: &BackupElement) -> Result<Option<Self>, ParseError> {
        match el.name.as_str() {
            names::CHANGE_ITEM => Ok(Some(Self::ChangeItem(ExternalChangeItem::from_element(el)?))),
            names::ENTITY_PROPERTY => {
                let property = ExternalEntityProperty::from_element(el)?;
                Ok(property.is_second_degree().then_some(Self::Property(property)))
            }
            _ => Ok(None),
        }
    }

    pub fn entity_name(&self) -> &'static str {
        match self {
            Self::ChangeItem(_) => names::CHANGE_ITEM,
            Self::Property(_) => names::ENTITY_PROPERTY,
        }
    }

    pub fn display_id(&self) -> &str {
        match self {
            Self::ChangeItem(i) => &i.id,
            Self::Property(p) => &p.id,
        }
    }
}

/// Remap a second-degree entity onto its owner's new id; dropped when the
/// owner was not written.
pub fn second_degree(mappers: &MapperRegistry, entity: &SecondDegree) -> Option<EntityRepresentation> {
    match entity {
        SecondDegree::ChangeItem(item) => {
            let group = mappers.change_group.mapped_id(&item.change_group_id)?;
            Some(
                ExternalChangeItem {
                    change_group_id: group.to_string(),
                    ..item.clone()
                }
                .to_representation(),
            )
        }
        SecondDegree::Property(property) => {
            let owner = match property.entity_name.as_str() {
                PROPERTY_COMMENT => &mappers.comment,
                PROPERTY_CHANGE_HISTORY => &mappers.change_group,
                _ => return None,
            };
            let entity_id = owner.mapped_id(&property.entity_id)?;
            Some(
                ExternalEntityProperty {
                    entity_id: entity_id.to_string(),
                    ..property.clone()
                }
                .to_representation(),
            )
        }
    }
}

// ---------------------------------------------------------------------------
// Custom field values and attachments
// ---------------------------------------------------------------------------

/// Remap a custom field value. Values of ignored fields and of unwritten
/// issues are dropped; option-backed values point at the mapped options.
pub fn custom_field_value(
    mappers: &MapperRegistry,
    value: &ExternalCustomFieldValue,
) -> Result<Option<EntityRepresentation>, TransformError> {
    let fields = &mappers.custom_field;
    if fields.is_ignored(&value.custom_field_id) {
        return Ok(None);
    }
    let Some(new_issue) = issue_id(mappers, &value.issue_id) else {
        return Ok(None);
    };
    let new_field = require(&fields.ids, &value.custom_field_id)?;
    let uses_options = fields.type_key(&value.custom_field_id).is_some_and(type_uses_options);

    let remap = |raw: Option<&str>| -> Result<Option<String>, TransformError> {
        if uses_options {
            optional(&mappers.custom_field_option.ids, raw)
        } else {
            Ok(raw.map(str::to_string))
        }
    };
    let remapped = ExternalCustomFieldValue {
        issue_id: new_issue,
        custom_field_id: new_field,
        parent_key: remap(value.parent_key.as_deref())?,
        string_value: remap(value.string_value.as_deref())?,
        ..value.clone()
    };

    Ok(Some(
        EntityRepresentation::new(names::CUSTOM_FIELD_VALUE)
            .field("issue", &remapped.issue_id)
            .field("customfield", &remapped.custom_field_id)
            .optional_field("parentkey", remapped.parent_key.as_deref())
            .optional_field("stringvalue", remapped.string_value.as_deref())
            .optional_field("numbervalue", remapped.number_value.as_deref())
            .optional_field("textvalue", remapped.text_value.as_deref())
            .optional_field("datevalue", remapped.date_value.as_deref()),
    ))
}

/// The attachment onto the new issue, or `None` when the issue was not written.
pub fn attachment(mappers: &MapperRegistry, attachment: &ExternalAttachment) -> Option<ExternalAttachment> {
    let new_issue = issue_id(mappers, &attachment.issue_id)?;
    Some(ExternalAttachment {
        issue_id: new_issue,
        attacher: user(mappers, attachment.attacher.as_deref()),
        ..attachment.clone()
    })
}
