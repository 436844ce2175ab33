use std::collections::BTreeMap;

use async_trait::async_trait;

use carryover_core::backup::BackupProject;
use carryover_core::error::ParseError;
use carryover_core::external::custom_field::type_uses_options;
use carryover_core::external::{
    names, BackupElement, ExternalChangeGroup, ExternalComment, ExternalCustomField,
    ExternalCustomFieldOption, ExternalCustomFieldValue, ExternalIssue, ExternalLink,
    ExternalProjectRoleActor, ExternalUser, ExternalUserAssociation, ExternalWorklog, FromElement,
};
use carryover_core::mapper::MapperRegistry;

use crate::error::HandlerError;
use crate::scanner::EntityHandler;

const SUBTASK_STYLE: &str = "jira_subtask";

const REGISTERED_ENTITIES: &[&str] = &[
    names::USER,
    names::GROUP,
    names::ISSUE_TYPE,
    names::STATUS,
    names::PRIORITY,
    names::RESOLUTION,
    names::PROJECT_ROLE,
    names::ISSUE_LINK_TYPE,
    names::SECURITY_LEVEL,
    names::CUSTOM_FIELD,
    names::CUSTOM_FIELD_OPTION,
    names::PROJECT_ROLE_ACTOR,
    names::PROJECT,
    names::VERSION,
    names::COMPONENT,
    names::ISSUE,
    names::ACTION,
    names::WORKLOG,
    names::CHANGE_GROUP,
    names::ISSUE_LINK,
    names::USER_ASSOCIATION,
    names::CUSTOM_FIELD_VALUE,
];

/// A custom field value seen before the issue or field it depends on.
struct PendingValue {
    custom_field_id: String,
    issue_id: String,
    option_refs: Vec<String>,
}

/// Registers old ids from their defining elements and flags the ids the
/// project's data refers to.
///
/// Custom field values are resolved at the end of the document because the
/// owning issue's type and the field's type may appear after the value.
pub struct MapperRegistrationHandler<'a> {
    mappers: &'a mut MapperRegistry,
    project: &'a BackupProject,
    issue_types_by_issue: BTreeMap<String, String>,
    pending_values: Vec<PendingValue>,
    skipped: usize,
}

impl<'a> MapperRegistrationHandler<'a> {
    pub fn new(mappers: &'a mut MapperRegistry, project: &'a BackupProject) -> Self {
        Self {
            mappers,
            project,
            issue_types_by_issue: BTreeMap::new(),
            pending_values: Vec::new(),
            skipped: 0,
        }
    }

    /// Elements that failed to parse and were skipped.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    fn project_id(&self) -> &str {
        &self.project.project.id
    }

    fn in_project(&self, issue_id: &str) -> bool {
        self.project.contains_issue(issue_id)
    }

    fn flag_user(&mut self, name: Option<&str>) {
        if let Some(name) = name {
            self.mappers.user.flag_user_as_in_use(name);
        }
    }

    fn register_named(&mut self, el: &BackupElement, name_attr: &str) {
        let (Some(id), name) = (el.get("id"), el.get(name_attr)) else {
            return;
        };
        let mapper = match el.name.as_str() {
            names::STATUS => &mut self.mappers.status.ids,
            names::PRIORITY => &mut self.mappers.priority,
            names::RESOLUTION => &mut self.mappers.resolution,
            names::PROJECT_ROLE => &mut self.mappers.project_role,
            names::ISSUE_LINK_TYPE => &mut self.mappers.issue_link_type,
            names::SECURITY_LEVEL => &mut self.mappers.issue_security_level,
            names::VERSION => &mut self.mappers.version,
            names::COMPONENT => &mut self.mappers.component,
            _ => return,
        };
        mapper.register_old_value(id, name);
    }

    fn register(&mut self, el: &BackupElement) -> Result<(), ParseError> {
        match el.name.as_str() {
            names::USER => self.mappers.user.register_user(ExternalUser::from_element(el)?),
            names::GROUP => {
                if let Some(name) = el.get("groupName") {
                    self.mappers.group.register_old_value(name, Some(name));
                }
            }
            names::ISSUE_TYPE => {
                let id = el.require("id")?;
                let name = el.require("name")?;
                let subtask = el.get("style") == Some(SUBTASK_STYLE);
                self.mappers.issue_type.register_issue_type(&id, &name, subtask);
            }
            names::STATUS | names::PRIORITY | names::RESOLUTION | names::PROJECT_ROLE | names::SECURITY_LEVEL => {
                self.register_named(el, "name")
            }
            names::ISSUE_LINK_TYPE => self.register_named(el, "linkname"),
            names::VERSION | names::COMPONENT => {
                if el.get("project") == Some(self.project_id()) {
                    self.register_named(el, "name");
                }
            }
            names::CUSTOM_FIELD => self
                .mappers
                .custom_field
                .register_custom_field(&ExternalCustomField::from_element(el)?),
            names::CUSTOM_FIELD_OPTION => self
                .mappers
                .custom_field_option
                .register_option(ExternalCustomFieldOption::from_element(el)?),
            names::PROJECT => {
                if el.get("id") == Some(self.project_id()) {
                    let key = self.project.key().to_string();
                    let id = self.project_id().to_string();
                    self.mappers.project.register_old_value(&id, Some(&key));
                }
            }
            names::PROJECT_ROLE_ACTOR => {
                let actor = ExternalProjectRoleActor::from_element(el)?;
                if actor.project_id.as_deref() == Some(self.project_id()) {
                    self.mappers.project_role.flag_value_as_required(&actor.role_id);
                    self.mappers.project_role_actor.flag_value_actor_as_in_use(actor);
                }
            }
            names::ISSUE => self.register_issue(el)?,
            names::ACTION => {
                if ExternalComment::is_comment(el) && el.get("issue").is_some_and(|i| self.in_project(i)) {
                    let comment = ExternalComment::from_element(el)?;
                    self.mappers.comment.register_old_value(&comment.id, None);
                    self.flag_user(comment.author.as_deref());
                    self.flag_user(comment.update_author.as_deref());
                    self.flag_visibility(comment.group_level.as_deref(), comment.role_level.as_deref());
                }
            }
            names::WORKLOG => {
                if el.get("issue").is_some_and(|i| self.in_project(i)) {
                    let worklog = ExternalWorklog::from_element(el)?;
                    self.flag_user(worklog.author.as_deref());
                    self.flag_user(worklog.update_author.as_deref());
                    self.flag_visibility(worklog.group_level.as_deref(), worklog.role_level.as_deref());
                }
            }
            names::CHANGE_GROUP => {
                if el.get("issue").is_some_and(|i| self.in_project(i)) {
                    let group = ExternalChangeGroup::from_element(el)?;
                    self.mappers.change_group.register_old_value(&group.id, None);
                    self.flag_user(group.author.as_deref());
                }
            }
            names::ISSUE_LINK => {
                let link = ExternalLink::from_element(el)?;
                if self.in_project(&link.source_id) || self.in_project(&link.destination_id) {
                    self.mappers.issue_link_type.flag_value_as_required(&link.link_type);
                }
            }
            names::USER_ASSOCIATION => {
                let association = ExternalUserAssociation::from_element(el)?;
                if self.in_project(&association.sink_node_id) {
                    self.mappers.user.flag_user_as_in_use(&association.source_name);
                }
            }
            names::CUSTOM_FIELD_VALUE => {
                let value = ExternalCustomFieldValue::from_element(el)?;
                if self.in_project(&value.issue_id) {
                    let option_refs = value
                        .parent_key
                        .iter()
                        .map(String::as_str)
                        .chain(value.value())
                        .map(str::to_string)
                        .collect();
                    self.pending_values.push(PendingValue {
                        custom_field_id: value.custom_field_id,
                        issue_id: value.issue_id,
                        option_refs,
                    });
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn register_issue(&mut self, el: &BackupElement) -> Result<(), ParseError> {
        if !el.get("id").is_some_and(|id| self.in_project(id)) {
            return Ok(());
        }
        let issue = ExternalIssue::from_element(el)?;
        let mappers = &mut *self.mappers;
        mappers.issue.register_old_value(&issue.id, Some(&issue.key));
        mappers.project.flag_value_as_required(&issue.project_id);
        mappers.issue_type.ids.flag_value_as_required(&issue.issue_type);
        mappers.status.flag_value_as_required(&issue.status, &issue.issue_type);
        if let Some(priority) = &issue.priority {
            mappers.priority.flag_value_as_required(priority);
        }
        if let Some(resolution) = &issue.resolution {
            mappers.resolution.flag_value_as_required(resolution);
        }
        if let Some(level) = &issue.security_level {
            mappers.issue_security_level.flag_value_as_required(level);
        }
        for user in [&issue.reporter, &issue.assignee, &issue.creator].into_iter().flatten() {
            mappers.user.flag_user_as_in_use(user);
        }
        self.issue_types_by_issue.insert(issue.id, issue.issue_type);
        Ok(())
    }

    fn flag_visibility(&mut self, group_level: Option<&str>, role_level: Option<&str>) {
        if let Some(group) = group_level {
            self.mappers.group.flag_value_as_required(group);
        }
        if let Some(role) = role_level {
            self.mappers.project_role.flag_value_as_required(role);
        }
    }

    fn resolve_pending_values(&mut self) {
        for value in std::mem::take(&mut self.pending_values) {
            let Some(issue_type) = self.issue_types_by_issue.get(&value.issue_id) else {
                continue;
            };
            let fields = &mut self.mappers.custom_field;
            fields.flag_value_as_required(&value.custom_field_id, issue_type);
            if fields.type_key(&value.custom_field_id).is_some_and(type_uses_options) {
                for option in &value.option_refs {
                    self.mappers
                        .custom_field_option
                        .ids
                        .flag_value_as_required(option);
                }
            }
        }
    }
}

#[async_trait]
impl EntityHandler for MapperRegistrationHandler<'_> {
    fn entity_names(&self) -> &'static [&'static str] {
        REGISTERED_ENTITIES
    }

    async fn handle_entity(&mut self, element: &BackupElement) -> Result<(), HandlerError> {
        if let Err(err) = self.register(element) {
            self.skipped += 1;
            tracing::warn!(entity = %element.name, error = %err, "Skipping malformed backup element");
        }
        Ok(())
    }

    async fn end_document(&mut self) -> Result<(), HandlerError> {
        self.resolve_pending_values();
        if self.skipped > 0 {
            tracing::warn!(skipped = self.skipped, "Backup elements skipped during registration");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use carryover_core::external::ExternalProject;

    use super::*;

    fn project() -> BackupProject {
        BackupProject {
            project: ExternalProject {
                id: "10".into(),
                key: "MNK".into(),
                name: "Monkey".into(),
                ..Default::default()
            },
            issue_ids: ["100".to_string()].into(),
            ..Default::default()
        }
    }

    fn feed(handler: &mut MapperRegistrationHandler<'_>, elements: &[BackupElement]) {
        for el in elements {
            handler.register(el).unwrap();
        }
        handler.resolve_pending_values();
    }

    #[test]
    fn issue_flags_everything_it_refers_to() {
        let project = project();
        let mut mappers = MapperRegistry::new();
        let mut handler = MapperRegistrationHandler::new(&mut mappers, &project);
        feed(
            &mut handler,
            &[
                BackupElement::new("Issue")
                    .with_attr("id", "100")
                    .with_attr("key", "MNK-1")
                    .with_attr("project", "10")
                    .with_attr("type", "1")
                    .with_attr("status", "3")
                    .with_attr("priority", "2")
                    .with_attr("reporter", "fred")
                    .with_attr("summary", "Bananas"),
                BackupElement::new("Issue")
                    .with_attr("id", "200")
                    .with_attr("key", "OTH-1")
                    .with_attr("project", "20")
                    .with_attr("type", "9")
                    .with_attr("status", "9")
                    .with_attr("summary", "Other"),
            ],
        );

        assert_eq!(mappers.issue.key("100"), Some("MNK-1"));
        assert!(!mappers.issue.is_registered("200"));
        assert!(mappers.issue_type.ids.is_required("1"));
        assert!(!mappers.issue_type.ids.is_required("9"));
        assert_eq!(mappers.status.issue_types_for_status("3").collect::<Vec<_>>(), vec!["1"]);
        assert!(mappers.priority.is_required("2"));
        assert!(mappers.user.ids.is_required("fred"));
        assert!(mappers.project.is_required("10"));
    }

    #[test]
    fn values_seen_before_their_issue_are_resolved_at_the_end() {
        let project = project();
        let mut mappers = MapperRegistry::new();
        let mut handler = MapperRegistrationHandler::new(&mut mappers, &project);
        feed(
            &mut handler,
            &[
                BackupElement::new("CustomFieldValue")
                    .with_attr("id", "1")
                    .with_attr("customfield", "500")
                    .with_attr("issue", "100")
                    .with_attr("stringvalue", "42"),
                BackupElement::new("CustomField")
                    .with_attr("id", "500")
                    .with_attr("name", "Colour")
                    .with_attr("customfieldtypekey", "x:select"),
                BackupElement::new("Issue")
                    .with_attr("id", "100")
                    .with_attr("key", "MNK-1")
                    .with_attr("project", "10")
                    .with_attr("type", "1")
                    .with_attr("status", "3")
                    .with_attr("summary", "Bananas"),
            ],
        );
        assert_eq!(mappers.custom_field.issue_types_in_use("500").collect::<Vec<_>>(), vec!["1"]);
        assert!(mappers.custom_field_option.ids.is_required("42"));
    }

    #[test]
    fn role_actors_of_other_projects_are_ignored() {
        let project = project();
        let mut mappers = MapperRegistry::new();
        let mut handler = MapperRegistrationHandler::new(&mut mappers, &project);
        let actor = |pid: &str| {
            BackupElement::new("ProjectRoleActor")
                .with_attr("pid", pid)
                .with_attr("projectroleid", "7")
                .with_attr("roletype", "atlassian-user-role-actor")
                .with_attr("roletypeparameter", "fred")
        };
        feed(&mut handler, &[actor("10"), actor("20")]);
        assert_eq!(mappers.project_role_actor.len(), 1);
        assert!(mappers.project_role.is_required("7"));
        assert!(!mappers.user.ids.is_required("fred"));
    }
}
