//! Discovery pass: which projects a backup holds and what each one owns.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use async_trait::async_trait;

use carryover_core::backup::{BackupOverview, BackupProject, BackupSystemInformation};
use carryover_core::external::custom_field::field_id_from_key;
use carryover_core::external::{
    names, BackupElement, ExternalComponent, ExternalCustomField,
    ExternalCustomFieldConfiguration, ExternalProject, ExternalVersion, FromElement,
};
use carryover_core::progress::EntityCountProgress;

use crate::error::{HandlerError, ScanError};
use crate::scanner::{scan, DispatchTable, EntityHandler};

const OVERVIEW_ENTITIES: &[&str] = &[
    names::PROJECT,
    names::VERSION,
    names::COMPONENT,
    names::CUSTOM_FIELD,
    names::CONFIGURATION_CONTEXT,
    names::FIELD_CONFIG_SCHEME_ISSUE_TYPE,
    names::ISSUE,
    names::PLUGIN_VERSION,
    names::OS_PROPERTY_ENTRY,
    names::OS_PROPERTY_STRING,
    names::OS_PROPERTY_NUMBER,
];

/// Application properties the import reads from the backup.
const PROPERTY_BUILD_NUMBER: &str = "jira.version.patched";
const PROPERTY_ALLOW_UNASSIGNED: &str = "jira.option.allowunassigned";

/// A configuration context row: the field scheme of one field, either for
/// one project or globally.
struct FieldContext {
    project_id: Option<String>,
    field_id: String,
    scheme_id: String,
}

/// Collects the raw rows of the discovery pass.
#[derive(Default)]
pub struct BackupOverviewHandler {
    projects: Vec<ExternalProject>,
    versions: BTreeMap<String, Vec<ExternalVersion>>,
    components: BTreeMap<String, Vec<ExternalComponent>>,
    custom_fields: Vec<ExternalCustomField>,
    contexts: Vec<FieldContext>,
    /// Scheme id to its issue types. `None` once a row applies to every type.
    scheme_issue_types: BTreeMap<String, Option<BTreeSet<String>>>,
    issues_by_project: BTreeMap<String, BTreeSet<String>>,
    security_levels_by_project: BTreeMap<String, BTreeSet<String>>,
    issue_keys_by_id: BTreeMap<String, String>,
    plugin_versions: BTreeMap<String, String>,
    /// Property entry id to property key, for the properties of interest.
    property_keys: BTreeMap<String, String>,
    /// Property entry id to its string or number value.
    property_values: BTreeMap<String, String>,
    skipped: usize,
}

impl BackupOverviewHandler {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&mut self, el: &BackupElement) -> Result<(), carryover_core::error::ParseError> {
        match el.name.as_str() {
            names::PROJECT => self.projects.push(ExternalProject::from_element(el)?),
            names::VERSION => {
                let version = ExternalVersion::from_element(el)?;
                self.versions.entry(version.project_id.clone()).or_default().push(version);
            }
            names::COMPONENT => {
                let component = ExternalComponent::from_element(el)?;
                self.components
                    .entry(component.project_id.clone())
                    .or_default()
                    .push(component);
            }
            names::CUSTOM_FIELD => self.custom_fields.push(ExternalCustomField::from_element(el)?),
            names::CONFIGURATION_CONTEXT => {
                // Contexts of system fields have no scheme and no custom field key.
                if let (Some(key), Some(scheme)) = (el.get("key"), el.get("fieldconfigscheme")) {
                    self.contexts.push(FieldContext {
                        project_id: el.optional("project"),
                        field_id: field_id_from_key(key).to_string(),
                        scheme_id: scheme.to_string(),
                    });
                }
            }
            names::FIELD_CONFIG_SCHEME_ISSUE_TYPE => {
                let scheme = el.require("fieldconfigscheme")?;
                let entry = self
                    .scheme_issue_types
                    .entry(scheme)
                    .or_insert_with(|| Some(BTreeSet::new()));
                match el.get("issuetype") {
                    None => *entry = None,
                    Some(issue_type) => {
                        if let Some(types) = entry {
                            types.insert(issue_type.to_string());
                        }
                    }
                }
            }
            names::ISSUE => {
                let id = el.require("id")?;
                let project = el.require("project")?;
                if let Some(level) = el.get("security") {
                    self.security_levels_by_project
                        .entry(project.clone())
                        .or_default()
                        .insert(level.to_string());
                }
                if let Some(key) = el.get("key") {
                    self.issue_keys_by_id.insert(id.clone(), key.to_string());
                }
                self.issues_by_project.entry(project).or_default().insert(id);
            }
            names::PLUGIN_VERSION => {
                let key = el.require("key")?;
                let version = el.require("version")?;
                self.plugin_versions.insert(key, version);
            }
            names::OS_PROPERTY_ENTRY => {
                let key = el.require("propertyKey")?;
                if key == PROPERTY_BUILD_NUMBER || key == PROPERTY_ALLOW_UNASSIGNED {
                    self.property_keys.insert(el.require("id")?, key);
                }
            }
            names::OS_PROPERTY_STRING | names::OS_PROPERTY_NUMBER => {
                if let Some(value) = el.get("value") {
                    self.property_values.insert(el.require("id")?, value.to_string());
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Custom fields configured for `project_id`. A project-specific context
    /// wins over the global one.
    fn configurations_for(&self, project_id: &str) -> Vec<ExternalCustomFieldConfiguration> {
        self.custom_fields
            .iter()
            .filter_map(|field| {
                let mut contexts = self.contexts.iter().filter(|c| c.field_id == field.id);
                let context = contexts
                    .clone()
                    .find(|c| c.project_id.as_deref() == Some(project_id))
                    .or_else(|| contexts.find(|c| c.project_id.is_none()))?;
                Some(ExternalCustomFieldConfiguration {
                    field: field.clone(),
                    constrained_issue_types: self
                        .scheme_issue_types
                        .get(&context.scheme_id)
                        .cloned()
                        .flatten(),
                    config_scheme_id: context.scheme_id.clone(),
                })
            })
            .collect()
    }

    fn property(&self, key: &str) -> Option<&str> {
        self.property_keys
            .iter()
            .find(|(_, k)| k.as_str() == key)
            .and_then(|(id, _)| self.property_values.get(id))
            .map(String::as_str)
    }

    /// Assemble the overview. `entity_count` is the number of top-level elements scanned.
    pub fn into_overview(mut self, entity_count: usize) -> BackupOverview {
        let projects = std::mem::take(&mut self.projects)
            .into_iter()
            .map(|project| {
                let id = project.id.clone();
                let backup_project = BackupProject {
                    versions: self.versions.remove(&id).unwrap_or_default(),
                    components: self.components.remove(&id).unwrap_or_default(),
                    custom_fields: self.configurations_for(&id),
                    issue_ids: self.issues_by_project.remove(&id).unwrap_or_default(),
                    issue_security_level_ids: self
                        .security_levels_by_project
                        .remove(&id)
                        .unwrap_or_default(),
                    project,
                };
                (backup_project.project.key.clone(), backup_project)
            })
            .collect();

        let build_number = self.property(PROPERTY_BUILD_NUMBER).map(str::to_string);
        let unassigned_issues_allowed =
            self.property(PROPERTY_ALLOW_UNASSIGNED).map(str::trim) == Some("1");
        BackupOverview {
            projects,
            system: BackupSystemInformation {
                issue_keys_by_id: self.issue_keys_by_id,
                entity_count,
                build_number,
                plugin_versions: self.plugin_versions,
                unassigned_issues_allowed,
            },
        }
    }
}

#[async_trait]
impl EntityHandler for BackupOverviewHandler {
    fn entity_names(&self) -> &'static [&'static str] {
        OVERVIEW_ENTITIES
    }

    async fn handle_entity(&mut self, element: &BackupElement) -> Result<(), HandlerError> {
        if let Err(err) = self.read(element) {
            self.skipped += 1;
            tracing::warn!(entity = %element.name, error = %err, "Skipping malformed backup element");
        }
        Ok(())
    }
}

/// Scan the backup at `path` once and describe its projects.
pub async fn read_backup_overview(
    path: &Path,
    progress: Option<&EntityCountProgress>,
) -> Result<BackupOverview, ScanError> {
    let mut handler = BackupOverviewHandler::new();
    let summary = {
        let mut table = DispatchTable::new();
        if let Some(progress) = progress {
            table = table.with_progress(progress);
        }
        table.register(&mut handler);
        scan(path, &mut table).await?
    };
    let overview = handler.into_overview(summary.elements_seen);
    tracing::info!(
        projects = overview.projects.len(),
        entities = overview.system.entity_count,
        "Backup overview read"
    );
    Ok(overview)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const BACKUP: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<entity-engine-xml>
    <Project id="10" key="MNK" name="Monkey" counter="3"/>
    <Project id="20" key="OTH" name="Other"/>
    <Version id="1" project="10" name="1.0" sequence="1"/>
    <Component id="2" project="20" name="Core"/>
    <CustomField id="500" name="Colour" customfieldtypekey="x:select"/>
    <CustomField id="501" name="Size" customfieldtypekey="x:textfield"/>
    <CustomField id="502" name="Unused" customfieldtypekey="x:textfield"/>
    <ConfigurationContext id="1" key="customfield_500" fieldconfigscheme="900"/>
    <ConfigurationContext id="2" key="customfield_500" project="10" fieldconfigscheme="901"/>
    <ConfigurationContext id="3" key="customfield_501" fieldconfigscheme="902"/>
    <ConfigurationContext id="4" key="issuetype" project="10"/>
    <FieldConfigSchemeIssueType id="1" fieldconfigscheme="900" issuetype="1"/>
    <FieldConfigSchemeIssueType id="2" fieldconfigscheme="901" issuetype="2"/>
    <FieldConfigSchemeIssueType id="3" fieldconfigscheme="902"/>
    <Issue id="100" key="MNK-1" project="10" type="1" status="1" summary="a" security="7"/>
    <Issue id="101" key="MNK-2" project="10" type="1" status="1" summary="b"/>
    <Issue id="200" key="OTH-1" project="20" type="1" status="1" summary="c"/>
    <PluginVersion id="1" key="x" name="Fields" version="4.2"/>
    <OSPropertyEntry id="31" entityName="jira.properties" entityId="1" propertyKey="jira.version.patched" type="5"/>
    <OSPropertyEntry id="32" entityName="jira.properties" entityId="1" propertyKey="jira.option.allowunassigned" type="1"/>
    <OSPropertyEntry id="33" entityName="jira.properties" entityId="1" propertyKey="jira.title" type="5"/>
    <OSPropertyString id="31" value="805"/>
    <OSPropertyNumber id="32" value="1"/>
    <OSPropertyString id="33" value="Acme"/>
</entity-engine-xml>"#;

    async fn overview() -> BackupOverview {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(BACKUP.as_bytes()).unwrap();
        read_backup_overview(file.path(), None).await.unwrap()
    }

    #[tokio::test]
    async fn projects_collect_what_they_own() {
        let overview = overview().await;
        assert_eq!(overview.project_keys().collect::<Vec<_>>(), vec!["MNK", "OTH"]);

        let mnk = overview.project("MNK").unwrap();
        assert_eq!(mnk.versions.len(), 1);
        assert!(mnk.components.is_empty());
        assert_eq!(mnk.issue_ids.len(), 2);
        assert!(mnk.issue_security_level_ids.contains("7"));
        assert_eq!(mnk.project.counter_value(), Some(3));

        assert_eq!(overview.system.issue_key("200"), Some("OTH-1"));
        assert_eq!(overview.system.entity_count, 24);
    }

    #[tokio::test]
    async fn system_information_joins_properties_to_values() {
        let system = overview().await.system;
        assert_eq!(system.build_number.as_deref(), Some("805"));
        assert!(system.unassigned_issues_allowed);
        assert_eq!(system.plugin_version("x"), Some("4.2"));
        assert_eq!(system.plugin_version("y"), None);
    }

    #[tokio::test]
    async fn project_context_wins_over_global_context() {
        let overview = overview().await;

        let colour = overview.project("MNK").unwrap().custom_field_configuration("500").unwrap();
        assert_eq!(colour.config_scheme_id, "901");
        assert!(colour.applies_to_issue_type("2"));
        assert!(!colour.applies_to_issue_type("1"));

        let colour = overview.project("OTH").unwrap().custom_field_configuration("500").unwrap();
        assert_eq!(colour.config_scheme_id, "900");

        let size = overview.project("MNK").unwrap().custom_field_configuration("501").unwrap();
        assert_eq!(size.constrained_issue_types, None);

        assert!(overview.project("MNK").unwrap().custom_field_configuration("502").is_none());
    }
}
