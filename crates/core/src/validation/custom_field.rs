use crate::backup::BackupProject;
use crate::catalog::{same_name, TargetCatalog, TargetCustomField};
use crate::i18n::{keys, I18n};
use crate::mapper::{CustomFieldMapper, IssueTypeMapper};
use crate::message::MessageSet;

/// Required custom fields must be mapped onto a field of the same type that
/// is configured for the project and for every issue type whose values use it.
pub fn validate_custom_fields(
    i18n: &dyn I18n,
    backup_project: &BackupProject,
    mapper: &CustomFieldMapper,
    issue_types: &IssueTypeMapper,
    catalog: &TargetCatalog,
) -> MessageSet {
    let mut messages = MessageSet::new();
    let project_id = catalog.existing_project_id();

    for old_id in mapper.required_fields() {
        let name = mapper.ids.display_name(old_id);
        let type_key = mapper.type_key(old_id).unwrap_or_default();

        let target = match mapper.ids.mapped_id(old_id) {
            Some(new_id) => catalog.custom_field(new_id),
            None => mapper.ids.key(old_id).and_then(|key| {
                let named: Vec<&TargetCustomField> = catalog
                    .custom_fields
                    .iter()
                    .filter(|f| same_name(&f.name, key))
                    .collect();
                named
                    .iter()
                    .find(|f| f.type_key == type_key)
                    .or_else(|| named.first())
                    .copied()
            }),
        };

        let Some(target) = target else {
            messages.add_error(i18n.text(keys::CUSTOM_FIELD_MISSING, &[&name, type_key]));
            continue;
        };

        if target.type_key != type_key {
            messages.add_error(i18n.text(
                keys::CUSTOM_FIELD_WRONG_TYPE,
                &[&name, type_key, &target.type_key],
            ));
            continue;
        }
        if !target.in_project_context(project_id) {
            messages.add_error(i18n.text(
                keys::CUSTOM_FIELD_NOT_IN_PROJECT,
                &[&name, backup_project.key()],
            ));
            continue;
        }

        let mut reported = false;
        for old_type in mapper.issue_types_in_use(old_id) {
            let in_context = issue_types
                .ids
                .mapped_id(old_type)
                .map_or(true, |new_type| target.in_issue_type_context(new_type));
            if !in_context {
                reported = true;
                messages.add_error(i18n.text(
                    keys::CUSTOM_FIELD_NOT_FOR_ISSUE_TYPE,
                    &[&name, &issue_types.ids.display_name(old_type)],
                ));
            }
        }

        // Same name and type, in context, yet not mapped: an operator left it out.
        if !reported && mapper.ids.mapped_id(old_id).is_none() {
            messages.add_error(i18n.text(keys::CUSTOM_FIELD_MISSING, &[&name, type_key]));
        }
    }

    for (new_id, old_ids) in mapper.ids.duplicate_mappings() {
        let names: Vec<String> = old_ids
            .iter()
            .map(|id| format!("'{}'", mapper.ids.display_name(id)))
            .collect();
        let target = catalog
            .custom_field(new_id)
            .map_or_else(|| new_id.to_string(), |f| f.name.clone());
        messages.add_error(i18n.text(keys::CUSTOM_FIELD_DUPLICATE, &[&names.join(", "), &target]));
    }

    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ExistingProject;
    use crate::external::ExternalCustomField;
    use crate::i18n::EnglishCatalog;

    fn field(id: &str, name: &str, type_key: &str) -> ExternalCustomField {
        ExternalCustomField {
            id: id.into(),
            name: name.into(),
            type_key: type_key.into(),
        }
    }

    fn issue_types() -> IssueTypeMapper {
        let mut mapper = IssueTypeMapper::default();
        mapper.register_issue_type("1", "Bug", false);
        mapper.ids.map_value("1", "t1").unwrap();
        mapper
    }

    #[test]
    fn absent_field_is_reported_with_its_type() {
        let mut mapper = CustomFieldMapper::default();
        mapper.register_custom_field(&field("100", "Colour", "x:select"));
        mapper.flag_value_as_required("100", "1");

        let messages = validate_custom_fields(
            &EnglishCatalog,
            &BackupProject::default(),
            &mapper,
            &issue_types(),
            &TargetCatalog::default(),
        );
        assert_eq!(
            messages.errors().collect::<Vec<_>>(),
            vec!["The custom field 'Colour' of type 'x:select' is required for the import but does not exist in the target system."]
        );
    }

    #[test]
    fn same_name_other_type_is_a_type_mismatch() {
        let mut mapper = CustomFieldMapper::default();
        mapper.register_custom_field(&field("100", "Colour", "x:select"));
        mapper.flag_value_as_required("100", "1");
        let catalog = TargetCatalog {
            custom_fields: vec![TargetCustomField {
                id: "cf1".into(),
                name: "Colour".into(),
                type_key: "x:textfield".into(),
                ..Default::default()
            }],
            ..Default::default()
        };

        let messages = validate_custom_fields(
            &EnglishCatalog,
            &BackupProject::default(),
            &mapper,
            &issue_types(),
            &catalog,
        );
        assert!(messages.errors().next().unwrap().contains("of type 'x:textfield' in the target"));
    }

    #[test]
    fn field_outside_issue_type_context_is_reported() {
        let mut mapper = CustomFieldMapper::default();
        mapper.register_custom_field(&field("100", "Colour", "x:select"));
        mapper.flag_value_as_required("100", "1");
        let catalog = TargetCatalog {
            custom_fields: vec![TargetCustomField {
                id: "cf1".into(),
                name: "Colour".into(),
                type_key: "x:select".into(),
                issue_type_ids: Some(["t2".to_string()].into()),
                ..Default::default()
            }],
            existing_project: Some(ExistingProject::default()),
            ..Default::default()
        };

        let messages = validate_custom_fields(
            &EnglishCatalog,
            &BackupProject::default(),
            &mapper,
            &issue_types(),
            &catalog,
        );
        let errors: Vec<&str> = messages.errors().collect();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("issue type 'Bug'"));
    }

    #[test]
    fn ignored_and_mapped_fields_pass() {
        let mut mapper = CustomFieldMapper::default();
        mapper.register_custom_field(&field("100", "Colour", "x:select"));
        mapper.register_custom_field(&field("101", "Legacy", "x:legacy"));
        mapper.flag_value_as_required("100", "1");
        mapper.flag_value_as_required("101", "1");
        mapper.ignore_custom_field("101");
        mapper.ids.map_value("100", "cf1").unwrap();
        let catalog = TargetCatalog {
            custom_fields: vec![TargetCustomField {
                id: "cf1".into(),
                name: "Colour".into(),
                type_key: "x:select".into(),
                ..Default::default()
            }],
            ..Default::default()
        };

        let messages = validate_custom_fields(
            &EnglishCatalog,
            &BackupProject::default(),
            &mapper,
            &issue_types(),
            &catalog,
        );
        assert!(messages.is_empty());
    }
}
