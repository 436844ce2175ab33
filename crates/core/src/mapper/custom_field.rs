use std::collections::{BTreeMap, BTreeSet};

use super::IdMapper;
use crate::external::{ExternalCustomField, ExternalCustomFieldOption};

/// Custom field mapper.
///
/// Besides the id association it records the backup type key of every
/// field, the issue types whose values use it, and fields the target cannot
/// import (ignored fields are neither mapped nor validated).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomFieldMapper {
    pub ids: IdMapper,
    type_keys: BTreeMap<String, String>,
    issue_types_in_use: BTreeMap<String, BTreeSet<String>>,
    ignored: BTreeSet<String>,
}

impl Default for CustomFieldMapper {
    fn default() -> Self {
        Self {
            ids: IdMapper::new("custom field"),
            type_keys: BTreeMap::new(),
            issue_types_in_use: BTreeMap::new(),
            ignored: BTreeSet::new(),
        }
    }
}

impl CustomFieldMapper {
    pub fn register_custom_field(&mut self, field: &ExternalCustomField) {
        self.ids.register_old_value(&field.id, Some(&field.name));
        self.type_keys
            .insert(field.id.clone(), field.type_key.clone());
    }

    /// Flag the field as required by a value on an issue of `issue_type_id`.
    pub fn flag_value_as_required(&mut self, custom_field_id: &str, issue_type_id: &str) {
        self.ids.flag_value_as_required(custom_field_id);
        self.issue_types_in_use
            .entry(custom_field_id.to_string())
            .or_default()
            .insert(issue_type_id.to_string());
    }

    pub fn type_key(&self, custom_field_id: &str) -> Option<&str> {
        self.type_keys.get(custom_field_id).map(String::as_str)
    }

    pub fn issue_types_in_use(&self, custom_field_id: &str) -> impl Iterator<Item = &str> {
        self.issue_types_in_use
            .get(custom_field_id)
            .into_iter()
            .flatten()
            .map(String::as_str)
    }

    pub fn ignore_custom_field(&mut self, custom_field_id: &str) {
        self.ignored.insert(custom_field_id.to_string());
    }

    pub fn is_ignored(&self, custom_field_id: &str) -> bool {
        self.ignored.contains(custom_field_id)
    }

    /// Required fields that are not ignored.
    pub fn required_fields(&self) -> impl Iterator<Item = &str> {
        self.ids
            .required_old_ids()
            .filter(|id| !self.ignored.contains(*id))
    }
}

/// Custom field option mapper, grouping options by their field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomFieldOptionMapper {
    pub ids: IdMapper,
    options: BTreeMap<String, ExternalCustomFieldOption>,
    by_field: BTreeMap<String, BTreeSet<String>>,
}

impl Default for CustomFieldOptionMapper {
    fn default() -> Self {
        Self {
            ids: IdMapper::new("custom field option"),
            options: BTreeMap::new(),
            by_field: BTreeMap::new(),
        }
    }
}

impl CustomFieldOptionMapper {
    pub fn register_option(&mut self, option: ExternalCustomFieldOption) {
        self.ids.register_old_value(&option.id, Some(&option.value));
        self.by_field
            .entry(option.custom_field_id.clone())
            .or_default()
            .insert(option.id.clone());
        self.options.insert(option.id.clone(), option);
    }

    pub fn option(&self, option_id: &str) -> Option<&ExternalCustomFieldOption> {
        self.options.get(option_id)
    }

    /// Options of a field, parents before children, ordered by id otherwise.
    pub fn options_for_field(&self, custom_field_id: &str) -> Vec<&ExternalCustomFieldOption> {
        let mut options: Vec<&ExternalCustomFieldOption> = self
            .by_field
            .get(custom_field_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.options.get(id))
            .collect();
        options.sort_by_key(|o| o.parent_id.is_some());
        options
    }

    /// Required options that belong to the given field.
    pub fn required_options_for_field(&self, custom_field_id: &str) -> Vec<&str> {
        self.ids
            .required_old_ids()
            .filter(|id| {
                self.options
                    .get(*id)
                    .is_some_and(|o| o.custom_field_id == custom_field_id)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn option(id: &str, field: &str, parent: Option<&str>, value: &str) -> ExternalCustomFieldOption {
        ExternalCustomFieldOption {
            id: id.into(),
            custom_field_id: field.into(),
            config_id: None,
            parent_id: parent.map(str::to_string),
            value: value.into(),
        }
    }

    #[test]
    fn ignored_fields_are_not_required() {
        let mut mapper = CustomFieldMapper::default();
        mapper.flag_value_as_required("1", "bug");
        mapper.flag_value_as_required("2", "bug");
        mapper.ignore_custom_field("2");
        assert_eq!(mapper.required_fields().collect::<Vec<_>>(), vec!["1"]);
    }

    #[test]
    fn options_list_parents_first() {
        let mut mapper = CustomFieldOptionMapper::default();
        mapper.register_option(option("1", "cf", Some("3"), "child"));
        mapper.register_option(option("2", "cf", None, "a"));
        mapper.register_option(option("3", "cf", None, "b"));
        mapper.register_option(option("4", "other", None, "c"));

        let ids: Vec<&str> = mapper
            .options_for_field("cf")
            .iter()
            .map(|o| o.id.as_str())
            .collect();
        assert_eq!(ids, vec!["2", "3", "1"]);
    }

    #[test]
    fn required_options_are_grouped_by_field() {
        let mut mapper = CustomFieldOptionMapper::default();
        mapper.register_option(option("1", "cf", None, "a"));
        mapper.register_option(option("2", "other", None, "b"));
        mapper.ids.flag_value_as_required("1");
        mapper.ids.flag_value_as_required("2");
        assert_eq!(mapper.required_options_for_field("cf"), vec!["1"]);
    }
}
