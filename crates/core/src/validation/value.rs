use std::collections::BTreeMap;

use crate::external::custom_field::type_uses_options;
use crate::external::ExternalCustomFieldValue;
use crate::i18n::{keys, I18n};
use crate::mapper::MapperRegistry;
use crate::message::MessageSet;

/// Checks individual custom field values, one message set per old field id.
///
/// Fed one value at a time while the value partition is scanned. Values of
/// ignored or unmapped fields are skipped: the field-level validation already
/// reports the unmapped ones.
pub struct CustomFieldValueValidator<'a> {
    i18n: &'a dyn I18n,
    mappers: &'a MapperRegistry,
    messages: BTreeMap<String, MessageSet>,
}

impl<'a> CustomFieldValueValidator<'a> {
    pub fn new(i18n: &'a dyn I18n, mappers: &'a MapperRegistry) -> Self {
        Self {
            i18n,
            mappers,
            messages: BTreeMap::new(),
        }
    }

    pub fn validate(&mut self, value: &ExternalCustomFieldValue) {
        let fields = &self.mappers.custom_field;
        let field_id = value.custom_field_id.as_str();
        if fields.is_ignored(field_id) || fields.ids.mapped_id(field_id).is_none() {
            return;
        }
        let messages = self.messages.entry(field_id.to_string()).or_default();
        if !fields.type_key(field_id).is_some_and(type_uses_options) {
            return;
        }

        let options = &self.mappers.custom_field_option;
        let referenced = value.parent_key.iter().map(String::as_str).chain(value.value());
        for option_id in referenced {
            if options.ids.mapped_id(option_id).is_none() {
                messages.add_error(self.i18n.text(
                    keys::CUSTOM_FIELD_OPTION_MISSING,
                    &[&fields.ids.display_name(field_id), &options.ids.display_name(option_id)],
                ));
            }
        }
    }

    pub fn into_message_sets(self) -> BTreeMap<String, MessageSet> {
        self.messages
    }
}

/// Options flagged as used that did not map, grouped by old field id.
pub fn validate_custom_field_options(
    i18n: &dyn I18n,
    mappers: &MapperRegistry,
) -> BTreeMap<String, MessageSet> {
    let fields = &mappers.custom_field;
    let options = &mappers.custom_field_option;
    let mut out = BTreeMap::new();

    for field_id in fields.required_fields() {
        if fields.ids.mapped_id(field_id).is_none() {
            continue;
        }
        let mut messages = MessageSet::new();
        for option_id in options.required_options_for_field(field_id) {
            if options.ids.mapped_id(option_id).is_none() {
                messages.add_error(i18n.text(
                    keys::CUSTOM_FIELD_OPTION_MISSING,
                    &[&fields.ids.display_name(field_id), &options.ids.display_name(option_id)],
                ));
            }
        }
        out.insert(field_id.to_string(), messages);
    }
    out
}
