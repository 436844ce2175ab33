//! Custom fields, their configurations, options and values.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::{expect_entity, names, BackupElement, FromElement};
use crate::error::ParseError;

/// Suffixes of custom field type keys whose values point at options.
const OPTION_TYPE_SUFFIXES: &[&str] = &[
    ":select",
    ":multiselect",
    ":radiobuttons",
    ":multicheckboxes",
    ":cascadingselect",
];

/// Prefix used by configuration contexts when referring to a field.
const FIELD_KEY_PREFIX: &str = "customfield_";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalCustomField {
    pub id: String,
    pub name: String,
    pub type_key: String,
}

impl ExternalCustomField {
    /// Whether values of this field store option ids.
    pub fn uses_options(&self) -> bool {
        type_uses_options(&self.type_key)
    }

    /// Key of the plugin providing the field type: the type key up to its first `:`.
    pub fn plugin_key(&self) -> &str {
        self.type_key.split(':').next().unwrap_or(&self.type_key)
    }
}

pub fn type_uses_options(type_key: &str) -> bool {
    OPTION_TYPE_SUFFIXES
        .iter()
        .any(|suffix| type_key.ends_with(suffix))
}

/// Strip the `customfield_` prefix used by contexts, leaving the raw id.
pub fn field_id_from_key(key: &str) -> &str {
    key.strip_prefix(FIELD_KEY_PREFIX).unwrap_or(key)
}

impl FromElement for ExternalCustomField {
    const ENTITY: &'static str = names::CUSTOM_FIELD;

    fn from_element(el: &BackupElement) -> Result<Self, ParseError> {
        expect_entity::<Self>(el)?;
        Ok(Self {
            id: el.require("id")?,
            name: el.require("name")?,
            type_key: el.require("customfieldtypekey")?,
        })
    }
}

/// A custom field as configured for one backup project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalCustomFieldConfiguration {
    pub field: ExternalCustomField,
    /// `None` means the configuration applies to every issue type.
    pub constrained_issue_types: Option<BTreeSet<String>>,
    pub config_scheme_id: String,
}

impl ExternalCustomFieldConfiguration {
    pub fn applies_to_issue_type(&self, issue_type_id: &str) -> bool {
        self.constrained_issue_types
            .as_ref()
            .map_or(true, |types| types.contains(issue_type_id))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalCustomFieldOption {
    pub id: String,
    pub custom_field_id: String,
    pub config_id: Option<String>,
    pub parent_id: Option<String>,
    pub value: String,
}

impl FromElement for ExternalCustomFieldOption {
    const ENTITY: &'static str = names::CUSTOM_FIELD_OPTION;

    fn from_element(el: &BackupElement) -> Result<Self, ParseError> {
        expect_entity::<Self>(el)?;
        Ok(Self {
            id: el.require("id")?,
            custom_field_id: el.require("customfield")?,
            config_id: el.optional("customfieldconfig"),
            parent_id: el.optional("parentoptionid"),
            value: el.require("value")?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalCustomFieldValue {
    pub id: String,
    pub custom_field_id: String,
    pub issue_id: String,
    pub parent_key: Option<String>,
    pub string_value: Option<String>,
    pub number_value: Option<String>,
    pub text_value: Option<String>,
    pub date_value: Option<String>,
}

impl ExternalCustomFieldValue {
    /// The stored value, whichever column carries it.
    pub fn value(&self) -> Option<&str> {
        self.string_value
            .as_deref()
            .or(self.number_value.as_deref())
            .or(self.text_value.as_deref())
            .or(self.date_value.as_deref())
    }
}

impl FromElement for ExternalCustomFieldValue {
    const ENTITY: &'static str = names::CUSTOM_FIELD_VALUE;

    fn from_element(el: &BackupElement) -> Result<Self, ParseError> {
        expect_entity::<Self>(el)?;
        Ok(Self {
            id: el.require("id")?,
            custom_field_id: el.require("customfield")?,
            issue_id: el.require("issue")?,
            parent_key: el.optional("parentkey"),
            string_value: el.optional("stringvalue"),
            number_value: el.optional("numbervalue"),
            text_value: el.optional("textvalue"),
            date_value: el.optional("datevalue"),
        })
    }
}
