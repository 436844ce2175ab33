//! ID mappers: per entity kind, the association between backup ids (old)
//! and target-system ids (new).
//!
//! A mapper learns old ids in two ways: [`IdMapper::register_old_value`]
//! when the backup element defining the entity is seen, and
//! [`IdMapper::flag_value_as_required`] when some imported entity refers to
//! it. Only registered ids can be mapped, and a mapping never changes once
//! set.

pub mod custom_field;
pub mod issue_type;
pub mod registry;
pub mod role_actor;
pub mod user;

use std::collections::{BTreeMap, BTreeSet};

use crate::error::MapperError;

pub use custom_field::{CustomFieldMapper, CustomFieldOptionMapper};
pub use issue_type::{IssueTypeMapper, StatusMapper};
pub use registry::MapperRegistry;
pub use role_actor::ProjectRoleActorMapper;
pub use user::UserMapper;

/// Old id to new id association for one entity kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdMapper {
    kind: &'static str,
    /// Registered old ids with their display key, when one is known.
    registered: BTreeMap<String, Option<String>>,
    required: BTreeSet<String>,
    mapped: BTreeMap<String, String>,
}

impl IdMapper {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            registered: BTreeMap::new(),
            required: BTreeSet::new(),
            mapped: BTreeMap::new(),
        }
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Record an old id seen in the backup together with its display key.
    ///
    /// Registering twice keeps the first known key.
    pub fn register_old_value(&mut self, old_id: &str, key: Option<&str>) {
        let entry = self.registered.entry(old_id.to_string()).or_insert(None);
        if entry.is_none() {
            *entry = key.map(str::to_string);
        }
    }

    /// Mark an old id as referenced by the data being imported.
    ///
    /// The id does not have to be registered: the referenced entity may live
    /// outside the project (a user, for instance).
    pub fn flag_value_as_required(&mut self, old_id: &str) {
        self.required.insert(old_id.to_string());
    }

    /// Associate a registered old id with its new id.
    pub fn map_value(&mut self, old_id: &str, new_id: &str) -> Result<(), MapperError> {
        if !self.registered.contains_key(old_id) {
            return Err(MapperError::NotRegistered {
                kind: self.kind,
                old_id: old_id.to_string(),
            });
        }
        match self.mapped.get(old_id) {
            Some(existing) if existing == new_id => Ok(()),
            Some(existing) => Err(MapperError::AlreadyMapped {
                kind: self.kind,
                old_id: old_id.to_string(),
                existing: existing.clone(),
                requested: new_id.to_string(),
            }),
            None => {
                self.mapped.insert(old_id.to_string(), new_id.to_string());
                Ok(())
            }
        }
    }

    pub fn mapped_id(&self, old_id: &str) -> Option<&str> {
        self.mapped.get(old_id).map(String::as_str)
    }

    pub fn is_registered(&self, old_id: &str) -> bool {
        self.registered.contains_key(old_id)
    }

    pub fn is_required(&self, old_id: &str) -> bool {
        self.required.contains(old_id)
    }

    pub fn key(&self, old_id: &str) -> Option<&str> {
        self.registered.get(old_id).and_then(|k| k.as_deref())
    }

    /// Human-readable name for messages: the key, or the bracketed old id.
    pub fn display_name(&self, old_id: &str) -> String {
        match self.key(old_id) {
            Some(key) => key.to_string(),
            None => format!("[{old_id}]"),
        }
    }

    pub fn registered_old_ids(&self) -> impl Iterator<Item = &str> {
        self.registered.keys().map(String::as_str)
    }

    pub fn required_old_ids(&self) -> impl Iterator<Item = &str> {
        self.required.iter().map(String::as_str)
    }

    pub fn mapped_values(&self) -> impl Iterator<Item = (&str, &str)> {
        self.mapped.iter().map(|(o, n)| (o.as_str(), n.as_str()))
    }

    pub fn mapped_count(&self) -> usize {
        self.mapped.len()
    }

    /// Required old ids that still have no new id.
    pub fn unmapped_required(&self) -> Vec<&str> {
        self.required
            .iter()
            .filter(|id| !self.mapped.contains_key(*id))
            .map(String::as_str)
            .collect()
    }

    /// New ids that more than one old id is mapped to.
    pub fn duplicate_mappings(&self) -> BTreeMap<&str, Vec<&str>> {
        let mut by_new: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for (old, new) in &self.mapped {
            by_new.entry(new.as_str()).or_default().push(old.as_str());
        }
        by_new.retain(|_, olds| olds.len() > 1);
        by_new
    }
}
