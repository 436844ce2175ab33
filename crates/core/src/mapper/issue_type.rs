use std::collections::{BTreeMap, BTreeSet};

use super::IdMapper;

/// Issue type mapper, remembering whether each backup type is a sub-task type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueTypeMapper {
    pub ids: IdMapper,
    subtask: BTreeMap<String, bool>,
}

impl Default for IssueTypeMapper {
    fn default() -> Self {
        Self {
            ids: IdMapper::new("issue type"),
            subtask: BTreeMap::new(),
        }
    }
}

impl IssueTypeMapper {
    pub fn register_issue_type(&mut self, old_id: &str, name: &str, subtask: bool) {
        self.ids.register_old_value(old_id, Some(name));
        self.subtask.insert(old_id.to_string(), subtask);
    }

    pub fn is_subtask(&self, old_id: &str) -> bool {
        self.subtask.get(old_id).copied().unwrap_or(false)
    }
}

/// Status mapper, remembering which issue types use each status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMapper {
    pub ids: IdMapper,
    issue_types_in_use: BTreeMap<String, BTreeSet<String>>,
}

impl Default for StatusMapper {
    fn default() -> Self {
        Self {
            ids: IdMapper::new("status"),
            issue_types_in_use: BTreeMap::new(),
        }
    }
}

impl StatusMapper {
    pub fn flag_value_as_required(&mut self, status_id: &str, issue_type_id: &str) {
        self.ids.flag_value_as_required(status_id);
        self.issue_types_in_use
            .entry(status_id.to_string())
            .or_default()
            .insert(issue_type_id.to_string());
    }

    /// Old issue type ids of the issues using this status.
    pub fn issue_types_for_status(&self, status_id: &str) -> impl Iterator<Item = &str> {
        self.issue_types_in_use
            .get(status_id)
            .into_iter()
            .flatten()
            .map(String::as_str)
    }
}
