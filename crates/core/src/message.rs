//! Ordered, de-duplicated collections of validation messages.

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

/// Whether a message blocks the import or is informational.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// Errors and warnings produced by one validator.
///
/// Messages keep insertion order; adding the same text twice stores it once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSet {
    errors: IndexSet<String>,
    warnings: IndexSet<String>,
}

impl MessageSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, message: impl Into<String>) {
        self.errors.insert(message.into());
    }

    pub fn add_warning(&mut self, message: impl Into<String>) {
        self.warnings.insert(message.into());
    }

    pub fn add(&mut self, severity: Severity, message: impl Into<String>) {
        match severity {
            Severity::Error => self.add_error(message),
            Severity::Warning => self.add_warning(message),
        }
    }

    /// Copy every message of `other` into this set.
    pub fn add_message_set(&mut self, other: &MessageSet) {
        self.errors.extend(other.errors.iter().cloned());
        self.warnings.extend(other.warnings.iter().cloned());
    }

    pub fn has_any_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn has_any_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty()
    }

    pub fn errors(&self) -> impl Iterator<Item = &str> {
        self.errors.iter().map(String::as_str)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &str> {
        self.warnings.iter().map(String::as_str)
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    pub fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicates_are_stored_once_in_order() {
        let mut set = MessageSet::new();
        set.add_error("b");
        set.add_error("a");
        set.add_error("b");
        assert_eq!(set.errors().collect::<Vec<_>>(), vec!["b", "a"]);
        assert!(set.has_any_errors());
        assert!(!set.has_any_warnings());
    }

    #[test]
    fn merge_keeps_severity() {
        let mut a = MessageSet::new();
        a.add(Severity::Warning, "careful");
        let mut b = MessageSet::new();
        b.add(Severity::Error, "broken");
        b.add_message_set(&a);
        assert_eq!(b.error_count(), 1);
        assert_eq!(b.warning_count(), 1);
    }

    #[test]
    fn serializes_as_two_lists() {
        let mut set = MessageSet::new();
        set.add_error("e");
        let json = serde_json::to_value(&set).unwrap();
        assert_eq!(json["errors"][0], "e");
        assert!(json["warnings"].as_array().unwrap().is_empty());
    }
}
