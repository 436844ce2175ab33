//! Running results of a project import.
//!
//! [`ProjectImportResults`] is shared by every worker task of an import:
//! counters are atomics, lists sit behind short-lived mutex sections. A
//! serializable [`ImportSummary`] snapshot is taken at the end (or on abort).

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use crate::options::ImportPhase;
use crate::types::Timestamp;

/// Error count above which an import is aborted.
pub const DEFAULT_ERROR_THRESHOLD: usize = 10;

/// Error messages kept verbatim; later ones are only counted.
pub const DEFAULT_MAX_RETAINED_ERRORS: usize = 100;

/// The project the import wrote into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportedProject {
    pub id: String,
    pub key: String,
    pub name: String,
    /// False when the import went into an existing project.
    pub created: bool,
}

/// Memberships written for one project role.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleMembershipCounts {
    pub created: usize,
    pub existing: usize,
}

#[derive(Debug, Default)]
struct Counters {
    users_created: AtomicUsize,
    versions_created: AtomicUsize,
    components_created: AtomicUsize,
    issues_created: AtomicUsize,
    custom_field_values_created: AtomicUsize,
    attachments_created: AtomicUsize,
    expected_issues: AtomicUsize,
    expected_attachments: AtomicUsize,
}

pub struct ProjectImportResults {
    started_at: Timestamp,
    finished_at: Mutex<Option<Timestamp>>,
    error_threshold: usize,
    max_retained_errors: usize,
    error_count: AtomicUsize,
    errors: Mutex<Vec<String>>,
    counters: Counters,
    entities_created: Mutex<BTreeMap<String, usize>>,
    role_members: Mutex<BTreeMap<String, RoleMembershipCounts>>,
    imported_project: Mutex<Option<ImportedProject>>,
    phase: Mutex<ImportPhase>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ProjectImportResults {
    pub fn new(error_threshold: usize, max_retained_errors: usize) -> Self {
        Self {
            started_at: chrono::Utc::now(),
            finished_at: Mutex::new(None),
            error_threshold,
            max_retained_errors,
            error_count: AtomicUsize::new(0),
            errors: Mutex::new(Vec::new()),
            counters: Counters::default(),
            entities_created: Mutex::new(BTreeMap::new()),
            role_members: Mutex::new(BTreeMap::new()),
            imported_project: Mutex::new(None),
            phase: Mutex::new(ImportPhase::NotStarted),
        }
    }

    // -----------------------------------------------------------------------
    // Errors
    // -----------------------------------------------------------------------

    /// Record a non-fatal error and return the new error count.
    pub fn add_error(&self, message: impl Into<String>) -> usize {
        let count = self.error_count.fetch_add(1, Ordering::AcqRel) + 1;
        let mut errors = lock(&self.errors);
        if errors.len() < self.max_retained_errors {
            errors.push(message.into());
        }
        count
    }

    pub fn error_count(&self) -> usize {
        self.error_count.load(Ordering::Acquire)
    }

    pub fn error_threshold(&self) -> usize {
        self.error_threshold
    }

    /// True once the error count is strictly above the threshold.
    pub fn abort_import_due_to_errors(&self) -> bool {
        self.error_count() > self.error_threshold
    }

    pub fn errors(&self) -> Vec<String> {
        lock(&self.errors).clone()
    }

    // -----------------------------------------------------------------------
    // Counters
    // -----------------------------------------------------------------------

    pub fn increment_users_created(&self) {
        self.counters.users_created.fetch_add(1, Ordering::AcqRel);
    }

    pub fn increment_versions_created(&self) {
        self.counters.versions_created.fetch_add(1, Ordering::AcqRel);
    }

    pub fn increment_components_created(&self) {
        self.counters.components_created.fetch_add(1, Ordering::AcqRel);
    }

    pub fn increment_issues_created(&self) {
        self.counters.issues_created.fetch_add(1, Ordering::AcqRel);
    }

    pub fn increment_custom_field_values_created(&self) {
        self.counters
            .custom_field_values_created
            .fetch_add(1, Ordering::AcqRel);
    }

    pub fn increment_attachments_created(&self) {
        self.counters.attachments_created.fetch_add(1, Ordering::AcqRel);
    }

    /// Count one issue-related or second-degree entity by backup entity name.
    pub fn increment_entities_created(&self, entity_name: &str) {
        *lock(&self.entities_created)
            .entry(entity_name.to_string())
            .or_default() += 1;
    }

    pub fn set_expected_issues(&self, count: usize) {
        self.counters.expected_issues.store(count, Ordering::Release);
    }

    pub fn set_expected_attachments(&self, count: usize) {
        self.counters
            .expected_attachments
            .store(count, Ordering::Release);
    }

    pub fn issues_created(&self) -> usize {
        self.counters.issues_created.load(Ordering::Acquire)
    }

    pub fn attachments_created(&self) -> usize {
        self.counters.attachments_created.load(Ordering::Acquire)
    }

    pub fn increment_role_member_created(&self, role: &str) {
        lock(&self.role_members)
            .entry(role.to_string())
            .or_default()
            .created += 1;
    }

    pub fn increment_role_member_existing(&self, role: &str) {
        lock(&self.role_members)
            .entry(role.to_string())
            .or_default()
            .existing += 1;
    }

    pub fn role_members(&self) -> BTreeMap<String, RoleMembershipCounts> {
        lock(&self.role_members).clone()
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    pub fn set_imported_project(&self, project: ImportedProject) {
        *lock(&self.imported_project) = Some(project);
    }

    pub fn imported_project(&self) -> Option<ImportedProject> {
        lock(&self.imported_project).clone()
    }

    pub fn set_phase(&self, phase: ImportPhase) {
        *lock(&self.phase) = phase;
    }

    pub fn phase(&self) -> ImportPhase {
        *lock(&self.phase)
    }

    pub fn mark_finished(&self) {
        *lock(&self.finished_at) = Some(chrono::Utc::now());
    }

    pub fn summary(&self) -> ImportSummary {
        let c = &self.counters;
        ImportSummary {
            phase: self.phase(),
            started_at: self.started_at,
            finished_at: *lock(&self.finished_at),
            imported_project: self.imported_project(),
            users_created: c.users_created.load(Ordering::Acquire),
            versions_created: c.versions_created.load(Ordering::Acquire),
            components_created: c.components_created.load(Ordering::Acquire),
            issues_created: c.issues_created.load(Ordering::Acquire),
            expected_issues: c.expected_issues.load(Ordering::Acquire),
            custom_field_values_created: c.custom_field_values_created.load(Ordering::Acquire),
            attachments_created: c.attachments_created.load(Ordering::Acquire),
            expected_attachments: c.expected_attachments.load(Ordering::Acquire),
            entities_created: lock(&self.entities_created).clone(),
            role_members: self.role_members(),
            error_count: self.error_count(),
            errors: self.errors(),
        }
    }
}

impl Default for ProjectImportResults {
    fn default() -> Self {
        Self::new(DEFAULT_ERROR_THRESHOLD, DEFAULT_MAX_RETAINED_ERRORS)
    }
}

/// Point-in-time copy of [`ProjectImportResults`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub phase: ImportPhase,
    pub started_at: Timestamp,
    pub finished_at: Option<Timestamp>,
    pub imported_project: Option<ImportedProject>,
    pub users_created: usize,
    pub versions_created: usize,
    pub components_created: usize,
    pub issues_created: usize,
    pub expected_issues: usize,
    pub custom_field_values_created: usize,
    pub attachments_created: usize,
    pub expected_attachments: usize,
    pub entities_created: BTreeMap<String, usize>,
    pub role_members: BTreeMap<String, RoleMembershipCounts>,
    pub error_count: usize,
    /// At most the retention limit; `error_count` has the full number.
    pub errors: Vec<String>,
}

impl ImportSummary {
    pub fn is_complete(&self) -> bool {
        self.phase == ImportPhase::Complete
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn threshold_is_exceeded_only_above_the_limit() {
        let results = ProjectImportResults::new(2, 100);
        results.add_error("one");
        results.add_error("two");
        assert!(!results.abort_import_due_to_errors());
        assert_eq!(results.add_error("three"), 3);
        assert!(results.abort_import_due_to_errors());
    }

    #[test]
    fn only_the_first_errors_are_retained() {
        let results = ProjectImportResults::new(1000, 3);
        for i in 0..5 {
            results.add_error(format!("error {i}"));
        }
        let summary = results.summary();
        assert_eq!(summary.error_count, 5);
        assert_eq!(summary.errors, vec!["error 0", "error 1", "error 2"]);
    }

    #[test]
    fn counters_survive_concurrent_updates() {
        let results = Arc::new(ProjectImportResults::default());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let results = Arc::clone(&results);
                std::thread::spawn(move || {
                    for _ in 0..250 {
                        results.increment_issues_created();
                        results.increment_entities_created("Action");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let summary = results.summary();
        assert_eq!(summary.issues_created, 1000);
        assert_eq!(summary.entities_created["Action"], 1000);
    }

    #[test]
    fn role_members_count_created_and_existing_separately() {
        let results = ProjectImportResults::default();
        results.increment_role_member_created("Developers");
        results.increment_role_member_created("Developers");
        results.increment_role_member_existing("Developers");
        assert_eq!(
            results.role_members()["Developers"],
            RoleMembershipCounts { created: 2, existing: 1 }
        );
    }

    #[test]
    fn summary_serializes_phase_in_snake_case() {
        let results = ProjectImportResults::default();
        results.set_phase(ImportPhase::Complete);
        results.mark_finished();
        let summary = results.summary();
        assert!(summary.is_complete());
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["phase"], "complete");
    }
}
