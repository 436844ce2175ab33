//! End-to-end imports of the reference backup into a [`MemoryStore`].

mod common;

use std::sync::Arc;

use assert_matches::assert_matches;

use carryover_core::error::{AbortImport, AbortReason};
use carryover_core::external::{names, ExternalProject};
use carryover_core::options::{ImportPhase, ProjectImportOptions};
use carryover_core::validation::ValidationKind;
use carryover_pipeline::{ImportError, MemoryStore, ProjectImportPersister};

use common::*;

fn options(backup: &tempfile::NamedTempFile) -> ProjectImportOptions {
    ProjectImportOptions::new(backup.path(), PROJECT_KEY)
}

// ---------------------------------------------------------------------------
// Test: a new project is created with everything it owns
// ---------------------------------------------------------------------------

#[tokio::test]
async fn imports_new_project() {
    let backup = write_backup(&backup_xml());
    let attachments = attachment_root();
    let store = Arc::new(MemoryStore::with_catalog(catalog()));
    let manager = manager(&store, store.clone(), test_config());

    let options = options(&backup).with_attachment_path(attachments.path());
    let summary = manager.run(&options).await.unwrap();

    assert!(summary.is_complete());
    assert_eq!(summary.error_count, 0, "errors: {:?}", summary.errors);
    assert_eq!(summary.users_created, 1);
    assert_eq!(summary.versions_created, 2);
    assert_eq!(summary.components_created, 3);
    assert_eq!(summary.issues_created, 1);
    assert_eq!(summary.expected_issues, 1);
    assert_eq!(summary.custom_field_values_created, 1);
    assert_eq!(summary.attachments_created, 1);
    assert!(summary.imported_project.as_ref().is_some_and(|p| p.created));

    let project = store.project_by_key(PROJECT_KEY).unwrap();
    assert_eq!(project.project.name, "Monkey");
    assert!(project.counter >= BACKUP_COUNTER);

    let issue = store.issue_by_key("MNK-12").unwrap();
    assert_eq!(issue.project_id, project.id);
    assert_eq!(issue.issue_type, "t1");
    assert_eq!(issue.status, "s1");
    assert_eq!(issue.priority.as_deref(), Some("p1"));
    assert!(store.issue_by_key("OTH-1").is_none());

    assert_eq!(store.versions().len(), 2);
    assert_eq!(store.components().len(), 3);
    assert_eq!(store.entities(names::ACTION).len(), 1);
    assert_eq!(store.entities(names::CHANGE_GROUP).len(), 1);
    assert_eq!(store.entities(names::CHANGE_ITEM).len(), 1);
    assert_eq!(store.entities(names::NODE_ASSOCIATION).len(), 2);

    let values = store.entities(names::CUSTOM_FIELD_VALUE);
    assert_eq!(values.len(), 1);
    assert_eq!(values[0].get("customfield"), Some("cf1"));
    assert_eq!(values[0].get("stringvalue"), Some("o1"));
    assert_eq!(values[0].get("issue"), Some(issue.id.as_str()));

    let attachments = store.attachments();
    assert_eq!(attachments.len(), 1);
    assert_eq!(attachments[0].size, 5);

    assert_eq!(store.created_users()[0].name, "fred");
    assert_eq!(store.role_actors().len(), 1);
    assert_eq!(summary.role_members["Developers"].created, 1);
    assert_eq!(store.reindexed(), vec![issue.id.clone()]);
}

// ---------------------------------------------------------------------------
// Test: every write happens after the writes it depends on
// ---------------------------------------------------------------------------

#[tokio::test]
async fn writes_follow_dependency_order() {
    let backup = write_backup(&backup_xml());
    let store = Arc::new(MemoryStore::with_catalog(catalog()));
    let manager = manager(&store, store.clone(), test_config());

    manager.run(&options(&backup)).await.unwrap();

    let operations = store.operations();
    let position = |prefix: &str| {
        operations
            .iter()
            .position(|op| op.starts_with(prefix))
            .unwrap_or_else(|| panic!("no '{prefix}' in {operations:?}"))
    };
    let last = |prefix: &str| {
        operations
            .iter()
            .rposition(|op| op.starts_with(prefix))
            .unwrap_or_else(|| panic!("no '{prefix}' in {operations:?}"))
    };

    assert!(last("create_user") < position("create_project"));
    assert!(position("create_project") < position("create_version"));
    assert!(last("create_version") < position("create_component"));
    assert!(last("create_component") < position("create_issue"));
    assert!(last("create_issue") < position("create_entity"));
    assert!(last("create_entity ChangeGroup") < position("create_entity ChangeItem"));
    assert!(last("create_entity ChangeItem") < position("create_entity CustomFieldValue"));
    assert!(last("create_entity") < position("create_role_actor"));
    assert_eq!(operations.last().map(String::as_str), Some("reindex_issues 1"));

    // No attachment root, no attachments.
    assert!(store.attachments().is_empty());
}

// ---------------------------------------------------------------------------
// Test: an existing project keeps its details unless told otherwise
// ---------------------------------------------------------------------------

#[tokio::test]
async fn imports_into_existing_project_without_overwriting() {
    let backup = write_backup(&backup_xml());
    let store = Arc::new(MemoryStore::with_catalog(catalog()));
    store.add_user("fred");
    let existing_id = store.add_project(ExternalProject {
        id: "ignored".into(),
        key: PROJECT_KEY.into(),
        name: "Existing monkey".into(),
        description: Some("Keep me".into()),
        counter: Some("5".into()),
        ..Default::default()
    });
    let manager = manager(&store, store.clone(), test_config());

    let summary = manager.run(&options(&backup)).await.unwrap();

    let imported = summary.imported_project.unwrap();
    assert_eq!(imported.id, existing_id);
    assert!(!imported.created);

    let project = store.project_by_key(PROJECT_KEY).unwrap();
    assert_eq!(project.id, existing_id);
    assert_eq!(project.project.name, "Existing monkey");
    assert_eq!(project.project.description.as_deref(), Some("Keep me"));
    assert!(project.counter >= BACKUP_COUNTER);

    assert_eq!(store.issue_by_key("MNK-12").unwrap().project_id, existing_id);
    assert_eq!(summary.users_created, 0);
    // Role members are only written for new or overwritten projects.
    assert!(store.role_actors().is_empty());
    assert!(!store.operations().iter().any(|op| op.starts_with("create_project")));
}

#[tokio::test]
async fn overwrite_replaces_project_details() {
    let backup = write_backup(&backup_xml());
    let store = Arc::new(MemoryStore::with_catalog(catalog()));
    store.add_user("fred");
    store.add_project(ExternalProject {
        key: PROJECT_KEY.into(),
        name: "Existing monkey".into(),
        ..Default::default()
    });
    let manager = manager(&store, store.clone(), test_config());

    let options = options(&backup).with_overwrite_project_details(true);
    let summary = manager.run(&options).await.unwrap();

    let project = store.project_by_key(PROJECT_KEY).unwrap();
    assert_eq!(project.project.name, "Monkey");
    assert_eq!(project.project.description.as_deref(), Some("Bananas everywhere"));
    assert_eq!(store.role_actors().len(), 1);
    assert!(summary.is_complete());
}

#[tokio::test]
async fn project_with_issues_cannot_be_imported_into() {
    let backup = write_backup(&backup_xml());
    let store = Arc::new(MemoryStore::with_catalog(catalog()));
    let project_id = store.add_project(ExternalProject {
        key: PROJECT_KEY.into(),
        name: "Busy monkey".into(),
        ..Default::default()
    });
    store.add_issue(
        &project_id,
        carryover_core::external::ExternalIssue {
            key: "MNK-1".into(),
            summary: "Already here".into(),
            ..Default::default()
        },
    );
    let manager = manager(&store, store.clone(), test_config());

    let failure = manager.run(&options(&backup)).await.unwrap_err();

    let mapping = assert_matches!(failure.error, ImportError::MappingBlocked(mapping) => mapping);
    assert!(mapping.has_errors_for(ValidationKind::Project));
    assert_eq!(failure.results.phase, ImportPhase::Aborted);
}

// ---------------------------------------------------------------------------
// Test: blocking mapping errors stop the import before any write
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unmapped_custom_field_blocks_import() {
    let backup = write_backup(&backup_xml());
    let mut catalog = catalog();
    catalog.custom_fields.clear();
    let store = Arc::new(MemoryStore::with_catalog(catalog));
    let manager = manager(&store, store.clone(), test_config());

    let failure = manager.run(&options(&backup)).await.unwrap_err();

    let mapping = assert_matches!(failure.error, ImportError::MappingBlocked(mapping) => mapping);
    assert!(mapping.has_errors_for(ValidationKind::CustomField));
    assert!(mapping.errors().iter().any(|(_, e)| e.contains("Colour")));
    assert!(store.operations().is_empty());
    assert_eq!(failure.results.issues_created, 0);
}

#[tokio::test]
async fn plugin_version_mismatch_blocks_import() {
    let xml = backup_xml().replace(
        "</entity-engine-xml>",
        "    <PluginVersion id=\"1\" key=\"x\" name=\"Fields\" version=\"1.0\"/>\n</entity-engine-xml>",
    );
    let backup = write_backup(&xml);
    let mut catalog = catalog();
    catalog.plugin_versions.insert("x".into(), "2.0".into());
    let store = Arc::new(MemoryStore::with_catalog(catalog));
    let manager = manager(&store, store.clone(), test_config());

    let failure = manager.run(&options(&backup)).await.unwrap_err();

    let mapping = assert_matches!(failure.error, ImportError::MappingBlocked(mapping) => mapping);
    assert!(mapping.has_errors_for(ValidationKind::Project));
    assert!(mapping.errors().iter().any(|(_, e)| e.contains("version '1.0' in the backup")));
    assert!(store.operations().is_empty());
}

#[tokio::test]
async fn import_needs_a_validated_mapping() {
    let backup = write_backup(&backup_xml());
    let store = Arc::new(MemoryStore::with_catalog(catalog()));
    let manager = manager(&store, store.clone(), test_config());
    let options = options(&backup);

    let overview = manager.get_backup_overview(&options).await.unwrap();
    let data = manager.get_import_data(&options, &overview).await.unwrap();
    let failure = manager.do_import(&options, &overview, data).await.unwrap_err();

    assert_matches!(failure.error, ImportError::NotValidated);
    assert!(store.operations().is_empty());
}

#[tokio::test]
async fn staged_import_refuses_a_blocked_mapping() {
    let backup = write_backup(&backup_xml());
    let mut catalog = catalog();
    catalog.custom_fields.clear();
    let store = Arc::new(MemoryStore::with_catalog(catalog));
    let manager = manager(&store, store.clone(), test_config());
    let options = options(&backup);

    let overview = manager.get_backup_overview(&options).await.unwrap();
    let mut data = manager.get_import_data(&options, &overview).await.unwrap();
    let mapping = manager
        .validate_and_auto_map(&options, &overview, &mut data)
        .await
        .unwrap();
    assert!(!mapping.can_import());

    let failure = manager.do_import(&options, &overview, data).await.unwrap_err();

    assert_matches!(failure.error, ImportError::MappingBlocked(_));
    assert!(store.operations().is_empty());
}

#[tokio::test]
async fn unknown_project_key_is_reported() {
    let backup = write_backup(&backup_xml());
    let store = Arc::new(MemoryStore::with_catalog(catalog()));
    let manager = manager(&store, store.clone(), test_config());

    let options = ProjectImportOptions::new(backup.path(), "NOPE");
    let failure = manager.run(&options).await.unwrap_err();

    assert_matches!(failure.error, ImportError::ProjectNotInBackup(key) if key == "NOPE");
}

#[tokio::test]
async fn invalid_issue_counter_is_skipped() {
    let backup = write_backup(&backup_xml().replace("counter=\"12\"", "counter=\"lots\""));
    let store = Arc::new(MemoryStore::with_catalog(catalog()));
    let manager = manager(&store, store.clone(), test_config());

    let summary = manager.run(&options(&backup)).await.unwrap();

    assert!(summary.is_complete());
    // Only the reset after the issues were written touches the counter.
    let counter_updates = store
        .operations()
        .iter()
        .filter(|op| op.starts_with("update_project_issue_counter"))
        .count();
    assert_eq!(counter_updates, 1);
    assert!(store.project_by_key(PROJECT_KEY).unwrap().counter >= BACKUP_COUNTER);
}

#[tokio::test]
async fn missing_attachment_file_is_a_warning() {
    let backup = write_backup(&backup_xml());
    let empty_root = tempfile::TempDir::new().unwrap();
    let store = Arc::new(MemoryStore::with_catalog(catalog()));
    let manager = manager(&store, store.clone(), test_config());
    let options = options(&backup).with_attachment_path(empty_root.path());

    let overview = manager.get_backup_overview(&options).await.unwrap();
    let mut data = manager.get_import_data(&options, &overview).await.unwrap();
    assert_eq!(data.attachment_count(), 1);

    let mapping = manager
        .validate_and_auto_map(&options, &overview, &mut data)
        .await
        .unwrap();
    assert!(mapping.can_import());
    let messages = mapping.get(ValidationKind::FileAttachment).unwrap();
    assert_eq!(messages.warning_count(), 1);
    assert_eq!(data.valid_attachment_count, 0);

    let summary = manager.do_import(&options, &overview, data).await.unwrap();
    assert_eq!(summary.attachments_created, 0);
    assert_eq!(summary.expected_attachments, 0);
    assert_eq!(summary.error_count, 0);
}

// ---------------------------------------------------------------------------
// Test: error threshold
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failures_above_threshold_abort_the_import() {
    let backup = write_backup(&backup_xml_with_issues(11));
    let store = Arc::new(MemoryStore::with_catalog(catalog()));
    let persister: Arc<dyn ProjectImportPersister> = Arc::new(FlakyPersister::new(store.clone(), 2));
    let config = carryover_pipeline::ImportConfig {
        error_threshold: 3,
        ..test_config()
    };
    let manager = manager(&store, persister, config);

    let failure = manager.run(&options(&backup)).await.unwrap_err();

    assert!(failure.is_abort());
    assert_eq!(failure.results.phase, ImportPhase::Aborted);
    assert!(failure.results.error_count > 3);
    assert!(failure.results.issues_created < 12);
    assert!(store.reindexed().is_empty());
    // Whatever was written before the abort stays.
    assert!(store.project_by_key(PROJECT_KEY).is_some());
}

#[tokio::test]
async fn failures_within_threshold_are_recorded() {
    let backup = write_backup(&backup_xml_with_issues(7));
    let store = Arc::new(MemoryStore::with_catalog(catalog()));
    let persister: Arc<dyn ProjectImportPersister> = Arc::new(FlakyPersister::new(store.clone(), 4));
    let config = carryover_pipeline::ImportConfig {
        error_threshold: 3,
        ..test_config()
    };
    let manager = manager(&store, persister, config);

    let summary = manager.run(&options(&backup)).await.unwrap();

    assert!(summary.is_complete());
    assert_eq!(summary.expected_issues, 8);
    assert_eq!(summary.issues_created, 6);
    assert_eq!(summary.error_count, 2);
    assert_eq!(store.issue_count(), 6);
    assert_eq!(store.reindexed().len(), 6);
}

// ---------------------------------------------------------------------------
// Test: a store that goes away stops the import
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unavailable_store_aborts_before_issues() {
    let backup = write_backup(&backup_xml());
    let store = Arc::new(MemoryStore::with_catalog(catalog()));
    let persister: Arc<dyn ProjectImportPersister> =
        Arc::new(FlakyPersister::unavailable_versions(store.clone()));
    let manager = manager(&store, persister, test_config());

    let failure = manager.run(&options(&backup)).await.unwrap_err();

    assert!(failure.is_abort());
    assert_matches!(
        failure.error,
        ImportError::Aborted(AbortImport { reason: AbortReason::DependencyWrite(_) })
    );
    assert_eq!(failure.results.phase, ImportPhase::Aborted);
    assert!(store.operations().iter().all(|op| !op.starts_with("create_issue")));
    assert!(store.project_by_key(PROJECT_KEY).is_some());
}
