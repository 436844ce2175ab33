//! Persistence stage: writes the mapped project into the target system.
//!
//! Phases run strictly in dependency order: users, project, versions,
//! components, issues, issue-related data, second-degree data, custom field
//! values, attachments, role members. Each partition-backed phase re-scans
//! its partition file and runs one job per entity on a fresh
//! [`BoundedExecutor`]; the next phase only starts once that executor has
//! drained. The error threshold is checked after every submitted job and at
//! the end of every phase.

mod jobs;
pub mod transform;

use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;

use carryover_core::backup::{BackupProject, BackupSystemInformation};
use carryover_core::error::{AbortImport, AbortReason, CoreError, ParseError};
use carryover_core::external::{
    names, BackupElement, ExternalAttachment, ExternalCustomFieldValue, ExternalIssue, FromElement,
};
use carryover_core::i18n::{keys, I18n};
use carryover_core::mapper::MapperRegistry;
use carryover_core::options::{ImportPhase, ProjectImportOptions};
use carryover_core::progress::{EntityCountProgress, ProgressReporter, TaskProgressInterval};
use carryover_core::results::{ImportedProject, ProjectImportResults};

use crate::config::ImportConfig;
use crate::error::{HandlerError, ImportError, StoreError};
use crate::executor::{BoundedExecutor, PanicHandler};
use crate::partition::{PartitionKind, Partitions};
use crate::scanner::{scan, DispatchTable, EntityHandler};
use crate::store::{ProjectImportPersister, UserDirectory};

use transform::{IssueRelated, SecondDegree};

/// The mapper registry shared by persistence jobs.
pub type SharedMappers = Arc<RwLock<MapperRegistry>>;

type Job = BoxFuture<'static, ()>;

/// Everything a persistence job may touch.
pub struct PersistContext {
    pub persister: Arc<dyn ProjectImportPersister>,
    pub directory: Arc<dyn UserDirectory>,
    pub mappers: SharedMappers,
    pub results: Arc<ProjectImportResults>,
    pub i18n: Arc<dyn I18n>,
    pub reporter: Arc<ProgressReporter>,
    pub config: ImportConfig,
    pub project: Arc<BackupProject>,
    pub system: Arc<BackupSystemInformation>,
}

impl PersistContext {
    /// Never hold the guard across an `.await`.
    pub fn mappers(&self) -> RwLockReadGuard<'_, MapperRegistry> {
        self.mappers.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn mappers_mut(&self) -> RwLockWriteGuard<'_, MapperRegistry> {
        self.mappers.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a localized, non-fatal error.
    pub fn record_error(&self, key: &str, args: &[&str]) {
        let message = self.i18n.text(key, args);
        let errors = self.results.add_error(message.as_str());
        tracing::warn!(error = %message, errors, "Import error recorded");
    }

    pub fn check_error_threshold(&self) -> Result<(), AbortImport> {
        check_error_threshold(&self.results)
    }
}

fn check_error_threshold(results: &ProjectImportResults) -> Result<(), AbortImport> {
    if results.abort_import_due_to_errors() {
        let abort = AbortImport::error_threshold(results.error_count(), results.error_threshold());
        tracing::error!(error = %abort, "Aborting import");
        Err(abort)
    } else {
        Ok(())
    }
}

fn parsed<T>(result: Result<T, ParseError>, element: &BackupElement) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!(entity = %element.name, error = %err, "Skipping malformed partition element");
            None
        }
    }
}

fn write_failed(reason: fn(String) -> AbortReason, what: &str, err: StoreError) -> ImportError {
    tracing::error!(entity = what, error = %err, "Fatal store error");
    AbortImport::new(reason(format!("{what}: {err}"))).into()
}

// ---------------------------------------------------------------------------
// Partition replay
// ---------------------------------------------------------------------------

/// Turns every element of a partition into a job on the executor.
struct SubmitHandler<'e, F> {
    entities: &'static [&'static str],
    executor: &'e BoundedExecutor,
    results: Arc<ProjectImportResults>,
    make_job: F,
}

#[async_trait]
impl<F> EntityHandler for SubmitHandler<'_, F>
where
    F: FnMut(&BackupElement) -> Option<Job> + Send,
{
    fn entity_names(&self) -> &'static [&'static str] {
        self.entities
    }

    async fn handle_entity(&mut self, element: &BackupElement) -> Result<(), HandlerError> {
        if let Some(job) = (self.make_job)(element) {
            self.executor.submit(job).await?;
        }
        check_error_threshold(&self.results)?;
        Ok(())
    }
}

/// The project the import writes into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectTarget {
    pub id: String,
    pub created: bool,
}

/// Drives the persistence phases of one import.
pub struct ProjectImportPersistence<'a> {
    ctx: Arc<PersistContext>,
    options: &'a ProjectImportOptions,
    partitions: &'a Partitions,
    interval: TaskProgressInterval,
    max_issue_number: Arc<AtomicI64>,
}

impl<'a> ProjectImportPersistence<'a> {
    pub fn new(
        ctx: PersistContext,
        options: &'a ProjectImportOptions,
        partitions: &'a Partitions,
        interval: TaskProgressInterval,
    ) -> Self {
        Self {
            ctx: Arc::new(ctx),
            options,
            partitions,
            interval,
            max_issue_number: Arc::new(AtomicI64::new(0)),
        }
    }

    /// Run every phase. On error the results keep whatever was written.
    pub async fn run(&self) -> Result<ProjectTarget, ImportError> {
        self.create_users().await?;
        let target = self.create_or_update_project().await?;
        self.create_versions(&target.id).await?;
        self.create_components(&target.id).await?;
        self.import_issues(&target.id).await?;
        self.import_issue_related().await?;
        self.import_second_degree().await?;
        self.import_custom_field_values().await?;
        self.import_attachments().await?;
        self.reset_issue_counter(&target.id).await;
        self.import_role_members(&target).await?;
        self.reindex().await;
        self.ctx.results.set_phase(ImportPhase::Complete);
        Ok(target)
    }

    // -----------------------------------------------------------------------
    // Plumbing
    // -----------------------------------------------------------------------

    fn executor(&self) -> BoundedExecutor {
        let ctx = Arc::clone(&self.ctx);
        let on_panic: PanicHandler = Arc::new(move |message| {
            ctx.record_error(keys::PERSIST_TASK_PANICKED, &[&message]);
        });
        BoundedExecutor::new(
            self.ctx.config.pool_size,
            self.ctx.config.queue_capacity,
            Some(on_panic),
        )
    }

    /// Report the start of a phase and return its share of the progress range.
    fn begin(&self, phase: ImportPhase, message_key: &str, from: u8, to: u8) -> TaskProgressInterval {
        let interval = self.interval.sub_interval(from, to);
        let message = self.ctx.i18n.text(message_key, &[]);
        tracing::info!(phase = %phase, "{message}");
        self.ctx.reporter.report(interval.start(), phase, &message);
        interval
    }

    fn complete(&self, phase: ImportPhase) -> Result<(), ImportError> {
        self.ctx.check_error_threshold()?;
        self.ctx.results.set_phase(phase);
        Ok(())
    }

    /// Submit `jobs` and wait for all of them.
    async fn run_jobs(&self, jobs: Vec<Job>) -> Result<(), ImportError> {
        let executor = self.executor();
        for job in jobs {
            let submitted = executor.submit(job).await;
            let checked = self.ctx.check_error_threshold();
            if let Err(abort) = checked {
                executor.shutdown_and_ignore_queue().await;
                return Err(abort.into());
            }
            if let Err(err) = submitted {
                executor.shutdown_and_ignore_queue().await;
                return Err(ImportError::Io(std::io::Error::other(err)));
            }
        }
        executor.shutdown_and_wait().await;
        Ok(())
    }

    /// Re-scan one partition and run a job per element.
    async fn replay<F>(
        &self,
        kind: PartitionKind,
        entities: &'static [&'static str],
        phase: ImportPhase,
        interval: TaskProgressInterval,
        make_job: F,
    ) -> Result<(), ImportError>
    where
        F: FnMut(&BackupElement) -> Option<Job> + Send,
    {
        let Some(file) = self.partitions.get(kind) else {
            return Ok(());
        };
        let progress = EntityCountProgress::new(
            Arc::clone(&self.ctx.reporter),
            Arc::clone(&self.ctx.i18n),
            interval,
            phase,
            kind.to_string(),
            file.entity_count,
            self.ctx.config.progress_every,
        );
        let executor = self.executor();
        let mut handler = SubmitHandler {
            entities,
            executor: &executor,
            results: Arc::clone(&self.ctx.results),
            make_job,
        };
        let scanned = {
            let mut table = DispatchTable::new().with_progress(&progress);
            table.register(&mut handler);
            scan(&file.path, &mut table).await
        };
        drop(handler);

        match scanned {
            Ok(summary) => {
                executor.shutdown_and_wait().await;
                tracing::debug!(partition = %kind, entities = summary.elements_dispatched, "Partition replayed");
                Ok(())
            }
            Err(err) => {
                executor.shutdown_and_ignore_queue().await;
                Err(err.into())
            }
        }
    }

    // -----------------------------------------------------------------------
    // Phases
    // -----------------------------------------------------------------------

    async fn create_users(&self) -> Result<(), ImportError> {
        self.begin(ImportPhase::UsersCreated, keys::PROGRESS_USERS, 0, 3);
        let users: Vec<_> = self
            .ctx
            .mappers()
            .user
            .users_to_auto_create()
            .into_iter()
            .cloned()
            .collect();
        let jobs = users
            .into_iter()
            .map(|user| jobs::create_user(Arc::clone(&self.ctx), user).boxed())
            .collect();
        self.run_jobs(jobs).await?;
        self.complete(ImportPhase::UsersCreated)
    }

    async fn create_or_update_project(&self) -> Result<ProjectTarget, ImportError> {
        self.begin(ImportPhase::ProjectCreatedOrUpdated, keys::PROGRESS_PROJECT, 3, 5);
        let backup = &self.ctx.project.project;
        let (existing, remapped) = {
            let mappers = self.ctx.mappers();
            (
                mappers.project.mapped_id(&backup.id).map(str::to_string),
                transform::project(&mappers, backup),
            )
        };
        let persister = &self.ctx.persister;

        let target = match existing {
            Some(id) => {
                if self.options.overwrite_project_details {
                    persister
                        .update_project_details(&id, &remapped)
                        .await
                        .map_err(|e| write_failed(AbortReason::ProjectWrite, &backup.key, e))?;
                }
                ProjectTarget { id, created: false }
            }
            None => {
                let id = persister
                    .create_project(&remapped)
                    .await
                    .map_err(|e| write_failed(AbortReason::ProjectWrite, &backup.key, e))?;
                {
                    let mut mappers = self.ctx.mappers_mut();
                    mappers.project.register_old_value(&backup.id, Some(&backup.key));
                    mappers.project.map_value(&backup.id, &id).map_err(CoreError::from)?;
                }
                ProjectTarget { id, created: true }
            }
        };

        match (backup.counter_value(), &backup.counter) {
            (Some(counter), _) => {
                persister
                    .update_project_issue_counter(&target.id, counter)
                    .await
                    .map_err(|e| write_failed(AbortReason::ProjectWrite, &backup.key, e))?;
            }
            (None, Some(raw)) => {
                tracing::warn!(project_key = %backup.key, counter = %raw, "Project has an invalid issue counter");
            }
            (None, None) => {}
        }

        tracing::info!(
            project_key = %backup.key,
            project_id = %target.id,
            created = target.created,
            "Project ready"
        );
        self.ctx.results.set_imported_project(ImportedProject {
            id: target.id.clone(),
            key: backup.key.clone(),
            name: backup.name.clone(),
            created: target.created,
        });
        self.complete(ImportPhase::ProjectCreatedOrUpdated)?;
        Ok(target)
    }

    async fn create_versions(&self, project_id: &str) -> Result<(), ImportError> {
        let versions: Vec<_> = self
            .ctx
            .project
            .versions
            .iter()
            .map(|v| transform::version(v, project_id))
            .collect();
        let outcomes = self.ctx.persister.create_versions(&versions).await;
        for (version, outcome) in versions.iter().zip(outcomes) {
            match outcome {
                Ok(new_id) => {
                    let mut mappers = self.ctx.mappers_mut();
                    mappers.version.register_old_value(&version.id, Some(&version.name));
                    mappers.version.map_value(&version.id, &new_id).map_err(CoreError::from)?;
                    drop(mappers);
                    self.ctx.results.increment_versions_created();
                }
                Err(err) if err.is_fatal() => {
                    return Err(write_failed(AbortReason::DependencyWrite, &version.name, err));
                }
                Err(err) => {
                    self.ctx
                        .record_error(keys::PERSIST_VERSION_FAILED, &[&version.name, &err.to_string()]);
                }
            }
        }
        self.complete(ImportPhase::VersionsCreated)
    }

    async fn create_components(&self, project_id: &str) -> Result<(), ImportError> {
        let components: Vec<_> = {
            let mappers = self.ctx.mappers();
            self.ctx
                .project
                .components
                .iter()
                .map(|c| transform::component(&mappers, c, project_id))
                .collect()
        };
        let outcomes = self.ctx.persister.create_components(&components).await;
        for (component, outcome) in components.iter().zip(outcomes) {
            match outcome {
                Ok(new_id) => {
                    let mut mappers = self.ctx.mappers_mut();
                    mappers.component.register_old_value(&component.id, Some(&component.name));
                    mappers.component.map_value(&component.id, &new_id).map_err(CoreError::from)?;
                    drop(mappers);
                    self.ctx.results.increment_components_created();
                }
                Err(err) if err.is_fatal() => {
                    return Err(write_failed(AbortReason::DependencyWrite, &component.name, err));
                }
                Err(err) => {
                    self.ctx
                        .record_error(keys::PERSIST_COMPONENT_FAILED, &[&component.name, &err.to_string()]);
                }
            }
        }
        self.complete(ImportPhase::ComponentsCreated)
    }

    async fn import_issues(&self, project_id: &str) -> Result<(), ImportError> {
        let interval = self.begin(ImportPhase::IssuesImported, keys::PROGRESS_ISSUES, 5, 40);
        let ctx = Arc::clone(&self.ctx);
        let project_id = project_id.to_string();
        let max_key = Arc::clone(&self.max_issue_number);
        self.replay(
            PartitionKind::Issues,
            &[names::ISSUE],
            ImportPhase::IssuesImported,
            interval,
            move |el| {
                let issue = parsed(ExternalIssue::from_element(el), el)?;
                Some(
                    jobs::create_issue(Arc::clone(&ctx), issue, project_id.clone(), Arc::clone(&max_key))
                        .boxed(),
                )
            },
        )
        .await?;
        tracing::info!(issues = self.ctx.results.issues_created(), "Issues imported");
        self.complete(ImportPhase::IssuesImported)
    }

    async fn import_issue_related(&self) -> Result<(), ImportError> {
        let interval = self.begin(
            ImportPhase::IssueRelatedDataImported,
            keys::PROGRESS_ISSUE_RELATED,
            40,
            65,
        );
        let ctx = Arc::clone(&self.ctx);
        self.replay(
            PartitionKind::IssueRelated,
            names::ISSUE_RELATED,
            ImportPhase::IssueRelatedDataImported,
            interval,
            move |el| {
                let entity = parsed(IssueRelated::from_element(el), el).flatten()?;
                Some(jobs::create_issue_related(Arc::clone(&ctx), entity).boxed())
            },
        )
        .await?;
        self.complete(ImportPhase::IssueRelatedDataImported)
    }

    /// Change items and comment properties. Their owners were written by
    /// [`import_issue_related`](Self::import_issue_related).
    async fn import_second_degree(&self) -> Result<(), ImportError> {
        let interval = self.begin(
            ImportPhase::IssueRelatedDataImported,
            keys::PROGRESS_SECOND_DEGREE,
            65,
            72,
        );
        let ctx = Arc::clone(&self.ctx);
        self.replay(
            PartitionKind::SecondDegree,
            names::SECOND_DEGREE,
            ImportPhase::IssueRelatedDataImported,
            interval,
            move |el| {
                let entity = parsed(SecondDegree::from_element(el), el).flatten()?;
                Some(jobs::create_second_degree(Arc::clone(&ctx), entity).boxed())
            },
        )
        .await?;
        self.complete(ImportPhase::IssueRelatedDataImported)
    }

    async fn import_custom_field_values(&self) -> Result<(), ImportError> {
        let interval = self.begin(
            ImportPhase::CustomFieldValuesImported,
            keys::PROGRESS_CUSTOM_FIELD_VALUES,
            72,
            85,
        );
        let ctx = Arc::clone(&self.ctx);
        self.replay(
            PartitionKind::CustomFieldValues,
            &[names::CUSTOM_FIELD_VALUE],
            ImportPhase::CustomFieldValuesImported,
            interval,
            move |el| {
                let value = parsed(ExternalCustomFieldValue::from_element(el), el)?;
                Some(jobs::create_custom_field_value(Arc::clone(&ctx), value).boxed())
            },
        )
        .await?;
        self.complete(ImportPhase::CustomFieldValuesImported)
    }

    async fn import_attachments(&self) -> Result<(), ImportError> {
        let Some(root) = self.options.attachment_path().map(PathBuf::from) else {
            return self.complete(ImportPhase::AttachmentsImported);
        };
        let interval = self.begin(
            ImportPhase::AttachmentsImported,
            keys::PROGRESS_ATTACHMENTS,
            85,
            94,
        );
        let ctx = Arc::clone(&self.ctx);
        self.replay(
            PartitionKind::Attachments,
            &[names::FILE_ATTACHMENT],
            ImportPhase::AttachmentsImported,
            interval,
            move |el| {
                let attachment = parsed(ExternalAttachment::from_element(el), el)?;
                Some(jobs::create_attachment(Arc::clone(&ctx), attachment, root.clone()).boxed())
            },
        )
        .await?;
        self.complete(ImportPhase::AttachmentsImported)
    }

    /// Raise the project counter past the largest imported issue key.
    async fn reset_issue_counter(&self, project_id: &str) {
        let max = self.max_issue_number.load(Ordering::Acquire);
        if max == 0 {
            return;
        }
        if let Err(err) = self.ctx.persister.update_project_issue_counter(project_id, max).await {
            self.ctx.record_error(
                keys::PERSIST_ENTITY_FAILED,
                &["Project", &self.ctx.project.project.key, &self.ctx.project.project.key, &err.to_string()],
            );
        }
    }

    async fn import_role_members(&self, target: &ProjectTarget) -> Result<(), ImportError> {
        if !(target.created || self.options.overwrite_project_details) {
            return self.complete(ImportPhase::RoleMembersImported);
        }
        self.begin(
            ImportPhase::RoleMembersImported,
            keys::PROGRESS_ROLE_MEMBERS,
            94,
            97,
        );
        let actors = self.ctx.mappers().project_role_actor.project_role_actors().to_vec();
        let jobs = actors
            .into_iter()
            .map(|actor| jobs::create_role_member(Arc::clone(&self.ctx), actor, target.id.clone()).boxed())
            .collect();
        self.run_jobs(jobs).await?;
        self.complete(ImportPhase::RoleMembersImported)
    }

    /// Reindex every issue written by this import. Failure is recorded, never fatal.
    async fn reindex(&self) {
        self.begin(ImportPhase::Complete, keys::PROGRESS_REINDEX, 97, 100);
        let issue_ids: Vec<String> = self
            .ctx
            .mappers()
            .issue
            .mapped_values()
            .map(|(_, new_id)| new_id.to_string())
            .collect();
        if issue_ids.is_empty() {
            return;
        }
        if let Err(err) = self.ctx.persister.reindex_issues(&issue_ids).await {
            self.ctx.record_error(keys::PERSIST_REINDEX_FAILED, &[&err.to_string()]);
        }
    }
}
