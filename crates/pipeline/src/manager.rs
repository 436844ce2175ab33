//! Entry point of a project import.
//!
//! [`ProjectImportManager`] exposes the stages one by one, so a caller can
//! show the overview, let an operator review the mapping result and only
//! then start persistence, and [`run`](ProjectImportManager::run) chains them
//! for unattended imports.
//!
//! Progress ranges of the whole import:
//!
//! | Stage        | Percent  |
//! |--------------|----------|
//! | overview     | 0..10    |
//! | partitioning | 10..25   |
//! | mapping      | 25..30   |
//! | persistence  | 30..100  |

use std::sync::{Arc, RwLock};

use carryover_core::backup::{BackupOverview, BackupProject};
use carryover_core::i18n::{EnglishCatalog, I18n};
use carryover_core::mapper::MapperRegistry;
use carryover_core::options::{ImportPhase, ProjectImportOptions};
use carryover_core::progress::{
    EntityCountProgress, NoopProgressSink, ProgressReporter, ProgressSink, TaskProgressInterval,
};
use carryover_core::results::{ImportSummary, ProjectImportResults};
use carryover_core::validation::MappingResult;

use crate::config::ImportConfig;
use crate::error::{ImportError, ImportFailure};
use crate::mapping::{augment_catalog, map_and_validate};
use crate::overview::read_backup_overview;
use crate::partition::{
    MapperRegistrationHandler, PartitionHandler, PartitionKind, Partitions,
    SecondDegreePartitionHandler,
};
use crate::persist::{PersistContext, ProjectImportPersistence};
use crate::scanner::{scan, DispatchTable};
use crate::store::{ProjectImportPersister, TargetSystem, UserDirectory};

const OVERVIEW: (u8, u8) = (0, 10);
const PARTITION: (u8, u8) = (10, 25);
const MAPPING: (u8, u8) = (25, 30);
const PERSISTENCE: (u8, u8) = (30, 100);

/// Everything the partitioning stage produced for one project.
///
/// Dropping it removes the partition files.
#[derive(Debug)]
pub struct ProjectImportData {
    pub mappers: MapperRegistry,
    pub partitions: Partitions,
    /// Attachments whose file exists; set by mapping validation.
    pub valid_attachment_count: usize,
    /// Outcome of the last validation; persistence refuses to start without one.
    mapping: Option<MappingResult>,
}

impl ProjectImportData {
    pub fn mapping(&self) -> Option<&MappingResult> {
        self.mapping.as_ref()
    }

    pub fn issue_count(&self) -> usize {
        self.partitions.entity_count(PartitionKind::Issues)
    }

    pub fn attachment_count(&self) -> usize {
        self.partitions.entity_count(PartitionKind::Attachments)
    }
}

/// Drives one project import against a target system.
pub struct ProjectImportManager {
    persister: Arc<dyn ProjectImportPersister>,
    directory: Arc<dyn UserDirectory>,
    target: Arc<dyn TargetSystem>,
    config: ImportConfig,
    i18n: Arc<dyn I18n>,
    reporter: Arc<ProgressReporter>,
}

impl ProjectImportManager {
    pub fn new(
        persister: Arc<dyn ProjectImportPersister>,
        directory: Arc<dyn UserDirectory>,
        target: Arc<dyn TargetSystem>,
        config: ImportConfig,
    ) -> Self {
        Self {
            persister,
            directory,
            target,
            config,
            i18n: Arc::new(EnglishCatalog),
            reporter: Arc::new(ProgressReporter::new(Arc::new(NoopProgressSink))),
        }
    }

    pub fn with_i18n(mut self, i18n: Arc<dyn I18n>) -> Self {
        self.i18n = i18n;
        self
    }

    /// Progress is monotonic per manager; use one manager per import.
    pub fn with_progress_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.reporter = Arc::new(ProgressReporter::new(sink));
        self
    }

    fn interval((from, to): (u8, u8)) -> TaskProgressInterval {
        TaskProgressInterval::new(from, to)
    }

    fn results(&self) -> Arc<ProjectImportResults> {
        Arc::new(ProjectImportResults::new(
            self.config.error_threshold,
            self.config.max_retained_errors,
        ))
    }

    // -----------------------------------------------------------------------
    // Stages
    // -----------------------------------------------------------------------

    /// Discover the projects of the backup.
    pub async fn get_backup_overview(
        &self,
        options: &ProjectImportOptions,
    ) -> Result<BackupOverview, ImportError> {
        let interval = Self::interval(OVERVIEW);
        self.reporter
            .report(interval.start(), ImportPhase::NotStarted, "Reading backup overview");
        let overview = read_backup_overview(&options.backup_path, None).await?;
        self.reporter
            .report(interval.end(), ImportPhase::NotStarted, "Backup overview read");
        tracing::info!(
            backup = %options.backup_path.display(),
            projects = overview.projects.len(),
            entities = overview.system.entity_count,
            "Backup overview read"
        );
        Ok(overview)
    }

    /// Partition the backup for the selected project and register its ids.
    pub async fn get_import_data(
        &self,
        options: &ProjectImportOptions,
        overview: &BackupOverview,
    ) -> Result<ProjectImportData, ImportError> {
        let project = backup_project(overview, options)?;
        let mut partitions = Partitions::new()?;
        let mut mappers = MapperRegistry::new();
        let interval = Self::interval(PARTITION);
        let total = overview.system.entity_count;

        let first = EntityCountProgress::new(
            Arc::clone(&self.reporter),
            Arc::clone(&self.i18n),
            interval.sub_interval(0, 70),
            ImportPhase::NotStarted,
            "backup",
            total,
            self.config.progress_every,
        );
        let mut partition =
            PartitionHandler::new(project, &partitions, options.attachment_path().is_some());
        let skipped = {
            let mut registration = MapperRegistrationHandler::new(&mut mappers, project);
            {
                let mut table = DispatchTable::new().with_progress(&first);
                table.register(&mut partition);
                table.register(&mut registration);
                scan(&options.backup_path, &mut table).await?;
            }
            registration.skipped()
        };
        for (kind, file) in partition.take_files() {
            partitions.insert(kind, file);
        }

        let (comment_ids, change_group_ids) = partition.second_degree_owners();
        let second = EntityCountProgress::new(
            Arc::clone(&self.reporter),
            Arc::clone(&self.i18n),
            interval.sub_interval(70, 100),
            ImportPhase::NotStarted,
            "backup",
            total,
            self.config.progress_every,
        );
        let mut second_degree =
            SecondDegreePartitionHandler::new(&partitions, comment_ids, change_group_ids);
        {
            let mut table = DispatchTable::new().with_progress(&second);
            table.register(&mut second_degree);
            scan(&options.backup_path, &mut table).await?;
        }
        for (kind, file) in second_degree.take_files() {
            partitions.insert(kind, file);
        }

        tracing::info!(
            project_key = %project.key(),
            issues = partitions.entity_count(PartitionKind::Issues),
            issue_related = partitions.entity_count(PartitionKind::IssueRelated),
            second_degree = partitions.entity_count(PartitionKind::SecondDegree),
            custom_field_values = partitions.entity_count(PartitionKind::CustomFieldValues),
            attachments = partitions.entity_count(PartitionKind::Attachments),
            skipped,
            "Backup partitioned"
        );
        Ok(ProjectImportData {
            mappers,
            partitions,
            valid_attachment_count: 0,
            mapping: None,
        })
    }

    /// Map `data` onto the target and validate it. Mappings made by an
    /// operator before this call are kept; mappings changed afterwards need
    /// another call before [`do_import`](Self::do_import).
    pub async fn validate_and_auto_map(
        &self,
        options: &ProjectImportOptions,
        overview: &BackupOverview,
        data: &mut ProjectImportData,
    ) -> Result<MappingResult, ImportError> {
        let project = backup_project(overview, options)?;
        let interval = Self::interval(MAPPING);
        self.reporter
            .report(interval.start(), ImportPhase::NotStarted, "Mapping and validating");

        let mut catalog = self.target.load_catalog(project.key()).await?;
        augment_catalog(self.directory.as_ref(), &data.mappers, &mut catalog).await?;
        let outcome = map_and_validate(
            self.i18n.as_ref(),
            &mut data.mappers,
            project,
            &overview.system,
            &catalog,
            options,
            &data.partitions,
        )
        .await?;
        data.valid_attachment_count = outcome.valid_attachment_count;
        data.mapping = Some(outcome.result.clone());

        self.reporter
            .report(interval.end(), ImportPhase::NotStarted, "Mapping validated");
        Ok(outcome.result)
    }

    /// Persist a validated project. The partition files are removed when
    /// this returns, whatever the outcome.
    ///
    /// Nothing is written unless `data` went through
    /// [`validate_and_auto_map`](Self::validate_and_auto_map) without blocking errors.
    pub async fn do_import(
        &self,
        options: &ProjectImportOptions,
        overview: &BackupOverview,
        data: ProjectImportData,
    ) -> Result<ImportSummary, ImportFailure> {
        let results = self.results();
        let ProjectImportData {
            mappers,
            partitions,
            valid_attachment_count,
            mapping,
        } = data;
        match mapping {
            None => return Err(self.fail(&results, ImportError::NotValidated)),
            Some(mapping) if !mapping.can_import() => {
                for (kind, error) in mapping.errors() {
                    tracing::warn!(kind = %kind, error, "Blocking mapping error");
                }
                return Err(self.fail(&results, ImportError::MappingBlocked(Box::new(mapping))));
            }
            Some(_) => {}
        }
        let project = match backup_project(overview, options) {
            Ok(project) => project,
            Err(err) => return Err(self.fail(&results, err)),
        };
        results.set_expected_issues(partitions.entity_count(PartitionKind::Issues));
        results.set_expected_attachments(valid_attachment_count);

        let ctx = PersistContext {
            persister: Arc::clone(&self.persister),
            directory: Arc::clone(&self.directory),
            mappers: Arc::new(RwLock::new(mappers)),
            results: Arc::clone(&results),
            i18n: Arc::clone(&self.i18n),
            reporter: Arc::clone(&self.reporter),
            config: self.config.clone(),
            project: Arc::new(project.clone()),
            system: Arc::new(overview.system.clone()),
        };
        let persistence =
            ProjectImportPersistence::new(ctx, options, &partitions, Self::interval(PERSISTENCE));

        match persistence.run().await {
            Ok(target) => {
                results.mark_finished();
                let summary = results.summary();
                tracing::info!(
                    project_key = %project.key(),
                    project_id = %target.id,
                    issues = summary.issues_created,
                    errors = summary.error_count,
                    "Project import complete"
                );
                Ok(summary)
            }
            Err(err) => Err(self.fail(&results, err)),
        }
    }

    /// Overview, partitioning, mapping and persistence in one go.
    ///
    /// Stops before writing anything when the mapping has blocking errors.
    pub async fn run(&self, options: &ProjectImportOptions) -> Result<ImportSummary, ImportFailure> {
        let results = self.results();
        let overview = self
            .get_backup_overview(options)
            .await
            .map_err(|e| self.fail(&results, e))?;
        let mut data = self
            .get_import_data(options, &overview)
            .await
            .map_err(|e| self.fail(&results, e))?;
        self.validate_and_auto_map(options, &overview, &mut data)
            .await
            .map_err(|e| self.fail(&results, e))?;
        self.do_import(options, &overview, data).await
    }

    fn fail(&self, results: &ProjectImportResults, error: ImportError) -> ImportFailure {
        results.set_phase(ImportPhase::Aborted);
        results.mark_finished();
        tracing::error!(error = %error, "Project import failed");
        ImportFailure::new(error, results.summary())
    }
}

fn backup_project<'o>(
    overview: &'o BackupOverview,
    options: &ProjectImportOptions,
) -> Result<&'o BackupProject, ImportError> {
    overview
        .project(&options.project_key)
        .ok_or_else(|| ImportError::ProjectNotInBackup(options.project_key.clone()))
}
