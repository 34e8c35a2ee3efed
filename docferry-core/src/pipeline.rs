//! Export then import in one call.

use crate::artifacts::ArtifactStore;
use crate::export::{ExportCoordinator, ExportSummary};
use crate::import::ImportCoordinator;
use crate::outcome::{TransferReport, TransferScope};
use crate::profile::ConnectionProfile;
use crate::task::{CollectionSelector, CollectionTask};
use crate::tools::ToolRunner;
use crate::Result;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

/// Reports of both halves of a migration.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationSummary {
    /// Export half
    pub export: ExportSummary,
    /// Import half
    pub import: TransferReport,
}

impl MigrationSummary {
    /// Both halves succeeded by their own run-level rules.
    pub fn is_success(&self) -> bool {
        self.export.report.is_success() && self.import.is_success()
    }
}

/// Source → artifact store → target.
#[derive(Debug, Clone)]
pub struct MigrationPipeline<R> {
    export: ExportCoordinator<R>,
    import: ImportCoordinator<R>,
}

impl<R: ToolRunner + Clone> MigrationPipeline<R> {
    /// Builds both coordinators around one runner and one store.
    pub fn new(runner: R, store: ArtifactStore) -> Self {
        Self {
            export: ExportCoordinator::new(runner.clone(), store),
            import: ImportCoordinator::new(runner),
        }
    }

    /// Artifact store used for staging.
    pub fn store(&self) -> &ArtifactStore {
        self.export.store()
    }

    /// Exports from `source`, then imports exactly the exported artifacts into `target`.
    ///
    /// # Errors
    /// Any export error aborts before the import starts. Per-collection import
    /// failures are reported in [`MigrationSummary::import`].
    pub async fn migrate(
        &self,
        source: &ConnectionProfile,
        target: &ConnectionProfile,
        task: &CollectionTask,
        cancel: &CancellationToken,
    ) -> Result<MigrationSummary> {
        let export = self.export.export(source, task).await?;

        let scope = match task.source {
            CollectionSelector::Named(_) => TransferScope::Explicit,
            CollectionSelector::All => TransferScope::WholeDatabase {
                discovered: export.artifacts.len(),
            },
        };
        let import = self
            .import
            .import_artifacts(target, &export.artifacts, task, scope, cancel)
            .await;

        Ok(MigrationSummary { export, import })
    }
}
