//! Export coordinator: source backend → artifact store.
//!
//! # Error policy
//! Export is all-or-nothing. A tool that exits non-zero (or cannot be
//! started) fails the whole run with `ExportFailed`, because a partially
//! dumped database is never assumed to be importable.

use crate::artifacts::{ArtifactStore, Compression, ExportArtifact};
use crate::error::DocFerryError;
use crate::outcome::{TransferOperation, TransferOutcome, TransferReport, TransferScope, TransferStatus};
use crate::profile::ConnectionProfile;
use crate::task::{CollectionSelector, CollectionTask};
use crate::tools::{BulkTool, ToolInvocation, ToolRunner};
use crate::Result;
use serde::Serialize;
use std::time::Instant;

/// Artifacts produced by one export, plus the per-collection report.
#[derive(Debug, Clone, Serialize)]
pub struct ExportSummary {
    /// Artifacts now present in the store
    pub artifacts: Vec<ExportArtifact>,
    /// One `Succeeded` outcome per exported collection
    pub report: TransferReport,
}

/// Drives the bulk export tool against a source backend.
#[derive(Debug, Clone)]
pub struct ExportCoordinator<R> {
    runner: R,
    store: ArtifactStore,
}

impl<R: ToolRunner> ExportCoordinator<R> {
    /// Creates a coordinator writing into `store`.
    pub fn new(runner: R, store: ArtifactStore) -> Self {
        Self { runner, store }
    }

    /// Artifact store written to.
    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Builds the export tool invocation for a task.
    pub fn build_invocation(&self, profile: &ConnectionProfile, task: &CollectionTask) -> ToolInvocation {
        let database = task.database.as_deref().unwrap_or_default();

        ToolInvocation::new(BulkTool::Export, profile.tool_uri(), profile.redacted_uri())
            .flag("db", database)
            .flag_opt("collection", task.source.name())
            .flag_opt("numParallelCollections", task.parallelism)
            .switch_if("gzip", task.compress)
            .switch_if("tlsInsecure", profile.tls().insecure())
            .flag("out", self.store.root().display())
    }

    /// Exports one collection or a whole database into the artifact store.
    ///
    /// # Errors
    /// - `Validation` for a malformed task, before any process is spawned
    /// - `Io` if the artifact root cannot be created
    /// - `ExportFailed` if the tool cannot start or exits non-zero
    /// - `ArtifactNotFound` if a named collection's data file is missing afterwards
    pub async fn export(&self, profile: &ConnectionProfile, task: &CollectionTask) -> Result<ExportSummary> {
        task.validate(true)?;
        let database = task.database.as_deref().unwrap_or_default();
        let collection = task.source.name();
        let compression = Compression::from_flag(task.compress);

        self.store.ensure_root().await?;

        let invocation = self.build_invocation(profile, task);
        tracing::info!(
            "Exporting {}.{} from {}",
            database,
            task.source,
            profile.redacted_uri()
        );

        let started = Instant::now();
        let output = self
            .runner
            .run(&invocation)
            .await
            .map_err(|e| DocFerryError::export_failed(collection, e.to_string()))?;

        if !output.success() {
            let error = DocFerryError::export_failed(collection, output.failure_cause());
            tracing::error!("{}", error);
            return Err(error);
        }
        let elapsed = started.elapsed();

        let (artifacts, scope) = match &task.source {
            CollectionSelector::Named(name) => (
                vec![self.store.locate(database, name, compression)?],
                TransferScope::Explicit,
            ),
            CollectionSelector::All => {
                let artifacts = match self.store.discover_database(database, compression) {
                    Ok(artifacts) => artifacts,
                    Err(DocFerryError::ArtifactNotFound { .. }) => {
                        tracing::warn!("Export of database '{}' produced no collections", database);
                        Vec::new()
                    }
                    Err(e) => return Err(e),
                };
                let discovered = artifacts.len();
                (artifacts, TransferScope::WholeDatabase { discovered })
            }
        };

        let mut report = TransferReport::new(TransferOperation::Export, scope);
        for artifact in &artifacts {
            if !artifact.has_metadata() {
                tracing::debug!("No metadata descriptor for {}", artifact.namespace());
            }
            report.push(
                TransferOutcome::new(
                    &artifact.database,
                    &artifact.collection,
                    TransferStatus::Succeeded {
                        documents_restored: None,
                        documents_failed: 0,
                        indexes_restored: artifact.has_metadata(),
                    },
                )
                .with_duration(elapsed),
            );
        }

        tracing::info!(
            "Export of {}.{} completed in {:.2}s: {} artifact(s) in {}",
            database,
            task.source,
            elapsed.as_secs_f64(),
            artifacts.len(),
            self.store.root().display()
        );

        Ok(ExportSummary { artifacts, report })
    }
}
