//! Import coordinator: artifact store → target backend.
//!
//! # Error policy
//! Unlike export, a failed collection does not stop the batch. Each
//! collection is one fold step that always yields a [`TransferOutcome`];
//! only input problems (validation, missing artifacts) abort the call
//! before the first tool runs.
//!
//! # Concurrency
//! Parallelism is delegated to the import tool. Imports into the same
//! target namespace are serialized through [`NamespaceLocks`], including
//! across concurrent calls sharing one coordinator.

use crate::artifacts::{ArtifactStore, Compression, ExportArtifact};
use crate::error::DocFerryError;
use crate::outcome::{TransferOperation, TransferOutcome, TransferReport, TransferScope, TransferStatus};
use crate::profile::ConnectionProfile;
use crate::task::{CollectionSelector, CollectionTask};
use crate::tools::{BulkTool, ToolInvocation, ToolRunner};
use crate::Result;
use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Reason recorded for collections left untouched after cancellation.
pub const CANCELLED: &str = "cancelled";

/// Per-document counts from the import tool's closing summary line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestoreSummary {
    /// Documents restored
    pub restored: u64,
    /// Documents that failed to restore
    pub failed: u64,
}

/// Parses `N document(s) restored successfully. M document(s) failed to restore.`
///
/// Returns the last summary found, or `None` for tool versions that do not
/// print one.
pub fn parse_restore_summary(output: &str) -> Option<RestoreSummary> {
    static SUMMARY: OnceLock<Option<Regex>> = OnceLock::new();
    let pattern = SUMMARY
        .get_or_init(|| {
            Regex::new(
                r"(\d+) document\(s\) restored successfully\. (\d+) document\(s\) failed to restore",
            )
            .ok()
        })
        .as_ref()?;

    let captures = pattern.captures_iter(output).last()?;
    Some(RestoreSummary {
        restored: captures.get(1)?.as_str().parse().ok()?,
        failed: captures.get(2)?.as_str().parse().ok()?,
    })
}

/// Async mutex per target namespace.
#[derive(Debug, Default, Clone)]
pub struct NamespaceLocks {
    locks: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl NamespaceLocks {
    /// Returns the lock guarding `namespace`, creating it on first use.
    pub fn lock_for(&self, namespace: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = match self.locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        locks
            .entry(namespace.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

/// Drives the bulk import tool against a target backend.
#[derive(Debug, Clone)]
pub struct ImportCoordinator<R> {
    runner: R,
    locks: NamespaceLocks,
}

impl<R: ToolRunner> ImportCoordinator<R> {
    /// Creates a coordinator.
    pub fn new(runner: R) -> Self {
        Self {
            runner,
            locks: NamespaceLocks::default(),
        }
    }

    /// Builds the import tool invocation for one artifact.
    ///
    /// `--drop` replaces the target namespace so re-running an import is
    /// idempotent at collection granularity.
    pub fn build_invocation(
        &self,
        profile: &ConnectionProfile,
        artifact: &ExportArtifact,
        target_database: &str,
        target_collection: &str,
        task: &CollectionTask,
    ) -> ToolInvocation {
        let skip_indexes = !task.restore_indexes || !artifact.has_metadata();

        ToolInvocation::new(BulkTool::Import, profile.tool_uri(), profile.redacted_uri())
            .flag("db", target_database)
            .flag("collection", target_collection)
            .switch("drop")
            .switch_if("gzip", artifact.compression.is_gzip())
            .flag_opt("numInsertionWorkersPerCollection", task.parallelism)
            .switch_if("noIndexRestore", skip_indexes)
            .switch_if("tlsInsecure", profile.tls().insecure())
            .positional(&artifact.data_path)
    }

    /// Imports according to `task`: one named collection, one database, or
    /// every database under the store root.
    ///
    /// # Errors
    /// - `Validation` for a malformed task
    /// - `ArtifactNotFound` if the named artifact is missing or discovery finds nothing
    ///
    /// Per-collection failures are reported in the returned report, not as errors.
    pub async fn import(
        &self,
        profile: &ConnectionProfile,
        store: &ArtifactStore,
        task: &CollectionTask,
        cancel: &CancellationToken,
    ) -> Result<TransferReport> {
        let compression = Compression::from_flag(task.compress);

        match &task.source {
            CollectionSelector::Named(name) => {
                task.validate(true)?;
                let database = task.database.as_deref().unwrap_or_default();
                let artifact = store.locate(database, name, compression)?;
                Ok(self
                    .import_artifacts(profile, &[artifact], task, TransferScope::Explicit, cancel)
                    .await)
            }
            CollectionSelector::All => {
                task.validate(false)?;
                let artifacts = match task.database.as_deref() {
                    Some(database) => store.discover_database(database, compression)?,
                    None => store.discover(compression)?,
                };
                let scope = TransferScope::WholeDatabase {
                    discovered: artifacts.len(),
                };
                Ok(self
                    .import_artifacts(profile, &artifacts, task, scope, cancel)
                    .await)
            }
        }
    }

    /// Imports an already resolved artifact list in order.
    ///
    /// Always returns a report with exactly one outcome per artifact.
    pub async fn import_artifacts(
        &self,
        profile: &ConnectionProfile,
        artifacts: &[ExportArtifact],
        task: &CollectionTask,
        scope: TransferScope,
        cancel: &CancellationToken,
    ) -> TransferReport {
        tracing::info!(
            "Importing {} collection(s) into {}",
            artifacts.len(),
            profile.redacted_uri()
        );

        let mut report = TransferReport::new(TransferOperation::Import, scope);
        for artifact in artifacts {
            let outcome = if cancel.is_cancelled() {
                let target = self.target_namespace(artifact, task);
                TransferOutcome::new(
                    &artifact.database,
                    &artifact.collection,
                    TransferStatus::Skipped {
                        reason: CANCELLED.to_string(),
                    },
                )
                .with_target(target)
            } else {
                self.import_one(profile, artifact, task).await
            };
            report.push(outcome);
        }

        tracing::info!(
            "Import finished: {} succeeded, {} failed, {} skipped, {} document failure(s)",
            report.succeeded(),
            report.failed(),
            report.skipped(),
            report.document_failures()
        );
        for failure in report.failures() {
            if let TransferStatus::Failed { reason } = &failure.status {
                tracing::warn!("  {} - FAILED: {}", failure.target_namespace, reason);
            }
        }

        report
    }

    fn target_namespace(&self, artifact: &ExportArtifact, task: &CollectionTask) -> String {
        format!(
            "{}.{}",
            task.target_database_or(&artifact.database),
            task.target_collection_for(&artifact.collection)
        )
    }

    async fn import_one(
        &self,
        profile: &ConnectionProfile,
        artifact: &ExportArtifact,
        task: &CollectionTask,
    ) -> TransferOutcome {
        let target_database = task.target_database_or(&artifact.database);
        let target_collection = task.target_collection_for(&artifact.collection);
        let namespace = format!("{}.{}", target_database, target_collection);

        if task.restore_indexes && !artifact.has_metadata() {
            tracing::warn!(
                "No metadata descriptor for {}; restoring data without indexes",
                artifact.namespace()
            );
        }

        let invocation =
            self.build_invocation(profile, artifact, target_database, target_collection, task);

        let lock = self.locks.lock_for(&namespace);
        let _guard = lock.lock().await;

        tracing::debug!("Importing {} into {}", artifact.namespace(), namespace);
        let started = Instant::now();
        let result = self.runner.run(&invocation).await;
        let elapsed = started.elapsed();

        let status = match result {
            Ok(output) if output.success() => {
                let summary = parse_restore_summary(&output.stderr)
                    .or_else(|| parse_restore_summary(&output.stdout));
                let documents_failed = summary.map_or(0, |s| s.failed);
                if documents_failed > 0 {
                    tracing::warn!(
                        "{}: {} document(s) failed to restore",
                        namespace,
                        documents_failed
                    );
                }
                TransferStatus::Succeeded {
                    documents_restored: summary.map(|s| s.restored),
                    documents_failed,
                    indexes_restored: !invocation.has_flag("noIndexRestore"),
                }
            }
            Ok(output) => TransferStatus::Failed {
                reason: DocFerryError::import_collection_failed(&namespace, output.failure_cause())
                    .to_string(),
            },
            Err(e) => TransferStatus::Failed {
                reason: DocFerryError::import_collection_failed(&namespace, e.to_string())
                    .to_string(),
            },
        };

        TransferOutcome::new(&artifact.database, &artifact.collection, status)
            .with_target(namespace)
            .with_duration(elapsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_restore_summary() {
        let stderr = "2024-05-01T10:00:00.000+0000\tfinished restoring reg.users (10 documents, 0 failures)\n\
                      2024-05-01T10:00:00.000+0000\t10 document(s) restored successfully. 0 document(s) failed to restore.\n";
        assert_eq!(
            parse_restore_summary(stderr),
            Some(RestoreSummary {
                restored: 10,
                failed: 0
            })
        );
    }

    #[test]
    fn test_parse_restore_summary_with_failures() {
        let stderr = "7 document(s) restored successfully. 3 document(s) failed to restore.";
        let summary = parse_restore_summary(stderr).unwrap();
        assert_eq!(summary.restored, 7);
        assert_eq!(summary.failed, 3);
    }

    #[test]
    fn test_parse_restore_summary_absent() {
        assert_eq!(parse_restore_summary("done"), None);
        assert_eq!(parse_restore_summary(""), None);
    }

    #[tokio::test]
    async fn test_namespace_locks_are_shared_per_namespace() {
        let locks = NamespaceLocks::default();
        let a1 = locks.lock_for("reg.users");
        let a2 = locks.lock_for("reg.users");
        let b = locks.lock_for("reg.orders");

        assert!(Arc::ptr_eq(&a1, &a2));
        assert!(!Arc::ptr_eq(&a1, &b));

        let _held = a1.lock().await;
        assert!(a2.try_lock().is_err());
        assert!(b.try_lock().is_ok());
    }
}
