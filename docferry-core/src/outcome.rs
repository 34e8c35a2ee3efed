//! Per-collection transfer outcomes and run-level reports.
//!
//! Coordinators never throw past a collection boundary: every attempted
//! collection ends up as one [`TransferOutcome`] in a [`TransferReport`], and
//! callers inspect the report to detect partial failure.

use serde::{Deserialize, Serialize};

/// Which coordinator produced a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferOperation {
    /// Bulk export from the source backend
    Export,
    /// Bulk import into the target backend
    Import,
}

/// How the collections of a run were chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransferScope {
    /// A collection named by the caller
    Explicit,
    /// Every artifact discovered for a database (or the whole root)
    WholeDatabase {
        /// Number of artifacts discovered before the run started
        discovered: usize,
    },
}

/// Result of transferring one collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TransferStatus {
    /// The bulk tool completed for this collection
    Succeeded {
        /// Documents restored, when the tool reported it
        documents_restored: Option<u64>,
        /// Documents the tool could not restore (duplicate keys and similar)
        documents_failed: u64,
        /// Whether index definitions were restored (import) or captured (export)
        indexes_restored: bool,
    },
    /// The collection could not be transferred
    Failed {
        /// Sanitized failure reason
        reason: String,
    },
    /// The collection was never attempted
    Skipped {
        /// Why it was skipped
        reason: String,
    },
}

/// One collection's entry in a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferOutcome {
    /// Source database
    pub database: String,
    /// Source collection
    pub collection: String,
    /// `database.collection` written to on the target (equal to the source on export)
    pub target_namespace: String,
    /// What happened
    #[serde(flatten)]
    pub status: TransferStatus,
    /// Wall time of the tool invocation
    pub duration_ms: u64,
}

impl TransferOutcome {
    /// Builds an outcome whose target namespace equals the source.
    pub fn new(database: &str, collection: &str, status: TransferStatus) -> Self {
        Self {
            database: database.to_string(),
            collection: collection.to_string(),
            target_namespace: format!("{}.{}", database, collection),
            status,
            duration_ms: 0,
        }
    }

    /// Overrides the target namespace.
    pub fn with_target(mut self, target_namespace: impl Into<String>) -> Self {
        self.target_namespace = target_namespace.into();
        self
    }

    /// Records the duration.
    pub fn with_duration(mut self, duration: std::time::Duration) -> Self {
        self.duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// `database.collection` on the source side.
    pub fn source_namespace(&self) -> String {
        format!("{}.{}", self.database, self.collection)
    }

    /// Whether the status is `Succeeded`.
    pub fn is_succeeded(&self) -> bool {
        matches!(self.status, TransferStatus::Succeeded { .. })
    }

    /// Whether the status is `Failed`.
    pub fn is_failed(&self) -> bool {
        matches!(self.status, TransferStatus::Failed { .. })
    }

    /// Whether the status is `Skipped`.
    pub fn is_skipped(&self) -> bool {
        matches!(self.status, TransferStatus::Skipped { .. })
    }
}

/// Ordered outcome list for one coordinator call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferReport {
    /// Unique run identifier
    pub run_id: uuid::Uuid,
    /// When the run started
    pub started_at: chrono::DateTime<chrono::Utc>,
    /// Export or import
    pub operation: TransferOperation,
    /// How collections were selected
    pub scope: TransferScope,
    /// One entry per attempted or skipped collection, in processing order
    pub outcomes: Vec<TransferOutcome>,
}

impl TransferReport {
    /// Starts an empty report.
    pub fn new(operation: TransferOperation, scope: TransferScope) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4(),
            started_at: chrono::Utc::now(),
            operation,
            scope,
            outcomes: Vec::new(),
        }
    }

    /// Appends an outcome.
    pub fn push(&mut self, outcome: TransferOutcome) {
        self.outcomes.push(outcome);
    }

    /// Number of succeeded collections.
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_succeeded()).count()
    }

    /// Number of failed collections.
    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_failed()).count()
    }

    /// Number of skipped collections.
    pub fn skipped(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_skipped()).count()
    }

    /// Failed outcomes, in order.
    pub fn failures(&self) -> impl Iterator<Item = &TransferOutcome> {
        self.outcomes.iter().filter(|o| o.is_failed())
    }

    /// Total per-document failures reported across succeeded collections.
    pub fn document_failures(&self) -> u64 {
        self.outcomes
            .iter()
            .map(|o| match o.status {
                TransferStatus::Succeeded {
                    documents_failed, ..
                } => documents_failed,
                _ => 0,
            })
            .fold(0_u64, u64::saturating_add)
    }

    /// Run-level verdict.
    ///
    /// - Explicit scope: non-empty and no `Failed` entries.
    /// - Whole-database scope: non-empty and every discovered artifact was
    ///   attempted; individual failures are tolerated.
    pub fn is_success(&self) -> bool {
        if self.outcomes.is_empty() {
            return false;
        }
        match self.scope {
            TransferScope::Explicit => self.failed() == 0,
            TransferScope::WholeDatabase { discovered } => {
                self.skipped() == 0 && self.outcomes.len() == discovered
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn succeeded() -> TransferStatus {
        TransferStatus::Succeeded {
            documents_restored: Some(10),
            documents_failed: 0,
            indexes_restored: true,
        }
    }

    fn failed() -> TransferStatus {
        TransferStatus::Failed {
            reason: "exit status 1".to_string(),
        }
    }

    #[test]
    fn test_empty_report_is_not_success() {
        let report = TransferReport::new(TransferOperation::Import, TransferScope::Explicit);
        assert!(!report.is_success());
    }

    #[test]
    fn test_explicit_scope_fails_on_any_failure() {
        let mut report = TransferReport::new(TransferOperation::Import, TransferScope::Explicit);
        report.push(TransferOutcome::new("reg", "users", failed()));
        assert!(!report.is_success());
        assert_eq!(report.failed(), 1);
    }

    #[test]
    fn test_whole_database_tolerates_failures() {
        let mut report = TransferReport::new(
            TransferOperation::Import,
            TransferScope::WholeDatabase { discovered: 2 },
        );
        report.push(TransferOutcome::new("reg", "users", succeeded()));
        report.push(TransferOutcome::new("reg", "orders", failed()));

        assert!(report.is_success());
        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.failures().count(), 1);
    }

    #[test]
    fn test_whole_database_requires_full_attempt() {
        let mut report = TransferReport::new(
            TransferOperation::Import,
            TransferScope::WholeDatabase { discovered: 2 },
        );
        report.push(TransferOutcome::new("reg", "users", succeeded()));
        report.push(TransferOutcome::new(
            "reg",
            "orders",
            TransferStatus::Skipped {
                reason: "cancelled".to_string(),
            },
        ));
        assert!(!report.is_success());
    }

    #[test]
    fn test_document_failures_sum() {
        let mut report = TransferReport::new(TransferOperation::Import, TransferScope::Explicit);
        report.push(TransferOutcome::new(
            "reg",
            "users",
            TransferStatus::Succeeded {
                documents_restored: Some(8),
                documents_failed: 2,
                indexes_restored: true,
            },
        ));
        assert_eq!(report.document_failures(), 2);
        assert!(report.is_success());
    }

    #[test]
    fn test_outcome_serializes_flat_status() {
        let outcome = TransferOutcome::new("reg", "users", failed()).with_target("reg2.users");
        let json = serde_json::to_value(&outcome).unwrap();

        assert_eq!(json["status"], "failed");
        assert_eq!(json["reason"], "exit status 1");
        assert_eq!(json["target_namespace"], "reg2.users");
        assert_eq!(outcome.source_namespace(), "reg.users");
    }
}
