//! Group-and-count aggregation across both backend kinds.
//!
//! [`QueryAdapter::aggregate`] first submits the plan as a native pipeline.
//! When the backend signals that it cannot run it, the same plan is rendered
//! as a substrate SQL statement and sent through the pass-through channel.
//! Both paths end in the same normalization, so callers get one ordering
//! regardless of which engine answered.
//!
//! ```text
//! NativeAttempt ──ok──────────────────────────────▶ Native
//!      │ Unsupported / Execution
//!      ▼
//! SubstrateFallback ──ok──▶ SubstrateFallback
//!      │ error
//!      ▼
//! AggregationUnavailable
//! ```

mod backend;
#[cfg(feature = "mongodb")]
mod mongo;
pub mod native;
pub mod substrate;

pub use backend::{BackendError, QueryBackend};
#[cfg(feature = "mongodb")]
pub use mongo::MongoQueryBackend;

use crate::Result;
use crate::error::DocFerryError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::RwLock;

/// How documents are grouped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "path", rename_all = "snake_case")]
pub enum GroupKey {
    /// The value of a (possibly dotted) field path
    Field(String),
    /// The part after `@` of an email address field
    EmailDomain(String),
}

impl GroupKey {
    /// Field path the key reads from.
    pub fn path(&self) -> &str {
        match self {
            GroupKey::Field(path) | GroupKey::EmailDomain(path) => path,
        }
    }
}

/// Backend-agnostic "group by key, count, sort by count" request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationPlan {
    /// Collection to aggregate
    pub collection: String,
    /// Grouping key
    pub key: GroupKey,
    /// Maximum number of groups returned
    pub limit: Option<u32>,
}

impl AggregationPlan {
    /// Creates an unlimited plan.
    pub fn new(collection: impl Into<String>, key: GroupKey) -> Self {
        Self {
            collection: collection.into(),
            key,
            limit: None,
        }
    }

    /// Keeps only the top `limit` groups.
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Checks that the plan can be rendered safely into both realizations.
    ///
    /// # Errors
    /// Returns `Validation` for an unusable collection name, a field path
    /// outside `[A-Za-z0-9_]` segments joined by dots, or a zero limit.
    pub fn validate(&self) -> Result<()> {
        crate::task::validate_collection_name(&self.collection)?;
        if self.collection.contains('"') {
            return Err(DocFerryError::validation(format!(
                "Collection name '{}' cannot be used in a substrate query",
                self.collection
            )));
        }

        let path = self.key.path();
        let valid_path = !path.is_empty()
            && path.split('.').all(|segment| {
                !segment.is_empty()
                    && segment
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '_')
            });
        if !valid_path {
            return Err(DocFerryError::validation(format!(
                "Invalid group key path '{}'",
                path
            )));
        }

        if self.limit == Some(0) {
            return Err(DocFerryError::validation("Limit must be greater than zero"));
        }
        Ok(())
    }
}

/// One group in an aggregation result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupCount {
    /// Group key value
    #[serde(rename = "groupKey")]
    pub group_key: String,
    /// Documents in the group
    pub count: u64,
}

/// Which engine produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationPath {
    /// The native pipeline ran
    Native,
    /// The substrate statement ran after the native pipeline was rejected
    SubstrateFallback,
}

/// A result row that could not be turned into a [`GroupCount`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowError {
    /// Zero-based position in the backend's row list
    pub index: usize,
    /// Why the row was dropped
    pub reason: String,
}

impl RowError {
    /// Creates a row error.
    pub fn new(index: usize, reason: impl Into<String>) -> Self {
        Self {
            index,
            reason: reason.into(),
        }
    }
}

/// Normalized aggregation output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationResult {
    /// Groups sorted by count descending, ties by key ascending
    pub groups: Vec<GroupCount>,
    /// Engine that answered
    pub path: AggregationPath,
    /// Rows dropped because they could not be parsed
    pub dropped_rows: Vec<RowError>,
}

/// Reads a non-negative integer count from JSON or relaxed extended JSON.
pub(crate) fn count_value(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0 && f.fract() == 0.0).map(|f| f as u64)),
        Value::String(s) => s.parse().ok(),
        Value::Object(map) => map
            .get("$numberLong")
            .or_else(|| map.get("$numberInt"))
            .and_then(count_value),
        _ => None,
    }
}

/// Sorts by count descending then key ascending and applies the limit.
pub fn normalize(mut groups: Vec<GroupCount>, limit: Option<u32>) -> Vec<GroupCount> {
    groups.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.group_key.cmp(&b.group_key))
    });
    if let Some(limit) = limit {
        groups.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
    }
    groups
}

fn collect_rows(
    plan: &AggregationPlan,
    rows: &[Value],
    parse: fn(usize, &Value) -> std::result::Result<GroupCount, RowError>,
    path: AggregationPath,
) -> AggregationResult {
    let mut groups = Vec::with_capacity(rows.len());
    let mut dropped_rows = Vec::new();
    for (index, row) in rows.iter().enumerate() {
        match parse(index, row) {
            Ok(group) => groups.push(group),
            Err(error) => {
                tracing::warn!(
                    "Dropping aggregation row {} from {}: {}",
                    error.index,
                    plan.collection,
                    error.reason
                );
                dropped_rows.push(error);
            }
        }
    }

    AggregationResult {
        groups: normalize(groups, plan.limit),
        path,
        dropped_rows,
    }
}

/// Runs aggregation plans with native-first, substrate-fallback dispatch.
///
/// Stateless by default. [`QueryAdapter::with_capability_memo`] remembers
/// profiles whose native attempt was rejected for capability reasons and sends
/// later calls for them straight to the substrate query.
#[derive(Debug, Default)]
pub struct QueryAdapter {
    memo: Option<RwLock<HashSet<String>>>,
}

impl QueryAdapter {
    /// Adapter without memoization.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adapter that memoizes capability rejections per profile key.
    pub fn with_capability_memo() -> Self {
        Self {
            memo: Some(RwLock::new(HashSet::new())),
        }
    }

    /// Whether the native pipeline is known to be rejected for `profile_key`.
    pub fn native_known_unsupported(&self, profile_key: &str) -> bool {
        let Some(memo) = &self.memo else {
            return false;
        };
        match memo.read() {
            Ok(keys) => keys.contains(profile_key),
            Err(poisoned) => poisoned.into_inner().contains(profile_key),
        }
    }

    fn remember_unsupported(&self, profile_key: String) {
        if let Some(memo) = &self.memo {
            let mut keys = match memo.write() {
                Ok(keys) => keys,
                Err(poisoned) => poisoned.into_inner(),
            };
            keys.insert(profile_key);
        }
    }

    /// Runs `plan` against `backend`.
    ///
    /// # Errors
    /// - `Validation` for a plan that cannot be rendered safely
    /// - `Connection` when the native attempt fails for non-capability reasons
    /// - `AggregationUnavailable` when the fallback statement fails as well
    pub async fn aggregate<B>(&self, backend: &B, plan: &AggregationPlan) -> Result<AggregationResult>
    where
        B: QueryBackend + ?Sized,
    {
        plan.validate()?;
        let profile_key = backend.profile_key();

        let native_error = if self.native_known_unsupported(&profile_key) {
            tracing::debug!("Skipping native pipeline for {}", profile_key);
            "native pipeline previously rejected by this backend".to_string()
        } else {
            match backend.run_pipeline(&plan.collection, native::render(plan)).await {
                Ok(rows) => {
                    return Ok(collect_rows(plan, &rows, native::parse_row, AggregationPath::Native));
                }
                Err(error) if error.is_capability() => {
                    tracing::info!(
                        "Native pipeline on {} rejected ({}); falling back to substrate query",
                        plan.collection,
                        error
                    );
                    self.remember_unsupported(profile_key);
                    error.to_string()
                }
                Err(error) => {
                    return Err(DocFerryError::connection_failed(
                        format!("Aggregation on '{}'", plan.collection),
                        error,
                    ));
                }
            }
        };

        let statement = substrate::render(plan);
        tracing::debug!("Substrate statement: {}", statement);

        match backend.run_passthrough(&statement).await {
            Ok(rows) => Ok(collect_rows(
                plan,
                &rows,
                substrate::parse_row,
                AggregationPath::SubstrateFallback,
            )),
            Err(error) => {
                let error = DocFerryError::aggregation_unavailable(native_error, error.to_string());
                tracing::error!("{}", error);
                Err(error)
            }
        }
    }
}
