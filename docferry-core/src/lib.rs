//! Core library for docferry.
//!
//! Moves document collections between a native document store and a
//! compatibility-layer backend that speaks the same wire protocol over a
//! relational substrate, and runs group-and-count aggregations against either.
//!
//! # Security Guarantees
//! - Passwords live in zeroizing containers and are percent-encoded before
//!   they reach a connection URI
//! - Only redacted URIs (`user:REDACTED@host`) are logged or stored in errors
//! - Bulk tool output is scrubbed before it is kept in an outcome
//!
//! # Architecture
//! - [`profile`] assembles connection URIs from discrete credential fields
//! - [`export`] and [`import`] coordinate the external bulk tools through the
//!   [`tools::ToolRunner`] trait, staging data in an [`artifacts::ArtifactStore`]
//! - [`import`] folds per-collection results into a [`outcome::TransferReport`]
//!   instead of failing the batch
//! - [`query`] dispatches aggregations native-first with a substrate SQL fallback

pub mod artifacts;
pub mod error;
pub mod export;
pub mod import;
pub mod logging;
pub mod outcome;
pub mod pipeline;
pub mod profile;
pub mod query;
pub mod security;
pub mod task;
pub mod tools;

// Re-export commonly used types
pub use artifacts::{ArtifactStore, Compression, ExportArtifact};
pub use error::{DocFerryError, Result};
pub use export::{ExportCoordinator, ExportSummary};
pub use import::ImportCoordinator;
pub use outcome::{TransferOperation, TransferOutcome, TransferReport, TransferScope, TransferStatus};
pub use pipeline::{MigrationPipeline, MigrationSummary};
pub use profile::{BackendKind, ConnectionProfile, ConnectionProfileBuilder, TlsMode};
pub use query::{
    AggregationPath, AggregationPlan, AggregationResult, BackendError, GroupCount, GroupKey,
    QueryAdapter, QueryBackend,
};
pub use security::Credentials;
pub use task::{CollectionSelector, CollectionTask};
pub use tools::{BulkTool, ProcessToolRunner, ToolPaths, ToolRunner};

#[cfg(feature = "mongodb")]
pub use query::MongoQueryBackend;
