//! [`QueryBackend`] over the MongoDB driver.
//!
//! Works against both backend kinds: the compatibility layer accepts the same
//! wire protocol and exposes its pass-through channel as a database-level
//! `$sql` aggregation stage.

use super::backend::{BackendError, QueryBackend};
use crate::Result;
use crate::error::DocFerryError;
use crate::profile::ConnectionProfile;
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{self, Bson, Document, doc};
use mongodb::error::ErrorKind;
use mongodb::{Client, Database};
use serde_json::Value;

/// Server error codes meaning "this engine cannot run that pipeline".
///
/// 59 CommandNotFound, 115 CommandNotSupported, 168 InvalidPipelineOperator,
/// 40324 unrecognized pipeline stage, 31082 unsupported expression.
const CAPABILITY_ERROR_CODES: &[i32] = &[59, 115, 168, 40324, 31082];

/// Query backend bound to one database of one connection profile.
#[derive(Debug, Clone)]
pub struct MongoQueryBackend {
    database: Database,
    profile_key: String,
}

impl MongoQueryBackend {
    /// Connects using the profile's full connection URI.
    ///
    /// # Errors
    /// - `Configuration` if the profile names no database
    /// - `Connection` if the driver rejects the URI
    pub async fn connect(profile: &ConnectionProfile) -> Result<Self> {
        let database = profile.database().ok_or_else(|| {
            DocFerryError::configuration("A database (schema) is required for queries")
        })?;

        let uri = profile.connection_uri();
        let client = Client::with_uri_str(uri.as_str()).await.map_err(|e| {
            DocFerryError::connection_failed(
                format!("Failed to create MongoDB client for {}", profile.redacted_uri()),
                BackendError::Connection(crate::error::scrub_secrets(&e.to_string())),
            )
        })?;

        Ok(Self::from_client(&client, database, profile.capability_key()))
    }

    /// Wraps an existing client.
    pub fn from_client(client: &Client, database: &str, profile_key: impl Into<String>) -> Self {
        Self {
            database: client.database(database),
            profile_key: profile_key.into(),
        }
    }
}

fn classify(error: &mongodb::error::Error) -> BackendError {
    let message = crate::error::scrub_secrets(&error.to_string());
    match *error.kind {
        ErrorKind::Command(ref command) if CAPABILITY_ERROR_CODES.contains(&command.code) => {
            BackendError::Unsupported(message)
        }
        ErrorKind::Command(_) => BackendError::Execution(message),
        _ => BackendError::Connection(message),
    }
}

fn to_stages(pipeline: Vec<Value>) -> std::result::Result<Vec<Document>, BackendError> {
    pipeline
        .into_iter()
        .map(|stage| {
            bson::to_document(&stage)
                .map_err(|e| BackendError::Execution(format!("invalid pipeline stage: {}", e)))
        })
        .collect()
}

fn to_json(documents: Vec<Document>) -> Vec<Value> {
    documents
        .into_iter()
        .map(|document| Bson::Document(document).into_relaxed_extjson())
        .collect()
}

#[async_trait]
impl QueryBackend for MongoQueryBackend {
    fn profile_key(&self) -> String {
        self.profile_key.clone()
    }

    async fn run_pipeline(
        &self,
        collection: &str,
        pipeline: Vec<Value>,
    ) -> std::result::Result<Vec<Value>, BackendError> {
        let stages = to_stages(pipeline)?;
        let cursor = self
            .database
            .collection::<Document>(collection)
            .aggregate(stages)
            .await
            .map_err(|e| classify(&e))?;
        let documents: Vec<Document> = cursor.try_collect().await.map_err(|e| classify(&e))?;
        Ok(to_json(documents))
    }

    async fn run_passthrough(
        &self,
        statement: &str,
    ) -> std::result::Result<Vec<Value>, BackendError> {
        let cursor = self
            .database
            .aggregate(vec![doc! { "$sql": statement }])
            .await
            .map_err(|e| classify(&e))?;
        let documents: Vec<Document> = cursor.try_collect().await.map_err(|e| classify(&e))?;
        Ok(to_json(documents))
    }
}
