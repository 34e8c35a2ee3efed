//! Per-invocation transfer tasks.

use crate::error::DocFerryError;
use crate::Result;
use serde::{Deserialize, Serialize};

/// Which collections of a database a task covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionSelector {
    /// Every collection in the database
    All,
    /// A single named collection
    Named(String),
}

impl CollectionSelector {
    /// Parses CLI-style input where the literal `all` selects everything.
    pub fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("all") {
            Self::All
        } else {
            Self::Named(value.to_string())
        }
    }

    /// The collection name for a named selector.
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::All => None,
            Self::Named(name) => Some(name),
        }
    }
}

impl std::fmt::Display for CollectionSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Named(name) => write!(f, "{}", name),
        }
    }
}

/// One export or import request, consumed by a single coordinator call.
///
/// # Example
/// ```rust
/// use docferry_core::task::{CollectionSelector, CollectionTask};
///
/// let task = CollectionTask::new("reg", CollectionSelector::Named("users".into()))
///     .with_target_collection("users_v2")
///     .with_parallelism(4)
///     .with_compression(true);
///
/// assert_eq!(task.target_database(), "reg");
/// assert_eq!(task.target_collection_for("users"), "users_v2");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionTask {
    /// Source database; `None` on import means every database under the artifact root
    pub database: Option<String>,
    /// Source collection selector
    pub source: CollectionSelector,
    /// Target database, defaults to the source database
    pub target_database: Option<String>,
    /// Target collection, only honoured for a named source
    pub target_collection: Option<String>,
    /// Worker count handed to the bulk tools; `None` keeps the tool default
    pub parallelism: Option<u32>,
    /// Gzip artifacts
    pub compress: bool,
    /// Restore index definitions from metadata descriptors
    pub restore_indexes: bool,
}

impl CollectionTask {
    /// Creates a task for one database.
    pub fn new(database: impl Into<String>, source: CollectionSelector) -> Self {
        Self {
            database: Some(database.into()),
            source,
            target_database: None,
            target_collection: None,
            parallelism: None,
            compress: false,
            restore_indexes: true,
        }
    }

    /// Creates an import task over every database found in the artifact root.
    pub fn every_database() -> Self {
        Self {
            database: None,
            source: CollectionSelector::All,
            target_database: None,
            target_collection: None,
            parallelism: None,
            compress: false,
            restore_indexes: true,
        }
    }

    /// Sets the target database.
    pub fn with_target_database(mut self, database: impl Into<String>) -> Self {
        self.target_database = Some(database.into());
        self
    }

    /// Sets the target collection name.
    pub fn with_target_collection(mut self, collection: impl Into<String>) -> Self {
        self.target_collection = Some(collection.into());
        self
    }

    /// Sets the parallelism hint.
    pub fn with_parallelism(mut self, workers: u32) -> Self {
        self.parallelism = Some(workers);
        self
    }

    /// Enables or disables gzip artifacts.
    pub fn with_compression(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    /// Enables or disables index restoration.
    pub fn with_index_restore(mut self, restore_indexes: bool) -> Self {
        self.restore_indexes = restore_indexes;
        self
    }

    /// Target database name; falls back to the source database, then to `fallback`.
    pub fn target_database_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.target_database
            .as_deref()
            .or(self.database.as_deref())
            .unwrap_or(fallback)
    }

    /// Target database name for single-database tasks.
    pub fn target_database(&self) -> &str {
        self.target_database_or("")
    }

    /// Target collection for a given source collection.
    pub fn target_collection_for<'a>(&'a self, source: &'a str) -> &'a str {
        match (&self.source, &self.target_collection) {
            (CollectionSelector::Named(_), Some(target)) => target,
            _ => source,
        }
    }

    /// Checks names and hints before anything touches the filesystem or spawns a tool.
    ///
    /// # Errors
    /// Returns `Validation` for empty or unsafe names, a target database
    /// without a source database, and a zero parallelism hint.
    pub fn validate(&self, require_database: bool) -> Result<()> {
        match &self.database {
            Some(database) => validate_database_name(database)?,
            None if require_database => {
                return Err(DocFerryError::validation("a source database is required"));
            }
            None => {}
        }

        if let CollectionSelector::Named(name) = &self.source {
            validate_collection_name(name)?;
        }
        if let Some(database) = &self.target_database {
            validate_database_name(database)?;
            if self.database.is_none() {
                return Err(DocFerryError::validation(format!(
                    "target database '{}' requires a source database; \
                     collections from several databases would collide in one namespace",
                    database
                )));
            }
        }
        if let Some(collection) = &self.target_collection {
            validate_collection_name(collection)?;
        }
        if self.parallelism == Some(0) {
            return Err(DocFerryError::validation(
                "parallelism must be greater than 0",
            ));
        }
        Ok(())
    }
}

/// Database names become directory names, so path separators and the
/// characters the server forbids are rejected.
pub fn validate_database_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(DocFerryError::validation("database name cannot be empty"));
    }
    if name == "." || name == ".." {
        return Err(DocFerryError::validation(format!(
            "'{}' is not a valid database name",
            name
        )));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| matches!(*c, '/' | '\\' | '.' | ' ' | '"' | '$' | '\0'))
    {
        return Err(DocFerryError::validation(format!(
            "database name '{}' contains forbidden character {:?}",
            name, bad
        )));
    }
    Ok(())
}

/// Collection names become file names, so path separators and `$` are rejected.
pub fn validate_collection_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(DocFerryError::validation("collection name cannot be empty"));
    }
    if name.starts_with('.') || name.starts_with("system.") {
        return Err(DocFerryError::validation(format!(
            "collection name '{}' is reserved",
            name
        )));
    }
    if let Some(bad) = name.chars().find(|c| matches!(*c, '/' | '\\' | '$' | '\0')) {
        return Err(DocFerryError::validation(format!(
            "collection name '{}' contains forbidden character {:?}",
            name, bad
        )));
    }
    Ok(())
}
