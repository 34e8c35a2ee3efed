//! Artifact addressing over the export directory tree.
//!
//! The bulk export tool lays collections out as
//! `<root>/<database>/<collection>.bson[.gz]` with an optional sibling
//! metadata descriptor holding index definitions and collection options.
//! This module only resolves and enumerates those paths; it never reads or
//! writes artifact contents.

use crate::error::DocFerryError;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Compression state of an artifact set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    /// Plain BSON
    #[default]
    None,
    /// Gzip-compressed BSON
    Gzip,
}

impl Compression {
    /// Maps a task's compression flag.
    pub fn from_flag(compress: bool) -> Self {
        if compress { Self::Gzip } else { Self::None }
    }

    /// Data file extension without the leading dot.
    pub fn data_extension(self) -> &'static str {
        match self {
            Self::None => "bson",
            Self::Gzip => "bson.gz",
        }
    }

    /// Metadata descriptor suffixes, in lookup order.
    ///
    /// The export tool writes JSON descriptors; the BSON spelling is accepted too.
    pub fn metadata_extensions(self) -> &'static [&'static str] {
        match self {
            Self::None => &["metadata.json", "metadata.bson"],
            Self::Gzip => &["metadata.json.gz", "metadata.bson.gz"],
        }
    }

    /// Whether this is gzip.
    pub fn is_gzip(self) -> bool {
        matches!(self, Self::Gzip)
    }
}

/// One collection's exported data on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportArtifact {
    /// Database directory name
    pub database: String,
    /// Collection name
    pub collection: String,
    /// Data file
    pub data_path: PathBuf,
    /// Metadata descriptor, when present
    pub metadata_path: Option<PathBuf>,
    /// Compression of both files
    pub compression: Compression,
}

impl ExportArtifact {
    /// `database.collection`
    pub fn namespace(&self) -> String {
        format!("{}.{}", self.database, self.collection)
    }

    /// Index restoration needs the metadata descriptor.
    pub fn has_metadata(&self) -> bool {
        self.metadata_path.is_some()
    }
}

/// Resolves artifact paths under a root directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Creates a store rooted at `root`. Nothing is touched on disk.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates the root directory if it does not exist yet.
    ///
    /// The export tool fails hard on a missing output path, so this runs
    /// before every export.
    pub async fn ensure_root(&self) -> Result<()> {
        if tokio::fs::metadata(&self.root).await.is_ok_and(|m| m.is_dir()) {
            return Ok(());
        }

        tracing::debug!("Creating artifact root {}", self.root.display());
        tokio::fs::create_dir_all(&self.root).await.map_err(|e| {
            DocFerryError::io(
                format!("Failed to create artifact root {}", self.root.display()),
                e,
            )
        })
    }

    /// `<root>/<database>`
    pub fn database_dir(&self, database: &str) -> PathBuf {
        self.root.join(database)
    }

    /// Expected data file for a collection, whether or not it exists.
    pub fn data_path(&self, database: &str, collection: &str, compression: Compression) -> PathBuf {
        self.database_dir(database)
            .join(format!("{}.{}", collection, compression.data_extension()))
    }

    /// Existing metadata descriptor for a collection, if any.
    pub fn metadata_path(
        &self,
        database: &str,
        collection: &str,
        compression: Compression,
    ) -> Option<PathBuf> {
        compression
            .metadata_extensions()
            .iter()
            .map(|ext| {
                self.database_dir(database)
                    .join(format!("{}.{}", collection, ext))
            })
            .find(|path| path.is_file())
    }

    /// Resolves one collection's artifact.
    ///
    /// # Errors
    /// Returns `ArtifactNotFound` when the data file does not exist.
    pub fn locate(
        &self,
        database: &str,
        collection: &str,
        compression: Compression,
    ) -> Result<ExportArtifact> {
        let data_path = self.data_path(database, collection, compression);
        if !data_path.is_file() {
            return Err(DocFerryError::artifact_not_found(&data_path));
        }

        Ok(ExportArtifact {
            database: database.to_string(),
            collection: collection.to_string(),
            metadata_path: self.metadata_path(database, collection, compression),
            data_path,
            compression,
        })
    }

    /// Enumerates every `(database, collection)` artifact under the root.
    ///
    /// # Errors
    /// Returns `ArtifactNotFound` if the scan finds nothing, since importing
    /// an empty set would silently succeed.
    pub fn discover(&self, compression: Compression) -> Result<Vec<ExportArtifact>> {
        let entries = read_dir_sorted(&self.root)?;

        let mut artifacts = Vec::new();
        for entry in entries {
            if !entry.is_dir() {
                continue;
            }
            let Some(database) = entry.file_name().and_then(|n| n.to_str()) else {
                tracing::warn!("Skipping non UTF-8 directory {}", entry.display());
                continue;
            };
            artifacts.extend(self.scan_database(database, compression)?);
        }

        if artifacts.is_empty() {
            return Err(DocFerryError::artifact_not_found(self.root.join(format!(
                "*/*.{}",
                compression.data_extension()
            ))));
        }

        tracing::debug!(
            "Discovered {} artifacts under {}",
            artifacts.len(),
            self.root.display()
        );
        Ok(artifacts)
    }

    /// Enumerates the artifacts of one database.
    ///
    /// # Errors
    /// Returns `ArtifactNotFound` if the database directory is missing or holds
    /// no data files.
    pub fn discover_database(
        &self,
        database: &str,
        compression: Compression,
    ) -> Result<Vec<ExportArtifact>> {
        let artifacts = self.scan_database(database, compression)?;
        if artifacts.is_empty() {
            return Err(DocFerryError::artifact_not_found(
                self.database_dir(database)
                    .join(format!("*.{}", compression.data_extension())),
            ));
        }
        Ok(artifacts)
    }

    fn scan_database(&self, database: &str, compression: Compression) -> Result<Vec<ExportArtifact>> {
        let dir = self.database_dir(database);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let suffix = format!(".{}", compression.data_extension());
        let mut artifacts = Vec::new();

        for path in read_dir_sorted(&dir)? {
            if !path.is_file() {
                continue;
            }
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(collection) = file_name.strip_suffix(&suffix) else {
                continue;
            };
            if collection.is_empty() || collection.starts_with("system.") {
                tracing::trace!("Skipping {}", path.display());
                continue;
            }

            artifacts.push(ExportArtifact {
                database: database.to_string(),
                collection: collection.to_string(),
                metadata_path: self.metadata_path(database, collection, compression),
                data_path: path.clone(),
                compression,
            });
        }

        Ok(artifacts)
    }
}

fn read_dir_sorted(dir: &Path) -> Result<Vec<PathBuf>> {
    let read = std::fs::read_dir(dir).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            DocFerryError::artifact_not_found(dir)
        } else {
            DocFerryError::io(format!("Failed to read {}", dir.display()), e)
        }
    })?;

    let mut paths = Vec::new();
    for entry in read {
        let entry =
            entry.map_err(|e| DocFerryError::io(format!("Failed to read {}", dir.display()), e))?;
        paths.push(entry.path());
    }
    paths.sort();
    Ok(paths)
}
