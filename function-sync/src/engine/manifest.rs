//! Manifest types for package membership.
//!
//! A manifest records every relative path that belongs to the deployed
//! package. It is persisted as `.function-sync.<function>.json` in the
//! scratch directory, outside the watched tree.

use crate::archive;
use crate::utils::fs::write_atomic;
use crate::utils::{Result, SyncError};
use serde::{Deserialize, Serialize};
use serde_json::ser::PrettyFormatter;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Ordered list of relative paths, unique by path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct Manifest {
    entries: Vec<String>,
}

impl Manifest {
    /// Build a manifest keeping the first occurrence of each path.
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut seen = HashSet::new();
        let entries = entries
            .into_iter()
            .filter(|entry| seen.insert(entry.clone()))
            .collect();
        Self { entries }
    }

    /// Exact string membership; no normalization.
    pub fn contains(&self, relative_path: &str) -> bool {
        self.entries.iter().any(|entry| entry == relative_path)
    }

    /// Append `relative_path` unless present. Returns true if it was added.
    pub fn insert(&mut self, relative_path: impl Into<String>) -> bool {
        let relative_path = relative_path.into();
        if self.contains(&relative_path) {
            return false;
        }
        self.entries.push(relative_path);
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }
}

impl From<Vec<String>> for Manifest {
    fn from(entries: Vec<String>) -> Self {
        Self::from_entries(entries)
    }
}

impl From<Manifest> for Vec<String> {
    fn from(manifest: Manifest) -> Self {
        manifest.entries
    }
}

/// Durable home of one function's manifest.
#[derive(Debug, Clone)]
pub struct ManifestStore {
    path: PathBuf,
}

impl ManifestStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// List the entries of `archive_path` verbatim and persist them.
    ///
    /// An unreadable archive is an error, never an empty manifest: an empty
    /// manifest would silently classify every local file as unexpected.
    pub fn load(&self, archive_path: &Path) -> Result<Manifest> {
        let manifest = Manifest::from_entries(archive::list_entries(archive_path)?);
        self.persist(&manifest)?;

        debug!(
            "Loaded manifest with {} entries from {}",
            manifest.len(),
            archive_path.display()
        );
        Ok(manifest)
    }

    /// Replace the persisted manifest with `manifest`.
    pub fn persist(&self, manifest: &Manifest) -> Result<()> {
        let mut buf = Vec::new();
        let mut serializer =
            serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
        manifest.serialize(&mut serializer)?;
        buf.push(b'\n');

        write_atomic(&self.path, &buf)?;
        Ok(())
    }

    /// Read a previously persisted manifest, if there is one.
    pub fn open(&self) -> Result<Option<Manifest>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SyncError::Io(e)),
        };

        let manifest: Manifest = serde_json::from_str(&content)?;
        info!(
            "Read persisted manifest {} ({} entries)",
            self.path.display(),
            manifest.len()
        );
        Ok(Some(manifest))
    }
}
