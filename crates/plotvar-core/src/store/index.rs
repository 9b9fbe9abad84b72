//! The partition index: one JSON file mapping identifiers to disk.
//!
//! Kept deliberately human-inspectable so a store directory can be
//! audited with a pager. Three groups mirror the registry's identifier
//! kinds: bare series, container types, and `type.component` entries.

use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use snafu::ResultExt;

use crate::store::{fs, IndexCodecSnafu, StoreError, StoreResult};

/// Where an identifier's data lives, relative to the store root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "path", rename_all = "snake_case")]
pub enum IndexTarget {
    /// A single partition file.
    File(PathBuf),
    /// A directory of partition files, one per calendar block.
    Dir(PathBuf),
}

/// In-memory form of the on-disk `index.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartitionIndex {
    /// Bare identifiers: stashed series with undotted names.
    pub bare: BTreeMap<String, IndexTarget>,
    /// Container types flushed as a whole.
    pub types: BTreeMap<String, IndexTarget>,
    /// Dotted `type.component` identifiers.
    pub components: BTreeMap<String, IndexTarget>,
}

impl PartitionIndex {
    /// File name of the index inside a store root.
    pub const FILE_NAME: &'static str = "index.json";

    /// Record a container type's partition location.
    pub fn insert_type(&mut self, ident: impl Into<String>, target: IndexTarget) {
        self.types.insert(ident.into(), target);
    }

    /// Record a dotted `type.component` identifier's location.
    pub fn insert_component(&mut self, ident: impl Into<String>, target: IndexTarget) {
        self.components.insert(ident.into(), target);
    }

    /// Record a bare series identifier's location.
    pub fn insert_bare(&mut self, ident: impl Into<String>, target: IndexTarget) {
        self.bare.insert(ident.into(), target);
    }

    /// Look an identifier up across all three groups.
    pub fn get(&self, ident: &str) -> Option<&IndexTarget> {
        self.types
            .get(ident)
            .or_else(|| self.components.get(ident))
            .or_else(|| self.bare.get(ident))
    }

    /// Whether a container type is indexed.
    pub fn has_type(&self, ident: &str) -> bool {
        self.types.contains_key(ident)
    }

    /// Total number of indexed identifiers.
    pub fn len(&self) -> usize {
        self.bare.len() + self.types.len() + self.components.len()
    }

    /// Whether nothing is indexed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read an index file; a missing file is an empty index.
    pub fn read_from(path: &Path) -> StoreResult<Self> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(StoreError::NotFound { .. }) => return Ok(Self::default()),
            Err(err) => return Err(err),
        };
        serde_json::from_str(&text).context(IndexCodecSnafu {
            path: path.display().to_string(),
        })
    }

    /// Write the index atomically as pretty-printed JSON.
    pub fn write_to(&self, path: &Path) -> StoreResult<()> {
        let text = serde_json::to_string_pretty(self).context(IndexCodecSnafu {
            path: path.display().to_string(),
        })?;
        fs::write_atomic(path, text.as_bytes())
    }
}
