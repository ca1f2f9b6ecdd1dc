//! Index Module
//!
//! Disk-resident maps from an integer key to a record offset.
//!
//! ## Implementations
//! ```text
//! ┌──────────────────┬───────────────┬───────────────────────────────┐
//! │ Kind             │ File suffix   │ Capabilities                  │
//! ├──────────────────┼───────────────┼───────────────────────────────┤
//! │ B+ tree          │ .dat.idx      │ point lookup, ordered ranges  │
//! │ Extensible hash  │ .dat.hash     │ point lookup only             │
//! └──────────────────┴───────────────┴───────────────────────────────┘
//! ```
//!
//! Both are the single source of truth for their mapping: nothing is cached
//! in memory beyond the file header, and every operation reads the pages or
//! buckets it needs under the index's one lock. Neither merges pages or
//! buckets on delete; underfull space is reclaimed only by vacuum.

pub mod btree;
pub mod hash;

use std::fmt;
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::IndexSettings;
use crate::error::{Result, StoreError};

pub use btree::{BPlusTree, Cursor, TreeStats};
pub use hash::{ExtensibleHash, HashStats};

// =============================================================================
// Index Kind
// =============================================================================

/// Which index structure backs a table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexKind {
    BPlusTree,
    ExtensibleHash,
}

impl IndexKind {
    /// Suffix appended to the data file name
    pub fn extension(&self) -> &'static str {
        match self {
            IndexKind::BPlusTree => "idx",
            IndexKind::ExtensibleHash => "hash",
        }
    }

    /// `<data file>.<extension>`, e.g. `users.dat.idx`
    pub fn index_path(&self, data_path: &Path) -> PathBuf {
        let mut name = data_path.as_os_str().to_os_string();
        name.push(".");
        name.push(self.extension());
        PathBuf::from(name)
    }

    pub fn supports_ordered_scan(&self) -> bool {
        matches!(self, IndexKind::BPlusTree)
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexKind::BPlusTree => write!(f, "btree"),
            IndexKind::ExtensibleHash => write!(f, "hash"),
        }
    }
}

impl FromStr for IndexKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "btree" | "bplustree" | "b+tree" | "idx" => Ok(IndexKind::BPlusTree),
            "hash" | "extensible-hash" | "exthash" => Ok(IndexKind::ExtensibleHash),
            other => Err(StoreError::InvalidArgument(format!(
                "unknown index kind '{}', expected 'btree' or 'hash'",
                other
            ))),
        }
    }
}

// =============================================================================
// Index Entry & Trait
// =============================================================================

/// One `(key, offset)` mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IndexEntry {
    pub key: i64,
    pub offset: u64,
}

/// Common contract of the on-disk indexes
///
/// `insert` never overwrites: it returns `false` and leaves the index
/// unchanged when the key is already present. `update` is the in-place
/// overwrite and returns `false` when the key is absent.
pub trait Index: Send + Sync {
    fn kind(&self) -> IndexKind;

    fn path(&self) -> &Path;

    fn get(&self, key: i64) -> Result<Option<u64>>;

    fn insert(&self, key: i64, offset: u64) -> Result<bool>;

    fn update(&self, key: i64, offset: u64) -> Result<bool>;

    /// Update if present, insert otherwise
    fn upsert(&self, key: i64, offset: u64) -> Result<()> {
        if !self.update(key, offset)? {
            self.insert(key, offset)?;
        }
        Ok(())
    }

    fn remove(&self, key: i64) -> Result<bool>;

    /// Number of keys, as tracked in the header
    fn len(&self) -> Result<u64>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Drop every entry, keeping the file and its settings
    fn clear(&self) -> Result<()>;

    /// Entries within the bounds in key order, or `None` if the index is unordered
    fn range(&self, lower: Bound<i64>, upper: Bound<i64>) -> Result<Option<Vec<IndexEntry>>>;

    /// Record store generation this index was built from
    fn source_generation(&self) -> Result<u32>;

    fn set_source_generation(&self, generation: u32) -> Result<()>;

    fn close(&self) -> Result<()>;
}

/// Open (or create) the index of the given kind at `path`
pub fn open_index(
    kind: IndexKind,
    path: &Path,
    settings: IndexSettings,
) -> Result<Box<dyn Index>> {
    match kind {
        IndexKind::BPlusTree => Ok(Box::new(BPlusTree::open(path, settings)?)),
        IndexKind::ExtensibleHash => Ok(Box::new(ExtensibleHash::open(path, settings)?)),
    }
}
