//! Configuration for tombstore
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::error::{Result, StoreError};
use crate::index::IndexKind;

/// Smallest B+ tree order that still splits into two non-empty halves
pub const MIN_BTREE_ORDER: usize = 2;

/// Main configuration for a tombstore instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all data files
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── catalog.bin           (table registry)
    ///     ├── {table}.dat           (record store)
    ///     └── {table}.dat.idx|hash  (index file)
    pub data_dir: PathBuf,

    /// Format version written into every file header
    pub format_version: u8,

    // -------------------------------------------------------------------------
    // Index Configuration
    // -------------------------------------------------------------------------
    /// Index kind registered for tables that are opened for the first time
    pub default_index: IndexKind,

    /// Maximum keys per B+ tree page
    pub btree_order: usize,

    /// Maximum (key, offset) pairs per extensible hash bucket
    pub hash_bucket_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./tombstore_data"),
            format_version: 1,
            default_index: IndexKind::BPlusTree,
            btree_order: 4,
            hash_bucket_capacity: 8,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject values the storage structures cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.format_version == 0 {
            return Err(StoreError::Config(
                "format_version must be non-zero".to_string(),
            ));
        }
        if self.btree_order < MIN_BTREE_ORDER {
            return Err(StoreError::Config(format!(
                "btree_order must be at least {}, got {}",
                MIN_BTREE_ORDER, self.btree_order
            )));
        }
        if self.hash_bucket_capacity == 0 {
            return Err(StoreError::Config(
                "hash_bucket_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// The slice of the config that index constructors need
    pub fn index_settings(&self) -> IndexSettings {
        IndexSettings {
            format_version: self.format_version,
            btree_order: self.btree_order,
            hash_bucket_capacity: self.hash_bucket_capacity,
        }
    }
}

/// Per-index settings, derived from [`Config`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexSettings {
    pub format_version: u8,
    pub btree_order: usize,
    pub hash_bucket_capacity: usize,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Config::default().index_settings()
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all storage)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the file format version
    pub fn format_version(mut self, version: u8) -> Self {
        self.config.format_version = version;
        self
    }

    /// Set the index kind used for newly registered tables
    pub fn default_index(mut self, kind: IndexKind) -> Self {
        self.config.default_index = kind;
        self
    }

    /// Set the B+ tree order
    pub fn btree_order(mut self, order: usize) -> Self {
        self.config.btree_order = order;
        self
    }

    /// Set the extensible hash bucket capacity
    pub fn hash_bucket_capacity(mut self, capacity: usize) -> Self {
        self.config.hash_bucket_capacity = capacity;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
