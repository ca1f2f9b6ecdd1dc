//! Table catalog
//!
//! Remembers which index kind each table was created with, plus a little
//! vacuum bookkeeping.
//!
//! ## File Format
//! ```text
//! ┌──────────────┬──────────────────────────────────────┐
//! │ crc32 u32 BE │ bincode(Catalog)                     │
//! └──────────────┴──────────────────────────────────────┘
//! ```
//! Saved to `catalog.bin.tmp` and renamed over `catalog.bin`.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::index::IndexKind;
use crate::vacuum::temp_path;

/// One registered table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableEntry {
    pub name: String,
    pub index: IndexKind,
    /// Seconds since the Unix epoch
    pub created_at: u64,
    pub vacuum_count: u64,
    pub last_vacuum_at: Option<u64>,
}

/// Registry of every table in a data directory
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    tables: BTreeMap<String, TableEntry>,
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl Catalog {
    /// Load the catalog, or start an empty one if the file does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = fs::read(path)?;
        if raw.len() < 4 {
            return Err(StoreError::Catalog(format!(
                "{} is {} bytes, too short for its checksum",
                path.display(),
                raw.len()
            )));
        }

        let mut stored = [0u8; 4];
        stored.copy_from_slice(&raw[..4]);
        let stored = u32::from_be_bytes(stored);
        let computed = crc32fast::hash(&raw[4..]);
        if stored != computed {
            return Err(StoreError::Catalog(format!(
                "{} checksum mismatch: stored {:08x}, computed {:08x}",
                path.display(),
                stored,
                computed
            )));
        }

        let catalog: Catalog = bincode::deserialize(&raw[4..])
            .map_err(|e| StoreError::Catalog(format!("decode {}: {}", path.display(), e)))?;
        debug!(path = %path.display(), tables = catalog.tables.len(), "loaded catalog");
        Ok(catalog)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let payload = bincode::serialize(self)
            .map_err(|e| StoreError::Catalog(format!("encode catalog: {}", e)))?;

        let mut raw = Vec::with_capacity(4 + payload.len());
        raw.extend_from_slice(&crc32fast::hash(&payload).to_be_bytes());
        raw.extend_from_slice(&payload);

        let tmp = temp_path(path);
        fs::write(&tmp, &raw)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&TableEntry> {
        self.tables.get(name)
    }

    /// Register a table, or change the index kind of an existing one
    pub fn register(&mut self, name: &str, index: IndexKind) -> &TableEntry {
        let entry = self
            .tables
            .entry(name.to_string())
            .or_insert_with(|| TableEntry {
                name: name.to_string(),
                index,
                created_at: unix_now(),
                vacuum_count: 0,
                last_vacuum_at: None,
            });
        entry.index = index;
        entry
    }

    pub fn record_vacuum(&mut self, name: &str) {
        if let Some(entry) = self.tables.get_mut(name) {
            entry.vacuum_count += 1;
            entry.last_vacuum_at = Some(unix_now());
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<TableEntry> {
        self.tables.remove(name)
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableEntry> {
        self.tables.values()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
