//! Engine Module
//!
//! Owns a data directory and hands out typed tables.
//!
//! ## Responsibilities
//! - Create the data directory and settle vacuum temp files on startup
//! - Persist the catalog of tables and their index kinds
//! - Open tables with the index kind the catalog remembers
//! - Switch a table's index kind on request, rebuilding the new index
//!
//! ## Directory Layout
//! ```text
//! {data_dir}/
//!   ├── catalog.bin
//!   ├── pets.dat
//!   ├── pets.dat.idx      (B+ tree)
//!   ├── users.dat
//!   └── users.dat.hash    (extensible hash)
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::catalog::{Catalog, TableEntry};
use crate::config::Config;
use crate::entity::Entity;
use crate::error::{Result, StoreError};
use crate::index::IndexKind;
use crate::table::Table;
use crate::vacuum::{self, VacuumReport};

/// Entry point for a data directory
pub struct Engine {
    /// Engine configuration
    config: Config,

    /// Table registry, saved after every change
    catalog: Mutex<Catalog>,
}

impl Engine {
    // =========================================================================
    // Internal Path Constants
    // =========================================================================
    const CATALOG_FILENAME: &'static str = "catalog.bin";
    const DATA_EXTENSION: &'static str = "dat";

    /// Open or create an engine with the given config
    ///
    /// On startup:
    /// 1. Validate the config
    /// 2. Create the data directory if needed
    /// 3. Settle temp files left by interrupted vacuums
    /// 4. Load the catalog
    pub fn open(config: Config) -> Result<Self> {
        // Step 1: Reject unusable settings early
        config.validate()?;

        // Step 2: Create data directory if it doesn't exist
        fs::create_dir_all(&config.data_dir)?;

        // Step 3: A crash mid-vacuum can leave *.tmp files behind
        let settled = Self::settle_temp_files(&config.data_dir)?;

        // Step 4: Load the table registry
        let catalog = Catalog::load(&config.data_dir.join(Self::CATALOG_FILENAME))?;

        info!(
            data_dir = %config.data_dir.display(),
            tables = catalog.len(),
            settled,
            "engine opened"
        );

        Ok(Self {
            config,
            catalog: Mutex::new(catalog),
        })
    }

    /// Open with default settings rooted at `path`
    pub fn open_path(path: impl Into<PathBuf>) -> Result<Self> {
        Self::open(Config::builder().data_dir(path).build())
    }

    fn settle_temp_files(dir: &Path) -> Result<usize> {
        let mut settled = 0;
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if !path.is_file() || path.extension().map_or(true, |ext| ext != "tmp") {
                continue;
            }
            // `<target>.tmp` -> `<target>`
            let target = path.with_extension("");
            if vacuum::recover_temp_file(&target)? {
                settled += 1;
            }
        }
        Ok(settled)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    fn catalog_path(&self) -> PathBuf {
        self.config.data_dir.join(Self::CATALOG_FILENAME)
    }

    /// `<data_dir>/<name>.dat`
    pub fn table_path(&self, name: &str) -> PathBuf {
        self.config
            .data_dir
            .join(format!("{}.{}", name, Self::DATA_EXTENSION))
    }

    fn validate_name(name: &str) -> Result<()> {
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(StoreError::InvalidArgument(format!(
                "table name '{}' must be non-empty ASCII alphanumerics, '_' or '-'",
                name
            )));
        }
        Ok(())
    }

    // =========================================================================
    // Tables
    // =========================================================================

    /// Open a table with the index kind the catalog remembers
    ///
    /// A table seen for the first time is registered with the configured
    /// default index kind.
    pub fn table<E: Entity>(&self, name: &str) -> Result<Table<E>> {
        Self::validate_name(name)?;
        let kind = {
            let mut catalog = self.catalog.lock();
            match catalog.get(name) {
                Some(entry) => entry.index,
                None => {
                    let kind = catalog.register(name, self.config.default_index).index;
                    catalog.save(&self.catalog_path())?;
                    debug!(table = name, index = %kind, "registered table");
                    kind
                }
            }
        };
        Table::open(self.table_path(name), kind, self.config.index_settings())
    }

    /// Open a table with a specific index kind
    ///
    /// If the catalog recorded another kind, the old index file is removed
    /// and the new index is built from a scan when the table opens.
    pub fn table_with_index<E: Entity>(&self, name: &str, kind: IndexKind) -> Result<Table<E>> {
        Self::validate_name(name)?;
        let data_path = self.table_path(name);
        {
            let mut catalog = self.catalog.lock();
            let previous = catalog.get(name).map(|entry| entry.index);
            if previous != Some(kind) {
                if let Some(old) = previous {
                    let old_path = old.index_path(&data_path);
                    if old_path.exists() {
                        fs::remove_file(&old_path)?;
                    }
                    info!(table = name, from = %old, to = %kind, "switching index kind");
                }
                catalog.register(name, kind);
                catalog.save(&self.catalog_path())?;
            }
        }
        Table::open(data_path, kind, self.config.index_settings())
    }

    /// Vacuum a table and record it in the catalog
    pub fn vacuum<E: Entity>(&self, table: &mut Table<E>) -> Result<VacuumReport> {
        let report = table.vacuum()?;
        let mut catalog = self.catalog.lock();
        catalog.record_vacuum(table.name());
        catalog.save(&self.catalog_path())?;
        Ok(report)
    }

    /// Catalog entries, ordered by name
    pub fn tables(&self) -> Vec<TableEntry> {
        self.catalog.lock().tables().cloned().collect()
    }
}
