//! Vacuum (compaction)
//!
//! Rewrites a record store so it holds only active records, rebuilding its
//! index alongside.
//!
//! ## Protocol
//! ```text
//! 1. open <data>.tmp and <index>.tmp
//! 2. scan <data>; every active record ──► append to <data>.tmp
//!                                     └─► insert key into <index>.tmp
//! 3. close original and temporary handles
//! 4. delete <data>,  rename <data>.tmp  ──► <data>
//! 5. delete <index>, rename <index>.tmp ──► <index>
//! 6. reopen both
//! ```
//!
//! A failure in steps 1-3 leaves the originals untouched and removes the
//! temporary files. A failure between steps 4 and 5 leaves a new data file
//! next to an old index; the new file carries a bumped generation that the
//! old index does not match, so the next open rebuilds the index from a
//! scan.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::config::IndexSettings;
use crate::error::{Result, StoreError};
use crate::index::{open_index, Index, IndexKind};
use crate::store::RecordStore;

/// Outcome of one vacuum run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VacuumReport {
    pub records_kept: u64,
    /// Tombstoned records left behind
    pub records_dropped: u64,
    /// Data file size before and after
    pub bytes_before: u64,
    pub bytes_after: u64,
    /// Generation stamped on the compacted store and its index
    pub generation: u32,
}

impl VacuumReport {
    pub fn bytes_reclaimed(&self) -> u64 {
        self.bytes_before.saturating_sub(self.bytes_after)
    }
}

/// `<path>.tmp`
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Compact `store` and rebuild `index`, swapping the reopened handles in place
///
/// Requires exclusive access to both, which the `&mut` borrows enforce.
pub fn vacuum(
    store: &mut RecordStore,
    index: &mut Box<dyn Index>,
    settings: IndexSettings,
) -> Result<VacuumReport> {
    let started = Instant::now();
    let data_path = store.path().to_path_buf();
    let index_path = index.path().to_path_buf();
    let kind = index.kind();

    let header = store.header();
    let settings = IndexSettings {
        format_version: header.version,
        ..settings
    };
    let generation = header.generation.wrapping_add(1);
    let bytes_before = store.file_len()?;

    let data_tmp = temp_path(&data_path);
    let index_tmp = temp_path(&index_path);
    discard(&data_tmp)?;
    discard(&index_tmp)?;

    info!(path = %data_path.display(), index = %kind, "vacuum started");

    // Steps 1-2: copy active records into fresh temporary files
    let copied = copy_active(
        store,
        &data_tmp,
        &index_tmp,
        kind,
        settings,
        header.next_id,
        generation,
    );
    let (kept, dropped) = match copied {
        Ok(counts) => counts,
        Err(e) => {
            warn!(path = %data_path.display(), error = %e, "vacuum aborted, originals untouched");
            let _ = discard(&data_tmp);
            let _ = discard(&index_tmp);
            return Err(e);
        }
    };

    // Step 3: release the originals
    store.close()?;
    index.close()?;

    // Step 4: swap the data file
    fs::remove_file(&data_path)?;
    fs::rename(&data_tmp, &data_path)?;

    // Step 5: swap the index file
    swap_index(&index_path, &index_tmp).map_err(|e| {
        StoreError::IndexSwap(format!(
            "{} replaced but {} was not: {}",
            data_path.display(),
            index_path.display(),
            e
        ))
    })?;

    // Step 6: reopen
    *store = RecordStore::open(&data_path, settings.format_version)?;
    *index = open_index(kind, &index_path, settings)?;

    let report = VacuumReport {
        records_kept: kept,
        records_dropped: dropped,
        bytes_before,
        bytes_after: store.file_len()?,
        generation,
    };
    info!(
        path = %data_path.display(),
        kept = report.records_kept,
        dropped = report.records_dropped,
        reclaimed = report.bytes_reclaimed(),
        generation,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "vacuum finished"
    );
    Ok(report)
}

fn copy_active(
    store: &RecordStore,
    data_tmp: &Path,
    index_tmp: &Path,
    kind: IndexKind,
    settings: IndexSettings,
    next_id: i64,
    generation: u32,
) -> Result<(u64, u64)> {
    let tmp_store = RecordStore::open(data_tmp, settings.format_version)?;
    let tmp_index = open_index(kind, index_tmp, settings)?;

    let mut kept = 0u64;
    let mut dropped = 0u64;
    for record in store.scan()? {
        let record = record?;
        if record.tombstoned {
            dropped += 1;
            continue;
        }
        let offset = tmp_store.append(record.key, &record.payload)?;
        // A second active record under one key stays reachable by scan only
        if !tmp_index.insert(record.key, offset)? {
            debug!(key = record.key, offset, "key already indexed, record kept unindexed");
        }
        kept += 1;
    }

    // Ids are never reused, so the counter survives compaction
    tmp_store.set_next_id(next_id)?;
    tmp_store.set_generation(generation)?;
    tmp_index.set_source_generation(generation)?;

    tmp_store.close()?;
    tmp_index.close()?;
    Ok((kept, dropped))
}

fn swap_index(index_path: &Path, index_tmp: &Path) -> std::io::Result<()> {
    if index_path.exists() {
        fs::remove_file(index_path)?;
    }
    fs::rename(index_tmp, index_path)
}

fn discard(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_file(path)?;
    }
    Ok(())
}

/// Settle the temporary file of an interrupted vacuum next to `target`
///
/// If `target` is gone the swap was cut off mid-way and the temporary file
/// is the only copy, so the rename is completed. Otherwise the temporary
/// file is a leftover and is deleted. Returns whether anything was found.
pub fn recover_temp_file(target: &Path) -> Result<bool> {
    let tmp = temp_path(target);
    if !tmp.exists() {
        return Ok(false);
    }

    if target.exists() {
        warn!(path = %tmp.display(), "removing stale vacuum temp file");
        fs::remove_file(&tmp)?;
    } else {
        warn!(
            path = %target.display(),
            "completing interrupted vacuum swap from temp file"
        );
        fs::rename(&tmp, target)?;
    }
    Ok(true)
}

/// Settle temporary files for a data file and every index kind next to it
pub fn recover_table_files(data_path: &Path) -> Result<()> {
    recover_temp_file(data_path)?;
    for kind in [IndexKind::BPlusTree, IndexKind::ExtensibleHash] {
        recover_temp_file(&kind.index_path(data_path))?;
    }
    Ok(())
}
