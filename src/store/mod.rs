//! Record Store Module
//!
//! Append-only file of tombstone-flagged, length-prefixed records.
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ Header (128 bytes)                                      │
//! │   version | next_id | active_count | generation         │
//! ├─────────────────────────────────────────────────────────┤
//! │ Records (variable)                                      │
//! │   [tombstone u8][key i64][len u32][payload]             │
//! │   ... appended in write order ...                       │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Responsibilities
//! - Hand out monotonic surrogate ids
//! - Append, read, update and tombstone records by offset
//! - Keep `active_count` in step with every transition
//! - Scan forward lazily, tolerating a torn final record
//! - Trim a torn final record on open so appends stay visible to scans
//!
//! ## Concurrency
//! One `parking_lot::Mutex` guards the file handle and the cached header.
//! Every operation, reads included, runs under it.

mod record;
mod scan;

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{Result, StoreError};
use crate::header::{self, RecordStoreHeader, HEADER_SIZE};

pub use record::{Record, RECORD_PREFIX_SIZE};
pub use scan::Scan;

use record::RecordPrefix;

/// A single `.dat` file and its header
pub struct RecordStore {
    path: PathBuf,
    inner: Mutex<StoreInner>,
}

/// State behind the store lock
pub(crate) struct StoreInner {
    file: Option<File>,
    header: RecordStoreHeader,
    /// Largest payload `append` accepts; the prefix stores lengths as u32
    max_payload_len: usize,
}

impl StoreInner {
    fn file(&mut self) -> Result<&mut File> {
        self.file.as_mut().ok_or(StoreError::Closed("record store"))
    }

    fn persist_header(&mut self) -> Result<()> {
        let header = self.header;
        header::write_header(self.file()?, &header)
    }

    /// Read and validate the prefix of the record at `offset`
    fn read_prefix(&mut self, offset: u64) -> Result<RecordPrefix> {
        let file = self.file()?;
        let len = file.metadata()?.len();
        if offset < HEADER_SIZE as u64 || offset + RECORD_PREFIX_SIZE as u64 > len {
            return Err(StoreError::Corrupt(format!(
                "record offset {} outside data region [{}, {})",
                offset, HEADER_SIZE, len
            )));
        }

        let mut raw = [0u8; RECORD_PREFIX_SIZE];
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut raw)?;
        let prefix = RecordPrefix::decode(&raw, offset)?;

        if offset + prefix.record_len() > len {
            return Err(StoreError::Corrupt(format!(
                "record at offset {} declares {} payload bytes past end of file",
                offset, prefix.payload_len
            )));
        }
        Ok(prefix)
    }

    fn read_payload(&mut self, offset: u64, prefix: &RecordPrefix) -> Result<Vec<u8>> {
        let file = self.file()?;
        let mut payload = vec![0u8; prefix.payload_len as usize];
        file.seek(SeekFrom::Start(offset + RECORD_PREFIX_SIZE as u64))?;
        file.read_exact(&mut payload)?;
        Ok(payload)
    }

    fn append(&mut self, key: i64, payload: &[u8]) -> Result<u64> {
        let payload_len = u32::try_from(payload.len())
            .ok()
            .filter(|_| payload.len() <= self.max_payload_len)
            .ok_or_else(|| {
                StoreError::Capacity(format!(
                    "payload of {} bytes exceeds the {} byte record limit",
                    payload.len(),
                    self.max_payload_len
                ))
            })?;
        let prefix = RecordPrefix {
            tombstoned: false,
            key,
            payload_len,
        };

        let mut buf = Vec::with_capacity(RECORD_PREFIX_SIZE + payload.len());
        buf.extend_from_slice(&prefix.encode());
        buf.extend_from_slice(payload);

        let file = self.file()?;
        let offset = file.seek(SeekFrom::End(0))?;
        file.write_all(&buf)?;
        file.flush()?;

        self.header.active_count += 1;
        self.persist_header()?;
        Ok(offset)
    }

    fn write_flag(&mut self, offset: u64, prefix: &RecordPrefix) -> Result<()> {
        let file = self.file()?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(&prefix.encode()[..1])?;
        file.flush()?;
        Ok(())
    }

    /// Cut a torn final record so the next append lands on a record boundary
    ///
    /// Walks prefixes only. A prefix that fails to decode stops the walk
    /// without trimming; the scan reports it as `Corrupt`. Returns the
    /// offset the file was cut at and the number of bytes removed.
    fn trim_torn_tail(&mut self) -> Result<Option<(u64, u64)>> {
        let file = self.file()?;
        let len = file.metadata()?.len();
        let mut pos = HEADER_SIZE as u64;
        let mut raw = [0u8; RECORD_PREFIX_SIZE];

        while pos < len {
            if len - pos < RECORD_PREFIX_SIZE as u64 {
                break;
            }
            file.seek(SeekFrom::Start(pos))?;
            file.read_exact(&mut raw)?;
            let prefix = match RecordPrefix::decode(&raw, pos) {
                Ok(prefix) => prefix,
                Err(_) => return Ok(None),
            };
            if pos + prefix.record_len() > len {
                break;
            }
            pos += prefix.record_len();
        }

        if pos >= len {
            return Ok(None);
        }
        file.set_len(pos)?;
        file.flush()?;
        Ok(Some((pos, len - pos)))
    }

    fn tombstone(&mut self, offset: u64) -> Result<bool> {
        let mut prefix = self.read_prefix(offset)?;
        if prefix.tombstoned {
            return Ok(false);
        }
        prefix.tombstoned = true;
        self.write_flag(offset, &prefix)?;

        self.header.active_count = self.header.active_count.saturating_sub(1);
        self.persist_header()?;
        Ok(true)
    }
}

impl RecordStore {
    /// Open (or create) the store at `path`
    ///
    /// An empty file gets a fresh header; a file shorter than the header is
    /// `Corrupt`, and a different format version is `VersionMismatch`.
    pub fn open(path: impl AsRef<Path>, format_version: u8) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;

        let (header, fresh) =
            header::init_or_load(&mut file, format_version, || {
                RecordStoreHeader::new(format_version)
            })?;

        let mut inner = StoreInner {
            file: Some(file),
            header,
            max_payload_len: u32::MAX as usize,
        };
        if !fresh {
            if let Some((offset, trimmed)) = inner.trim_torn_tail()? {
                warn!(
                    path = %path.display(),
                    offset,
                    trimmed,
                    "trimmed torn record at end of file"
                );
            }
        }

        debug!(
            path = %path.display(),
            fresh,
            next_id = header.next_id,
            active = header.active_count,
            generation = header.generation,
            "opened record store"
        );

        Ok(Self {
            path,
            inner: Mutex::new(inner),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // =========================================================================
    // Counters
    // =========================================================================

    /// Reserve the next surrogate id and persist the bumped counter
    pub fn allocate_id(&self) -> Result<i64> {
        let mut inner = self.inner.lock();
        inner.file()?;
        let id = inner.header.next_id;
        inner.header.next_id = id.checked_add(1).ok_or_else(|| {
            StoreError::Capacity("surrogate id space exhausted".to_string())
        })?;
        inner.persist_header()?;
        Ok(id)
    }

    pub fn next_id(&self) -> i64 {
        self.inner.lock().header.next_id
    }

    pub fn active_count(&self) -> u64 {
        self.inner.lock().header.active_count
    }

    pub fn generation(&self) -> u32 {
        self.inner.lock().header.generation
    }

    pub fn header(&self) -> RecordStoreHeader {
        self.inner.lock().header
    }

    pub(crate) fn set_next_id(&self, next_id: i64) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.header.next_id = next_id;
        inner.persist_header()
    }

    pub(crate) fn set_generation(&self, generation: u32) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.header.generation = generation;
        inner.persist_header()
    }

    // =========================================================================
    // Record Operations
    // =========================================================================

    /// Append an active record at end-of-file and return its offset
    pub fn append(&self, key: i64, payload: &[u8]) -> Result<u64> {
        self.inner.lock().append(key, payload)
    }

    /// Payload of the record at `offset`, or `None` if it is tombstoned
    pub fn read_at(&self, offset: u64) -> Result<Option<Vec<u8>>> {
        Ok(self.read_record(offset)?.map(|r| r.payload))
    }

    /// Key and payload of the record at `offset`, or `None` if it is tombstoned
    pub fn read_record(&self, offset: u64) -> Result<Option<Record>> {
        let mut inner = self.inner.lock();
        let prefix = inner.read_prefix(offset)?;
        if prefix.tombstoned {
            return Ok(None);
        }
        let payload = inner.read_payload(offset, &prefix)?;
        Ok(Some(Record {
            offset,
            key: prefix.key,
            tombstoned: false,
            payload,
        }))
    }

    /// Replace the payload of the record at `offset`
    ///
    /// Same length: overwritten in place, same offset returned. Otherwise the
    /// payload is appended under the same key and then the old record is
    /// tombstoned, so a failed append leaves the old record active.
    pub fn update_at(&self, offset: u64, payload: &[u8]) -> Result<u64> {
        let mut inner = self.inner.lock();
        let prefix = inner.read_prefix(offset)?;
        if prefix.tombstoned {
            return Err(StoreError::RecordNotFound { offset });
        }

        if payload.len() == prefix.payload_len as usize {
            let file = inner.file()?;
            file.seek(SeekFrom::Start(offset + RECORD_PREFIX_SIZE as u64))?;
            file.write_all(payload)?;
            file.flush()?;
            return Ok(offset);
        }

        let new_offset = inner.append(prefix.key, payload)?;
        inner.tombstone(offset)?;
        debug!(
            from = offset,
            to = new_offset,
            key = prefix.key,
            "relocated record on length change"
        );
        Ok(new_offset)
    }

    /// Mark the record at `offset` deleted; returns whether it was active
    pub fn tombstone(&self, offset: u64) -> Result<bool> {
        self.inner.lock().tombstone(offset)
    }

    /// Walk every physical record from just past the header to end-of-file
    ///
    /// The returned iterator holds the store lock until dropped.
    pub fn scan(&self) -> Result<Scan<'_>> {
        Scan::new(self.inner.lock())
    }

    /// Recompute `active_count` from a scan and repair the header on drift
    pub fn recount(&self) -> Result<u64> {
        let mut active = 0u64;
        for record in self.scan()?.active() {
            record?;
            active += 1;
        }

        let mut inner = self.inner.lock();
        if inner.header.active_count != active {
            warn!(
                path = %self.path.display(),
                cached = inner.header.active_count,
                actual = active,
                "active record count drifted, repairing header"
            );
            inner.header.active_count = active;
            inner.persist_header()?;
        }
        Ok(active)
    }

    pub fn file_len(&self) -> Result<u64> {
        let mut inner = self.inner.lock();
        Ok(inner.file()?.metadata()?.len())
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Flush and release the file handle; later calls fail with `Closed`
    pub fn close(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if let Some(mut file) = inner.file.take() {
            file.flush()?;
            debug!(path = %self.path.display(), "closed record store");
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().file.is_none()
    }
}

impl std::fmt::Debug for RecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStore")
            .field("path", &self.path)
            .field("header", &self.inner.lock().header)
            .finish()
    }
}
