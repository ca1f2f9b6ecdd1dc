//! Lazy forward scan over a record store
//!
//! The scan holds the store's lock until it is dropped, so it sees a stable
//! file and no writer can interleave. Do not call back into the same store
//! while a scan is alive.

use std::io::{Read, Seek, SeekFrom};

use parking_lot::MutexGuard;
use tracing::warn;

use crate::error::Result;
use crate::header::HEADER_SIZE;

use super::record::{Record, RecordPrefix, RECORD_PREFIX_SIZE};
use super::StoreInner;

/// Iterator over every physical record, tombstoned ones included
pub struct Scan<'a> {
    inner: MutexGuard<'a, StoreInner>,
    pos: u64,
    end: u64,
    done: bool,
}

impl<'a> Scan<'a> {
    pub(super) fn new(mut inner: MutexGuard<'a, StoreInner>) -> Result<Self> {
        let end = inner.file()?.metadata()?.len();
        Ok(Self {
            inner,
            pos: HEADER_SIZE as u64,
            end,
            done: false,
        })
    }

    /// Only the records that are not tombstoned
    pub fn active(self) -> impl Iterator<Item = Result<Record>> + 'a {
        self.filter(|r| !matches!(r, Ok(rec) if rec.tombstoned))
    }

    fn read_next(&mut self) -> Result<Option<Record>> {
        if self.pos >= self.end {
            return Ok(None);
        }

        // Step 1: a prefix that does not fit is a torn final write
        let remaining = self.end - self.pos;
        if remaining < RECORD_PREFIX_SIZE as u64 {
            warn!(
                offset = self.pos,
                trailing = remaining,
                "truncating scan at partial record prefix"
            );
            return Ok(None);
        }

        let offset = self.pos;
        let file = self.inner.file()?;
        file.seek(SeekFrom::Start(offset))?;
        let mut raw = [0u8; RECORD_PREFIX_SIZE];
        file.read_exact(&mut raw)?;
        let prefix = RecordPrefix::decode(&raw, offset)?;

        // Step 2: a payload running past end-of-file is also a torn write
        if prefix.record_len() > remaining {
            warn!(
                offset,
                payload_len = prefix.payload_len,
                trailing = remaining,
                "truncating scan at record whose payload runs past end of file"
            );
            return Ok(None);
        }

        // Step 3: read the payload
        let mut payload = vec![0u8; prefix.payload_len as usize];
        file.read_exact(&mut payload)?;
        self.pos += prefix.record_len();

        Ok(Some(Record {
            offset,
            key: prefix.key,
            tombstoned: prefix.tombstoned,
            payload,
        }))
    }
}

impl Iterator for Scan<'_> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_next() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
