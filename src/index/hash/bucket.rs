//! Bucket layout
//!
//! ```text
//! ┌────────────────┬────────────┬────────────────────────────────────┐
//! │ local_depth u32│ count u32  │ capacity × (key i64, offset u64)   │
//! └────────────────┴────────────┴────────────────────────────────────┘
//! ```

use crate::codec::{decode_i64, decode_u32, decode_u64, encode_i64, encode_u32, encode_u64};
use crate::error::{Result, StoreError};

const BUCKET_PREFIX: usize = 4 + 4;
const ENTRY_SIZE: usize = 16;

/// Size in bytes of a bucket holding up to `capacity` entries
pub fn bucket_size(capacity: usize) -> usize {
    BUCKET_PREFIX + ENTRY_SIZE * capacity
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Bucket {
    pub local_depth: u32,
    pub entries: Vec<(i64, u64)>,
}

impl Bucket {
    pub fn new(local_depth: u32) -> Self {
        Self {
            local_depth,
            entries: Vec::new(),
        }
    }

    pub fn position(&self, key: i64) -> Option<usize> {
        self.entries.iter().position(|(k, _)| *k == key)
    }

    pub fn encode(&self, capacity: usize) -> Result<Vec<u8>> {
        if self.entries.len() > capacity {
            return Err(StoreError::Structural(format!(
                "bucket holds {} entries, capacity is {}",
                self.entries.len(),
                capacity
            )));
        }

        let mut buf = vec![0u8; bucket_size(capacity)];
        buf[0..4].copy_from_slice(&encode_u32(self.local_depth));
        buf[4..8].copy_from_slice(&encode_u32(self.entries.len() as u32));
        for (i, (key, offset)) in self.entries.iter().enumerate() {
            let at = BUCKET_PREFIX + i * ENTRY_SIZE;
            buf[at..at + 8].copy_from_slice(&encode_i64(*key));
            buf[at + 8..at + 16].copy_from_slice(&encode_u64(*offset));
        }
        Ok(buf)
    }

    /// `offset` is only used for error messages
    pub fn decode(buf: &[u8], capacity: usize, offset: u64) -> Result<Self> {
        let local_depth = decode_u32(buf, 0)?.value;
        let count = decode_u32(buf, 4)?.value as usize;
        if count > capacity {
            return Err(StoreError::Corrupt(format!(
                "bucket at {} claims {} entries, capacity is {}",
                offset, count, capacity
            )));
        }

        let mut entries = Vec::with_capacity(count + 1);
        for i in 0..count {
            let at = BUCKET_PREFIX + i * ENTRY_SIZE;
            let key = decode_i64(buf, at)?.value;
            let value = decode_u64(buf, at + 8)?.value;
            entries.push((key, value));
        }
        Ok(Self {
            local_depth,
            entries,
        })
    }
}
