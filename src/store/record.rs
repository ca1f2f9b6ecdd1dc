//! Physical record layout
//!
//! ```text
//! ┌───────────────┬───────────┬───────────────────┬──────────────────┐
//! │ tombstone u8  │ key i64   │ payload_len u32   │ payload bytes    │
//! │ 0 = active    │           │                   │                  │
//! │ 1 = tombstone │           │                   │                  │
//! └───────────────┴───────────┴───────────────────┴──────────────────┘
//! ```

use crate::codec::{decode_i64, decode_u32, decode_u8, encode_i64, encode_u32};
use crate::error::{Result, StoreError};

/// Bytes before the payload: tombstone + key + length
pub const RECORD_PREFIX_SIZE: usize = 1 + 8 + 4;

pub(crate) const FLAG_ACTIVE: u8 = 0;
pub(crate) const FLAG_TOMBSTONED: u8 = 1;

/// Fixed-size prefix of every physical record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RecordPrefix {
    pub tombstoned: bool,
    pub key: i64,
    pub payload_len: u32,
}

impl RecordPrefix {
    pub fn encode(&self) -> [u8; RECORD_PREFIX_SIZE] {
        let mut buf = [0u8; RECORD_PREFIX_SIZE];
        buf[0] = if self.tombstoned {
            FLAG_TOMBSTONED
        } else {
            FLAG_ACTIVE
        };
        buf[1..9].copy_from_slice(&encode_i64(self.key));
        buf[9..13].copy_from_slice(&encode_u32(self.payload_len));
        buf
    }

    /// `offset` is only used for the error message
    pub fn decode(buf: &[u8; RECORD_PREFIX_SIZE], offset: u64) -> Result<Self> {
        let tombstoned = match decode_u8(buf, 0)?.value {
            FLAG_ACTIVE => false,
            FLAG_TOMBSTONED => true,
            other => {
                return Err(StoreError::Corrupt(format!(
                    "invalid tombstone byte 0x{:02x} at offset {}",
                    other, offset
                )));
            }
        };

        Ok(Self {
            tombstoned,
            key: decode_i64(buf, 1)?.value,
            payload_len: decode_u32(buf, 9)?.value,
        })
    }

    /// Total on-disk size of the record this prefix introduces
    pub fn record_len(&self) -> u64 {
        RECORD_PREFIX_SIZE as u64 + self.payload_len as u64
    }
}

/// One physical record as read back from the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Offset of the record's first byte (its tombstone flag)
    pub offset: u64,
    pub key: i64,
    pub tombstoned: bool,
    pub payload: Vec<u8>,
}

impl Record {
    pub fn is_active(&self) -> bool {
        !self.tombstoned
    }
}
