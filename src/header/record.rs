//! Record store header
//!
//! ```text
//! [0] version u8 | [1..9] next_id i64 | [9..17] active_count u64 | [17..21] generation u32
//! ```

use crate::codec::{
    decode_i64, decode_u32, decode_u64, decode_u8, encode_i64, encode_u32, encode_u64,
};
use crate::error::Result;

use super::{FileHeader, HEADER_SIZE};

/// Header of a `.dat` record store file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordStoreHeader {
    pub version: u8,
    /// Next surrogate id to hand out; monotonic, never reused
    pub next_id: i64,
    /// Number of non-tombstoned records
    pub active_count: u64,
    /// Bumped by every vacuum, so a stale index can be detected
    pub generation: u32,
}

impl RecordStoreHeader {
    pub fn new(version: u8) -> Self {
        Self {
            version,
            next_id: 1,
            active_count: 0,
            generation: 0,
        }
    }
}

impl FileHeader for RecordStoreHeader {
    const MAGIC: [u8; 4] = *b"TSRS";
    const KIND: &'static str = "record store";

    fn version(&self) -> u8 {
        self.version
    }

    fn encode_fields(&self, buf: &mut [u8; HEADER_SIZE]) {
        buf[0] = self.version;
        buf[1..9].copy_from_slice(&encode_i64(self.next_id));
        buf[9..17].copy_from_slice(&encode_u64(self.active_count));
        buf[17..21].copy_from_slice(&encode_u32(self.generation));
    }

    fn decode_fields(buf: &[u8; HEADER_SIZE]) -> Result<Self> {
        Ok(Self {
            version: decode_u8(buf, 0)?.value,
            next_id: decode_i64(buf, 1)?.value,
            active_count: decode_u64(buf, 9)?.value,
            generation: decode_u32(buf, 17)?.value,
        })
    }
}
