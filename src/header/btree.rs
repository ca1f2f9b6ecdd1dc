//! B+ tree index header
//!
//! ```text
//! [0] version u8 | [1..9] root i64 (-1 = empty) | [9..13] order u32 | [13..17] height u32
//! [17..25] total_keys u64 | [25..29] source_generation u32
//! ```

use crate::codec::{
    decode_i64, decode_u32, decode_u64, decode_u8, encode_i64, encode_u32, encode_u64,
};
use crate::error::Result;

use super::{FileHeader, HEADER_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BTreeHeader {
    pub version: u8,
    pub root: i64,
    pub order: u32,
    /// Number of page levels; 0 for an empty tree
    pub height: u32,
    pub total_keys: u64,
    /// Record store generation this tree was built from
    pub source_generation: u32,
}

impl BTreeHeader {
    pub fn new(version: u8, order: u32) -> Self {
        Self {
            version,
            root: -1,
            order,
            height: 0,
            total_keys: 0,
            source_generation: 0,
        }
    }
}

impl FileHeader for BTreeHeader {
    const MAGIC: [u8; 4] = *b"TSBT";
    const KIND: &'static str = "B+ tree";

    fn version(&self) -> u8 {
        self.version
    }

    fn encode_fields(&self, buf: &mut [u8; HEADER_SIZE]) {
        buf[0] = self.version;
        buf[1..9].copy_from_slice(&encode_i64(self.root));
        buf[9..13].copy_from_slice(&encode_u32(self.order));
        buf[13..17].copy_from_slice(&encode_u32(self.height));
        buf[17..25].copy_from_slice(&encode_u64(self.total_keys));
        buf[25..29].copy_from_slice(&encode_u32(self.source_generation));
    }

    fn decode_fields(buf: &[u8; HEADER_SIZE]) -> Result<Self> {
        Ok(Self {
            version: decode_u8(buf, 0)?.value,
            root: decode_i64(buf, 1)?.value,
            order: decode_u32(buf, 9)?.value,
            height: decode_u32(buf, 13)?.value,
            total_keys: decode_u64(buf, 17)?.value,
            source_generation: decode_u32(buf, 25)?.value,
        })
    }
}
