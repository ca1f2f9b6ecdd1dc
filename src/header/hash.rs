//! Extensible hash index header
//!
//! ```text
//! [0] version u8 | [1..5] global_depth u32 | [5..9] bucket_capacity u32
//! [9..17] directory_offset u64 | [17..25] total_keys u64 | [25..29] source_generation u32
//! ```

use crate::codec::{decode_u32, decode_u64, decode_u8, encode_u32, encode_u64};
use crate::error::Result;

use super::{FileHeader, HEADER_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashHeader {
    pub version: u8,
    pub global_depth: u32,
    pub bucket_capacity: u32,
    /// Where the `2^global_depth` directory slots start
    pub directory_offset: u64,
    pub total_keys: u64,
    pub source_generation: u32,
}

impl HashHeader {
    pub fn new(version: u8, bucket_capacity: u32, directory_offset: u64) -> Self {
        Self {
            version,
            global_depth: 1,
            bucket_capacity,
            directory_offset,
            total_keys: 0,
            source_generation: 0,
        }
    }
}

impl FileHeader for HashHeader {
    const MAGIC: [u8; 4] = *b"TSEH";
    const KIND: &'static str = "extensible hash";

    fn version(&self) -> u8 {
        self.version
    }

    fn encode_fields(&self, buf: &mut [u8; HEADER_SIZE]) {
        buf[0] = self.version;
        buf[1..5].copy_from_slice(&encode_u32(self.global_depth));
        buf[5..9].copy_from_slice(&encode_u32(self.bucket_capacity));
        buf[9..17].copy_from_slice(&encode_u64(self.directory_offset));
        buf[17..25].copy_from_slice(&encode_u64(self.total_keys));
        buf[25..29].copy_from_slice(&encode_u32(self.source_generation));
    }

    fn decode_fields(buf: &[u8; HEADER_SIZE]) -> Result<Self> {
        Ok(Self {
            version: decode_u8(buf, 0)?.value,
            global_depth: decode_u32(buf, 1)?.value,
            bucket_capacity: decode_u32(buf, 5)?.value,
            directory_offset: decode_u64(buf, 9)?.value,
            total_keys: decode_u64(buf, 17)?.value,
            source_generation: decode_u32(buf, 25)?.value,
        })
    }
}
