//! File Header Module
//!
//! Every data and index file starts with a fixed 128-byte header.
//!
//! ## Layout
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │ [0..120)   kind-specific fields, big-endian, zero padded │
//! │            byte 0 is always the format version           │
//! ├──────────────────────────────────────────────────────────┤
//! │ [120..124) magic: TSRS | TSBT | TSEH                     │
//! ├──────────────────────────────────────────────────────────┤
//! │ [124..128) CRC32 of bytes [0..124)                       │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Responsibilities
//! - Self-initialize an empty file with a fresh header
//! - Reject short files, unknown magic and checksum mismatches as `Corrupt`
//! - Reject a format version other than the configured one

mod btree;
mod hash;
mod record;

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

pub use btree::BTreeHeader;
pub use hash::HashHeader;
pub use record::RecordStoreHeader;

use crate::error::{Result, StoreError};

// =============================================================================
// Shared Constants
// =============================================================================

/// Size of every file header in bytes
pub const HEADER_SIZE: usize = 128;

/// Offset of the 4-byte kind magic
pub const MAGIC_OFFSET: usize = 120;

/// Offset of the CRC32 over everything before it
pub const CRC_OFFSET: usize = 124;

// =============================================================================
// Header Trait
// =============================================================================

/// A kind-specific header body
pub trait FileHeader: Sized {
    /// Kind magic stored at [`MAGIC_OFFSET`]
    const MAGIC: [u8; 4];

    /// Human readable kind, used in error messages
    const KIND: &'static str;

    fn version(&self) -> u8;

    /// Write the kind-specific fields into `buf[0..MAGIC_OFFSET]`
    fn encode_fields(&self, buf: &mut [u8; HEADER_SIZE]);

    /// Read the kind-specific fields back
    fn decode_fields(buf: &[u8; HEADER_SIZE]) -> Result<Self>;
}

/// Serialize a header into its 128-byte on-disk form
pub fn encode<H: FileHeader>(header: &H) -> [u8; HEADER_SIZE] {
    let mut buf = [0u8; HEADER_SIZE];
    header.encode_fields(&mut buf);
    buf[MAGIC_OFFSET..CRC_OFFSET].copy_from_slice(&H::MAGIC);
    let crc = crc32fast::hash(&buf[..CRC_OFFSET]);
    buf[CRC_OFFSET..].copy_from_slice(&crc.to_be_bytes());
    buf
}

/// Parse and validate a header from raw bytes
pub fn decode<H: FileHeader>(bytes: &[u8]) -> Result<H> {
    if bytes.len() < HEADER_SIZE {
        return Err(StoreError::Corrupt(format!(
            "{} header is {} bytes, expected {}",
            H::KIND,
            bytes.len(),
            HEADER_SIZE
        )));
    }

    let mut buf = [0u8; HEADER_SIZE];
    buf.copy_from_slice(&bytes[..HEADER_SIZE]);

    if buf[MAGIC_OFFSET..CRC_OFFSET] != H::MAGIC {
        return Err(StoreError::Corrupt(format!(
            "bad {} magic: {:?}",
            H::KIND,
            &buf[MAGIC_OFFSET..CRC_OFFSET]
        )));
    }

    let mut stored = [0u8; 4];
    stored.copy_from_slice(&buf[CRC_OFFSET..]);
    let stored = u32::from_be_bytes(stored);
    let computed = crc32fast::hash(&buf[..CRC_OFFSET]);
    if stored != computed {
        return Err(StoreError::Corrupt(format!(
            "{} header checksum mismatch: stored {:08x}, computed {:08x}",
            H::KIND,
            stored,
            computed
        )));
    }

    H::decode_fields(&buf)
}

// =============================================================================
// File I/O
// =============================================================================

/// Read the header at offset 0
pub fn read_header<H: FileHeader>(file: &mut File) -> Result<H> {
    let len = file.metadata()?.len();
    if len < HEADER_SIZE as u64 {
        return Err(StoreError::Corrupt(format!(
            "{} file is {} bytes, shorter than its {} byte header",
            H::KIND,
            len,
            HEADER_SIZE
        )));
    }

    let mut buf = [0u8; HEADER_SIZE];
    file.seek(SeekFrom::Start(0))?;
    file.read_exact(&mut buf)?;
    decode(&buf)
}

/// Overwrite the header at offset 0
pub fn write_header<H: FileHeader>(file: &mut File, header: &H) -> Result<()> {
    file.seek(SeekFrom::Start(0))?;
    file.write_all(&encode(header))?;
    file.flush()?;
    Ok(())
}

/// Load the header, writing `fresh` first if the file is empty
///
/// Returns the header and whether it was freshly initialized.
pub fn init_or_load<H: FileHeader>(
    file: &mut File,
    expected_version: u8,
    fresh: impl FnOnce() -> H,
) -> Result<(H, bool)> {
    if file.metadata()?.len() == 0 {
        let header = fresh();
        write_header(file, &header)?;
        return Ok((header, true));
    }

    let header: H = read_header(file)?;
    if header.version() != expected_version {
        return Err(StoreError::VersionMismatch {
            expected: expected_version,
            found: header.version(),
        });
    }
    Ok((header, false))
}

// =============================================================================
// Kind Detection
// =============================================================================

/// The three header kinds, told apart by their magic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    RecordStore,
    BPlusTree,
    ExtensibleHash,
}

/// Identify a header by its magic bytes, without validating anything else
pub fn probe_kind(bytes: &[u8]) -> Option<FileKind> {
    let magic = bytes.get(MAGIC_OFFSET..CRC_OFFSET)?;
    if magic == RecordStoreHeader::MAGIC {
        Some(FileKind::RecordStore)
    } else if magic == BTreeHeader::MAGIC {
        Some(FileKind::BPlusTree)
    } else if magic == HashHeader::MAGIC {
        Some(FileKind::ExtensibleHash)
    } else {
        None
    }
}

/// A decoded header of any kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnyHeader {
    RecordStore(RecordStoreHeader),
    BPlusTree(BTreeHeader),
    ExtensibleHash(HashHeader),
}

impl AnyHeader {
    pub fn kind(&self) -> FileKind {
        match self {
            AnyHeader::RecordStore(_) => FileKind::RecordStore,
            AnyHeader::BPlusTree(_) => FileKind::BPlusTree,
            AnyHeader::ExtensibleHash(_) => FileKind::ExtensibleHash,
        }
    }

    pub fn version(&self) -> u8 {
        match self {
            AnyHeader::RecordStore(h) => h.version(),
            AnyHeader::BPlusTree(h) => h.version(),
            AnyHeader::ExtensibleHash(h) => h.version(),
        }
    }
}

/// Read and decode whatever header the file at `path` carries
pub fn read_any(path: &Path) -> Result<AnyHeader> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    if len < HEADER_SIZE as u64 {
        return Err(StoreError::Corrupt(format!(
            "{} is {} bytes, shorter than a header",
            path.display(),
            len
        )));
    }

    let mut buf = [0u8; HEADER_SIZE];
    file.read_exact(&mut buf)?;

    match probe_kind(&buf) {
        Some(FileKind::RecordStore) => Ok(AnyHeader::RecordStore(decode(&buf)?)),
        Some(FileKind::BPlusTree) => Ok(AnyHeader::BPlusTree(decode(&buf)?)),
        Some(FileKind::ExtensibleHash) => Ok(AnyHeader::ExtensibleHash(decode(&buf)?)),
        None => Err(StoreError::Corrupt(format!(
            "{} has no recognizable header magic",
            path.display()
        ))),
    }
}
