//! Tests for the 128-byte file headers
//!
//! These tests verify:
//! - Field layout of each header kind
//! - Magic and checksum validation
//! - Self-initialization of empty files and rejection of short ones
//! - Version mismatch detection and kind probing

#[path = "../common/mod.rs"]
mod common;

use std::fs::{self, OpenOptions};

use common::setup_temp_dir;
use tombstore::header::{
    self, AnyHeader, BTreeHeader, FileHeader, FileKind, HashHeader, RecordStoreHeader,
    CRC_OFFSET, HEADER_SIZE, MAGIC_OFFSET,
};
use tombstore::StoreError;

// =============================================================================
// Layout Tests
// =============================================================================

#[test]
fn test_record_store_header_layout() {
    let h = RecordStoreHeader {
        version: 1,
        next_id: 7,
        active_count: 3,
        generation: 2,
    };
    let buf = header::encode(&h);

    assert_eq!(buf.len(), HEADER_SIZE);
    assert_eq!(buf[0], 1);
    assert_eq!(&buf[1..9], &7i64.to_be_bytes());
    assert_eq!(&buf[9..17], &3u64.to_be_bytes());
    assert_eq!(&buf[17..21], &2u32.to_be_bytes());
    assert!(buf[21..MAGIC_OFFSET].iter().all(|b| *b == 0));
    assert_eq!(&buf[MAGIC_OFFSET..CRC_OFFSET], b"TSRS");

    assert_eq!(header::decode::<RecordStoreHeader>(&buf).unwrap(), h);
}

#[test]
fn test_btree_header_roundtrip() {
    let mut h = BTreeHeader::new(1, 4);
    assert_eq!(h.root, -1);
    assert_eq!(h.height, 0);

    h.root = 128;
    h.height = 2;
    h.total_keys = 12;
    h.source_generation = 5;
    let buf = header::encode(&h);
    assert_eq!(&buf[MAGIC_OFFSET..CRC_OFFSET], b"TSBT");
    assert_eq!(header::decode::<BTreeHeader>(&buf).unwrap(), h);
}

#[test]
fn test_hash_header_roundtrip() {
    let h = HashHeader::new(1, 8, 128);
    assert_eq!(h.global_depth, 1);

    let buf = header::encode(&h);
    assert_eq!(&buf[MAGIC_OFFSET..CRC_OFFSET], b"TSEH");
    assert_eq!(header::decode::<HashHeader>(&buf).unwrap(), h);
}

// =============================================================================
// Validation Tests
// =============================================================================

#[test]
fn test_checksum_mismatch_is_corrupt() {
    let mut buf = header::encode(&RecordStoreHeader::new(1));
    buf[3] ^= 0x01;
    assert!(matches!(
        header::decode::<RecordStoreHeader>(&buf),
        Err(StoreError::Corrupt(_))
    ));
}

#[test]
fn test_wrong_magic_is_corrupt() {
    let buf = header::encode(&BTreeHeader::new(1, 4));
    assert!(matches!(
        header::decode::<HashHeader>(&buf),
        Err(StoreError::Corrupt(_))
    ));
}

#[test]
fn test_short_buffer_is_corrupt() {
    let buf = header::encode(&RecordStoreHeader::new(1));
    assert!(matches!(
        header::decode::<RecordStoreHeader>(&buf[..100]),
        Err(StoreError::Corrupt(_))
    ));
}

// =============================================================================
// File Tests
// =============================================================================

#[test]
fn test_empty_file_is_initialized() {
    let (_temp, dir) = setup_temp_dir();
    let path = dir.join("a.dat");
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .open(&path)
        .unwrap();

    let (h, fresh) =
        header::init_or_load(&mut file, 1, || RecordStoreHeader::new(1)).unwrap();
    assert!(fresh);
    assert_eq!(h.next_id, 1);
    assert_eq!(fs::metadata(&path).unwrap().len(), HEADER_SIZE as u64);

    let (again, fresh) =
        header::init_or_load(&mut file, 1, || RecordStoreHeader::new(1)).unwrap();
    assert!(!fresh);
    assert_eq!(again, h);
}

#[test]
fn test_short_file_is_corrupt() {
    let (_temp, dir) = setup_temp_dir();
    let path = dir.join("short.dat");
    fs::write(&path, [0u8; 40]).unwrap();
    let mut file = OpenOptions::new().read(true).write(true).open(&path).unwrap();

    let result = header::init_or_load(&mut file, 1, || RecordStoreHeader::new(1));
    assert!(matches!(result, Err(StoreError::Corrupt(_))));
}

#[test]
fn test_version_mismatch() {
    let (_temp, dir) = setup_temp_dir();
    let path = dir.join("v2.dat");
    fs::write(&path, header::encode(&RecordStoreHeader::new(2))).unwrap();
    let mut file = OpenOptions::new().read(true).write(true).open(&path).unwrap();

    let result = header::init_or_load(&mut file, 1, || RecordStoreHeader::new(1));
    assert!(matches!(
        result,
        Err(StoreError::VersionMismatch {
            expected: 1,
            found: 2
        })
    ));
}

#[test]
fn test_probe_and_read_any() {
    let (_temp, dir) = setup_temp_dir();
    let path = dir.join("t.dat.idx");
    let buf = header::encode(&BTreeHeader::new(1, 3));
    assert_eq!(header::probe_kind(&buf), Some(FileKind::BPlusTree));
    assert_eq!(header::probe_kind(&[0u8; 10]), None);

    fs::write(&path, buf).unwrap();
    let any = header::read_any(&path).unwrap();
    assert_eq!(any.kind(), FileKind::BPlusTree);
    assert_eq!(any.version(), 1);
    assert!(matches!(any, AnyHeader::BPlusTree(h) if h.order == 3));
    assert_eq!(BTreeHeader::MAGIC, *b"TSBT");
}
