//! Tests for RecordStore
//!
//! These tests verify:
//! - Append / read / tombstone round trips and counter maintenance
//! - Same-length updates in place, different-length updates relocate
//! - Lazy scans, including torn-tail truncation
//! - Persistence across reopen and the closed-handle contract

#[path = "../common/mod.rs"]
mod common;

use std::fs::{self, OpenOptions};
use std::io::Write;

use common::setup_temp_dir;
use tombstore::header::HEADER_SIZE;
use tombstore::store::RECORD_PREFIX_SIZE;
use tombstore::{RecordStore, StoreError};

// =============================================================================
// Append / Read Tests
// =============================================================================

#[test]
fn test_new_store_is_header_only() {
    let (_temp, dir) = setup_temp_dir();
    let store = RecordStore::open(dir.join("s.dat"), 1).unwrap();

    assert_eq!(store.file_len().unwrap(), HEADER_SIZE as u64);
    assert_eq!(store.active_count(), 0);
    assert_eq!(store.next_id(), 1);
    assert_eq!(store.scan().unwrap().count(), 0);
}

#[test]
fn test_append_returns_end_of_file_offsets() {
    let (_temp, dir) = setup_temp_dir();
    let store = RecordStore::open(dir.join("s.dat"), 1).unwrap();

    let first = store.append(1, b"abc").unwrap();
    let second = store.append(2, b"").unwrap();

    assert_eq!(first, HEADER_SIZE as u64);
    assert_eq!(second, first + (RECORD_PREFIX_SIZE + 3) as u64);
    assert_eq!(store.read_at(first).unwrap(), Some(b"abc".to_vec()));
    assert_eq!(store.read_at(second).unwrap(), Some(Vec::new()));
    assert_eq!(store.active_count(), 2);
}

#[test]
fn test_read_record_includes_key() {
    let (_temp, dir) = setup_temp_dir();
    let store = RecordStore::open(dir.join("s.dat"), 1).unwrap();
    let offset = store.append(-77, b"payload").unwrap();

    let record = store.read_record(offset).unwrap().unwrap();
    assert_eq!(record.key, -77);
    assert_eq!(record.offset, offset);
    assert!(record.is_active());
}

#[test]
fn test_allocate_id_is_monotonic_and_persisted() {
    let (_temp, dir) = setup_temp_dir();
    let path = dir.join("s.dat");
    {
        let store = RecordStore::open(&path, 1).unwrap();
        assert_eq!(store.allocate_id().unwrap(), 1);
        assert_eq!(store.allocate_id().unwrap(), 2);
    }
    let store = RecordStore::open(&path, 1).unwrap();
    assert_eq!(store.allocate_id().unwrap(), 3);
}

#[test]
fn test_offset_inside_header_is_corrupt() {
    let (_temp, dir) = setup_temp_dir();
    let store = RecordStore::open(dir.join("s.dat"), 1).unwrap();
    store.append(1, b"x").unwrap();

    assert!(matches!(store.read_at(5), Err(StoreError::Corrupt(_))));
    assert!(matches!(store.read_at(10_000), Err(StoreError::Corrupt(_))));
}

// =============================================================================
// Tombstone Tests
// =============================================================================

#[test]
fn test_tombstone_is_idempotent() {
    let (_temp, dir) = setup_temp_dir();
    let store = RecordStore::open(dir.join("s.dat"), 1).unwrap();
    let offset = store.append(1, b"gone").unwrap();

    assert!(store.tombstone(offset).unwrap());
    assert!(!store.tombstone(offset).unwrap());
    assert_eq!(store.read_at(offset).unwrap(), None);
    assert_eq!(store.active_count(), 0);
}

#[test]
fn test_tombstoned_bytes_stay_on_disk() {
    let (_temp, dir) = setup_temp_dir();
    let path = dir.join("s.dat");
    let store = RecordStore::open(&path, 1).unwrap();
    let offset = store.append(1, b"SECRET-PAYLOAD").unwrap();
    store.tombstone(offset).unwrap();

    let raw = fs::read(&path).unwrap();
    assert!(raw.windows(14).any(|w| w == b"SECRET-PAYLOAD"));
    assert_eq!(raw[offset as usize], 1);
}

// =============================================================================
// Update Tests
// =============================================================================

#[test]
fn test_same_length_update_is_in_place() {
    let (_temp, dir) = setup_temp_dir();
    let store = RecordStore::open(dir.join("s.dat"), 1).unwrap();
    let offset = store.append(1, b"aaaa").unwrap();
    let len_before = store.file_len().unwrap();

    let new_offset = store.update_at(offset, b"bbbb").unwrap();

    assert_eq!(new_offset, offset);
    assert_eq!(store.read_at(offset).unwrap(), Some(b"bbbb".to_vec()));
    assert_eq!(store.file_len().unwrap(), len_before);
    assert_eq!(store.active_count(), 1);
}

#[test]
fn test_different_length_update_relocates() {
    let (_temp, dir) = setup_temp_dir();
    let store = RecordStore::open(dir.join("s.dat"), 1).unwrap();
    let offset = store.append(5, b"short").unwrap();

    let new_offset = store.update_at(offset, b"much longer").unwrap();

    assert_ne!(new_offset, offset);
    assert_eq!(store.read_at(offset).unwrap(), None);
    let moved = store.read_record(new_offset).unwrap().unwrap();
    assert_eq!(moved.key, 5);
    assert_eq!(moved.payload, b"much longer".to_vec());
    assert_eq!(store.active_count(), 1);
}

#[test]
fn test_update_of_tombstoned_record_fails() {
    let (_temp, dir) = setup_temp_dir();
    let store = RecordStore::open(dir.join("s.dat"), 1).unwrap();
    let offset = store.append(1, b"x").unwrap();
    store.tombstone(offset).unwrap();

    let result = store.update_at(offset, b"y");
    assert!(matches!(result, Err(StoreError::RecordNotFound { offset: o }) if o == offset));
}

// =============================================================================
// Scan Tests
// =============================================================================

#[test]
fn test_scan_yields_every_physical_record() {
    let (_temp, dir) = setup_temp_dir();
    let store = RecordStore::open(dir.join("s.dat"), 1).unwrap();
    let a = store.append(1, b"a").unwrap();
    let b = store.append(2, b"bb").unwrap();
    let c = store.append(3, b"ccc").unwrap();
    store.tombstone(b).unwrap();

    let all: Vec<_> = store.scan().unwrap().map(|r| r.unwrap()).collect();
    assert_eq!(all.len(), 3);
    assert_eq!(
        all.iter().map(|r| (r.offset, r.tombstoned)).collect::<Vec<_>>(),
        vec![(a, false), (b, true), (c, false)]
    );

    let active: Vec<_> = store
        .scan()
        .unwrap()
        .active()
        .map(|r| r.unwrap().key)
        .collect();
    assert_eq!(active, vec![1, 3]);
}

#[test]
fn test_scan_truncates_torn_prefix() {
    let (_temp, dir) = setup_temp_dir();
    let path = dir.join("s.dat");
    {
        let store = RecordStore::open(&path, 1).unwrap();
        store.append(1, b"whole").unwrap();
    }
    let mut file = OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(&[0, 0, 0]).unwrap();
    drop(file);

    let store = RecordStore::open(&path, 1).unwrap();
    let keys: Vec<_> = store.scan().unwrap().map(|r| r.unwrap().key).collect();
    assert_eq!(keys, vec![1]);
}

#[test]
fn test_scan_truncates_payload_past_end() {
    let (_temp, dir) = setup_temp_dir();
    let path = dir.join("s.dat");
    {
        let store = RecordStore::open(&path, 1).unwrap();
        store.append(1, b"whole").unwrap();
        store.append(2, b"this one gets torn").unwrap();
    }
    let len = fs::metadata(&path).unwrap().len();
    OpenOptions::new()
        .write(true)
        .open(&path)
        .unwrap()
        .set_len(len - 4)
        .unwrap();

    let store = RecordStore::open(&path, 1).unwrap();
    let keys: Vec<_> = store.scan().unwrap().map(|r| r.unwrap().key).collect();
    assert_eq!(keys, vec![1]);
}

#[test]
fn test_open_trims_torn_tail_so_appends_stay_visible() {
    let (_temp, dir) = setup_temp_dir();
    let path = dir.join("s.dat");
    let whole;
    {
        let store = RecordStore::open(&path, 1).unwrap();
        whole = store.append(1, b"whole").unwrap();
    }
    let clean_len = fs::metadata(&path).unwrap().len();

    // Prefix claims 100 payload bytes, only 3 made it to disk
    let mut torn = vec![0u8];
    torn.extend_from_slice(&2i64.to_be_bytes());
    torn.extend_from_slice(&100u32.to_be_bytes());
    torn.extend_from_slice(b"abc");
    let mut file = OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(&torn).unwrap();
    drop(file);

    let store = RecordStore::open(&path, 1).unwrap();
    assert_eq!(store.file_len().unwrap(), clean_len);

    let offset = store.append(3, b"after").unwrap();
    assert_eq!(offset, clean_len);
    let keys: Vec<_> = store.scan().unwrap().map(|r| r.unwrap().key).collect();
    assert_eq!(keys, vec![1, 3]);
    assert_eq!(store.read_at(whole).unwrap(), Some(b"whole".to_vec()));
}

#[test]
fn test_open_leaves_undecodable_prefix_in_place() {
    let (_temp, dir) = setup_temp_dir();
    let path = dir.join("s.dat");
    {
        let store = RecordStore::open(&path, 1).unwrap();
        store.append(1, b"x").unwrap();
    }
    let mut file = OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(&[9; RECORD_PREFIX_SIZE]).unwrap();
    drop(file);
    let len = fs::metadata(&path).unwrap().len();

    let store = RecordStore::open(&path, 1).unwrap();
    assert_eq!(store.file_len().unwrap(), len);
}

#[test]
fn test_scan_reports_invalid_tombstone_byte() {
    let (_temp, dir) = setup_temp_dir();
    let path = dir.join("s.dat");
    let offset;
    {
        let store = RecordStore::open(&path, 1).unwrap();
        offset = store.append(1, b"x").unwrap();
    }
    let mut raw = fs::read(&path).unwrap();
    raw[offset as usize] = 7;
    fs::write(&path, raw).unwrap();

    let store = RecordStore::open(&path, 1).unwrap();
    let results: Vec<_> = store.scan().unwrap().collect();
    assert_eq!(results.len(), 1);
    assert!(matches!(results[0], Err(StoreError::Corrupt(_))));
}

// =============================================================================
// Counter & Lifecycle Tests
// =============================================================================

#[test]
fn test_recount_repairs_drifted_counter() {
    let (_temp, dir) = setup_temp_dir();
    let path = dir.join("s.dat");
    {
        let store = RecordStore::open(&path, 1).unwrap();
        store.append(1, b"a").unwrap();
        store.append(2, b"b").unwrap();
    }

    // Zero active_count in place and fix up the checksum
    let mut raw = fs::read(&path).unwrap();
    raw[9..17].copy_from_slice(&0u64.to_be_bytes());
    let crc = crc32fast::hash(&raw[..124]);
    raw[124..128].copy_from_slice(&crc.to_be_bytes());
    fs::write(&path, raw).unwrap();

    let store = RecordStore::open(&path, 1).unwrap();
    assert_eq!(store.active_count(), 0);
    assert_eq!(store.recount().unwrap(), 2);
    assert_eq!(store.active_count(), 2);
}

#[test]
fn test_reopen_preserves_records_and_counters() {
    let (_temp, dir) = setup_temp_dir();
    let path = dir.join("s.dat");
    let offset;
    {
        let store = RecordStore::open(&path, 1).unwrap();
        offset = store.append(10, b"kept").unwrap();
        let dead = store.append(11, b"dead").unwrap();
        store.tombstone(dead).unwrap();
    }

    let store = RecordStore::open(&path, 1).unwrap();
    assert_eq!(store.active_count(), 1);
    assert_eq!(store.read_at(offset).unwrap(), Some(b"kept".to_vec()));
}

#[test]
fn test_closed_store_refuses_operations() {
    let (_temp, dir) = setup_temp_dir();
    let store = RecordStore::open(dir.join("s.dat"), 1).unwrap();
    let offset = store.append(1, b"x").unwrap();
    store.close().unwrap();

    assert!(store.is_closed());
    assert!(matches!(store.read_at(offset), Err(StoreError::Closed(_))));
    assert!(matches!(store.append(2, b"y"), Err(StoreError::Closed(_))));
    assert!(matches!(store.allocate_id(), Err(StoreError::Closed(_))));
    assert!(store.scan().is_err());
    store.close().unwrap();
}

#[test]
fn test_version_mismatch_on_open() {
    let (_temp, dir) = setup_temp_dir();
    let path = dir.join("s.dat");
    RecordStore::open(&path, 1).unwrap();

    assert!(matches!(
        RecordStore::open(&path, 2),
        Err(StoreError::VersionMismatch { .. })
    ));
}
