//! Tests for the extensible hash index
//!
//! These tests verify:
//! - The initial depth-1 layout and its growth through doubling and splits
//! - Keys that differ only in high bits, and keys no depth can separate
//! - Point operations across splits, including negative keys
//! - Persistence of depth, directory and capacity across reopen
//! - That the hash index refuses ordered range queries

#[path = "../common/mod.rs"]
mod common;

use std::collections::HashMap;
use std::ops::Bound;

use common::{setup_temp_dir, small_settings};
use tombstore::header::HEADER_SIZE;
use tombstore::index::hash::{bucket_size, hash_key, MAX_GLOBAL_DEPTH};
use tombstore::index::{ExtensibleHash, Index, IndexKind};
use tombstore::StoreError;

/// The first `n` non-negative keys whose hash ends in `pattern` over `bits` bits
fn keys_hashing_to(pattern: u64, bits: u32, n: usize) -> Vec<i64> {
    let mask = (1u64 << bits) - 1;
    (0i64..)
        .filter(|k| hash_key(*k) & mask == pattern)
        .take(n)
        .collect()
}

// =============================================================================
// Layout Tests
// =============================================================================

#[test]
fn test_fresh_index_layout() {
    let (_temp, dir) = setup_temp_dir();
    let path = dir.join("h.hash");
    let hash = ExtensibleHash::open(&path, small_settings(4, 3)).unwrap();

    assert_eq!(hash.kind(), IndexKind::ExtensibleHash);
    assert_eq!(hash.global_depth(), 1);
    assert_eq!(hash.bucket_capacity(), 3);
    assert_eq!(hash.header().directory_offset, HEADER_SIZE as u64);

    let first = HEADER_SIZE as u64 + 16;
    let second = first + bucket_size(3) as u64;
    assert_eq!(hash.directory().unwrap(), vec![first, second]);

    let expected_len = second + bucket_size(3) as u64;
    assert_eq!(std::fs::metadata(&path).unwrap().len(), expected_len);

    let stats = hash.verify().unwrap();
    assert_eq!(stats.buckets, 2);
    assert_eq!(stats.keys, 0);
}

#[test]
fn test_zero_capacity_is_rejected() {
    let (_temp, dir) = setup_temp_dir();
    let result = ExtensibleHash::open(dir.join("h.hash"), small_settings(4, 0));
    assert!(matches!(result, Err(StoreError::Config(_))));
}

// =============================================================================
// Growth Tests
// =============================================================================

#[test]
fn test_colliding_low_bits_double_directory() {
    let (_temp, dir) = setup_temp_dir();
    let hash = ExtensibleHash::open(dir.join("h.hash"), small_settings(4, 2)).unwrap();
    let start = hash.header().directory_offset;

    // Every key lands in slot 0 at depth 1
    let keys = keys_hashing_to(0, 1, 4);
    for &k in &keys {
        assert!(hash.insert(k, k as u64 + 100).unwrap());
    }

    assert!(hash.global_depth() >= 2);
    assert_ne!(hash.header().directory_offset, start);
    for &k in &keys {
        assert_eq!(hash.get(k).unwrap(), Some(k as u64 + 100));
    }

    let stats = hash.verify().unwrap();
    assert_eq!(stats.directory_len, 1 << stats.global_depth);
    assert_eq!(stats.keys, 4);
}

#[test]
fn test_repeated_splits_when_bits_keep_matching() {
    let (_temp, dir) = setup_temp_dir();
    let hash = ExtensibleHash::open(dir.join("h.hash"), small_settings(4, 2)).unwrap();

    // All four agree on two low bits and split apart on the third
    let low = keys_hashing_to(0b000, 3, 2);
    let high = keys_hashing_to(0b100, 3, 2);
    for k in [low[0], high[0], low[1], high[1]] {
        hash.insert(k, 1).unwrap();
    }

    assert_eq!(hash.global_depth(), 3);
    let stats = hash.verify().unwrap();
    assert_eq!(stats.max_local_depth, 3);
    assert_eq!(stats.keys, 4);
}

#[test]
fn test_split_without_doubling() {
    let (_temp, dir) = setup_temp_dir();
    let hash = ExtensibleHash::open(dir.join("h.hash"), small_settings(4, 2)).unwrap();

    // Grow to depth 2 through the even bucket
    let zeros = keys_hashing_to(0b00, 2, 2);
    let twos = keys_hashing_to(0b10, 2, 1);
    for k in [zeros[0], twos[0], zeros[1]] {
        hash.insert(k, 0).unwrap();
    }
    assert_eq!(hash.global_depth(), 2);

    // The odd bucket is still at local depth 1 and splits in place
    let ones = keys_hashing_to(0b01, 2, 2);
    let threes = keys_hashing_to(0b11, 2, 1);
    for k in [ones[0], threes[0], ones[1]] {
        hash.insert(k, 0).unwrap();
    }
    assert_eq!(hash.global_depth(), 2);
    let stats = hash.verify().unwrap();
    assert_eq!(stats.buckets, 4);
}

#[test]
fn test_keys_differing_only_in_high_bits_spread() {
    let (_temp, dir) = setup_temp_dir();
    let path = dir.join("h.hash");
    let hash = ExtensibleHash::open(&path, small_settings(4, 2)).unwrap();

    let keys: Vec<i64> = (0..16).map(|i| i << 32).collect();
    for &k in &keys {
        assert!(hash.insert(k, k as u64).unwrap());
    }
    for &k in &keys {
        assert_eq!(hash.get(k).unwrap(), Some(k as u64));
    }

    assert!(hash.global_depth() < MAX_GLOBAL_DEPTH);
    assert!(std::fs::metadata(&path).unwrap().len() < 1 << 20);
    assert_eq!(hash.verify().unwrap().keys, 16);
}

#[test]
fn test_inseparable_key_fails_before_growing() {
    let (_temp, dir) = setup_temp_dir();
    let path = dir.join("h.hash");
    let hash = ExtensibleHash::open(&path, small_settings(4, 1)).unwrap();

    // Two keys whose hashes share every bit the directory can ever use
    let mask = (1u64 << MAX_GLOBAL_DEPTH) - 1;
    let mut seen = HashMap::new();
    let (first, second) = (0i64..)
        .find_map(|k| seen.insert(hash_key(k) & mask, k).map(|earlier| (earlier, k)))
        .unwrap();

    assert!(hash.insert(first, 1).unwrap());
    let depth = hash.global_depth();
    let len = std::fs::metadata(&path).unwrap().len();

    assert!(matches!(hash.insert(second, 2), Err(StoreError::Capacity(_))));
    assert_eq!(hash.global_depth(), depth);
    assert_eq!(std::fs::metadata(&path).unwrap().len(), len);
    assert_eq!(hash.get(first).unwrap(), Some(1));
    assert_eq!(hash.verify().unwrap().keys, 1);
}

#[test]
fn test_many_keys() {
    let (_temp, dir) = setup_temp_dir();
    let hash = ExtensibleHash::open(dir.join("h.hash"), small_settings(4, 4)).unwrap();

    for k in -500..1500i64 {
        assert!(hash.insert(k, (k + 500) as u64).unwrap());
    }
    for k in -500..1500i64 {
        assert_eq!(hash.get(k).unwrap(), Some((k + 500) as u64));
    }
    assert_eq!(hash.get(1500).unwrap(), None);
    assert_eq!(hash.len().unwrap(), 2000);

    let stats = hash.verify().unwrap();
    assert_eq!(stats.keys, 2000);
    assert!(stats.buckets >= 500);
}

// =============================================================================
// Point Operation Tests
// =============================================================================

#[test]
fn test_duplicate_insert_is_rejected() {
    let (_temp, dir) = setup_temp_dir();
    let hash = ExtensibleHash::open(dir.join("h.hash"), small_settings(4, 2)).unwrap();

    assert!(hash.insert(7, 70).unwrap());
    assert!(!hash.insert(7, 71).unwrap());
    assert_eq!(hash.get(7).unwrap(), Some(70));
    assert_eq!(hash.len().unwrap(), 1);
}

#[test]
fn test_update_and_remove() {
    let (_temp, dir) = setup_temp_dir();
    let hash = ExtensibleHash::open(dir.join("h.hash"), small_settings(4, 2)).unwrap();
    for k in 0..32 {
        hash.insert(k, 0).unwrap();
    }

    assert!(hash.update(17, 1717).unwrap());
    assert!(!hash.update(99, 1).unwrap());
    assert_eq!(hash.get(17).unwrap(), Some(1717));

    assert!(hash.remove(17).unwrap());
    assert!(!hash.remove(17).unwrap());
    assert_eq!(hash.get(17).unwrap(), None);
    assert_eq!(hash.len().unwrap(), 31);

    // Buckets never merge; the depth stays where it grew to
    let depth = hash.global_depth();
    for k in 0..32 {
        hash.remove(k).unwrap();
    }
    assert_eq!(hash.global_depth(), depth);
    assert_eq!(hash.verify().unwrap().keys, 0);
}

#[test]
fn test_clear_resets_layout() {
    let (_temp, dir) = setup_temp_dir();
    let hash = ExtensibleHash::open(dir.join("h.hash"), small_settings(4, 2)).unwrap();
    for k in 0..50 {
        hash.insert(k, 0).unwrap();
    }

    hash.clear().unwrap();
    assert_eq!(hash.global_depth(), 1);
    assert_eq!(hash.len().unwrap(), 0);
    assert_eq!(hash.get(3).unwrap(), None);
    assert!(hash.insert(3, 30).unwrap());
    hash.verify().unwrap();
}

#[test]
fn test_range_is_unsupported() {
    let (_temp, dir) = setup_temp_dir();
    let hash = ExtensibleHash::open(dir.join("h.hash"), small_settings(4, 2)).unwrap();
    hash.insert(1, 1).unwrap();

    let result = hash.range(Bound::Unbounded, Bound::Unbounded).unwrap();
    assert!(result.is_none());
}

// =============================================================================
// Persistence Tests
// =============================================================================

#[test]
fn test_reopen_preserves_index() {
    let (_temp, dir) = setup_temp_dir();
    let path = dir.join("h.hash");
    let depth;
    {
        let hash = ExtensibleHash::open(&path, small_settings(4, 2)).unwrap();
        for k in 0..64 {
            hash.insert(k * 3, k as u64).unwrap();
        }
        hash.set_source_generation(2).unwrap();
        depth = hash.global_depth();
        hash.close().unwrap();
    }

    // A different configured capacity does not override the header
    let hash = ExtensibleHash::open(&path, small_settings(4, 16)).unwrap();
    assert_eq!(hash.bucket_capacity(), 2);
    assert_eq!(hash.global_depth(), depth);
    assert_eq!(hash.source_generation().unwrap(), 2);
    for k in 0..64 {
        assert_eq!(hash.get(k * 3).unwrap(), Some(k as u64));
    }
    hash.verify().unwrap();
}

#[test]
fn test_closed_index_refuses_operations() {
    let (_temp, dir) = setup_temp_dir();
    let hash = ExtensibleHash::open(dir.join("h.hash"), small_settings(4, 2)).unwrap();
    hash.close().unwrap();

    assert!(matches!(hash.get(1), Err(StoreError::Closed(_))));
    assert!(matches!(hash.len(), Err(StoreError::Closed(_))));
}
