//! Tests for Engine
//!
//! These tests verify:
//! - Opening creates the data directory and settles vacuum leftovers
//! - Tables are registered in the catalog with the default index kind
//! - Switching a table's index kind rebuilds the new index
//! - Vacuum through the engine is recorded in the catalog
//! - Config validation and table name rules

#[path = "../common/mod.rs"]
mod common;

use std::fs;
use std::thread;

use common::{Person, Pet, Species};
use tempfile::TempDir;
use tombstore::index::IndexKind;
use tombstore::vacuum::temp_path;
use tombstore::{Config, Engine, StoreError};

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_engine() -> (TempDir, Engine) {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .btree_order(3) // Small pages so tests exercise splits
        .hash_bucket_capacity(2)
        .build();
    let engine = Engine::open(config).unwrap();
    (temp_dir, engine)
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_engine_open_creates_directory() {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = temp_dir.path().join("mydb");

    let engine = Engine::open_path(&data_dir).unwrap();

    assert!(data_dir.exists());
    assert_eq!(engine.data_dir(), data_dir.as_path());
    assert!(engine.tables().is_empty());
}

#[test]
fn test_invalid_config_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .btree_order(1)
        .build();

    assert!(matches!(Engine::open(config), Err(StoreError::Config(_))));

    let config = Config::builder()
        .data_dir(temp_dir.path())
        .hash_bucket_capacity(0)
        .build();
    assert!(matches!(Engine::open(config), Err(StoreError::Config(_))));
}

#[test]
fn test_open_settles_temp_files() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path();
    fs::write(dir.join("live.dat"), b"live").unwrap();
    fs::write(temp_path(&dir.join("live.dat")), b"stale").unwrap();
    fs::write(temp_path(&dir.join("moved.dat")), b"only copy").unwrap();

    Engine::open_path(dir).unwrap();

    assert!(!temp_path(&dir.join("live.dat")).exists());
    assert_eq!(fs::read(dir.join("live.dat")).unwrap(), b"live");
    assert_eq!(fs::read(dir.join("moved.dat")).unwrap(), b"only copy");
}

// =============================================================================
// Catalog Tests
// =============================================================================

#[test]
fn test_table_is_registered_with_default_index() {
    let (temp_dir, engine) = setup_temp_engine();

    let pets = engine.table::<Pet>("pets").unwrap();
    pets.create(Pet::new("Rex", Species::Dog, 1)).unwrap();

    assert_eq!(pets.index_kind(), IndexKind::BPlusTree);
    assert!(temp_dir.path().join("catalog.bin").exists());
    assert!(temp_dir.path().join("pets.dat").exists());
    assert!(temp_dir.path().join("pets.dat.idx").exists());

    let tables = engine.tables();
    assert_eq!(tables.len(), 1);
    assert_eq!(tables[0].name, "pets");
    assert_eq!(tables[0].index, IndexKind::BPlusTree);
    assert_eq!(tables[0].vacuum_count, 0);
}

#[test]
fn test_configured_default_index() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .default_index(IndexKind::ExtensibleHash)
        .build();
    let engine = Engine::open(config).unwrap();

    let people = engine.table::<Person>("people").unwrap();
    assert_eq!(people.index_kind(), IndexKind::ExtensibleHash);
    assert!(temp_dir.path().join("people.dat.hash").exists());
}

#[test]
fn test_catalog_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    {
        let engine = Engine::open_path(temp_dir.path()).unwrap();
        engine
            .table_with_index::<Person>("people", IndexKind::ExtensibleHash)
            .unwrap()
            .create(Person::new("42", "Ana"))
            .unwrap();
        engine.table::<Pet>("pets").unwrap();
    }

    let engine = Engine::open_path(temp_dir.path()).unwrap();
    let names: Vec<String> = engine.tables().into_iter().map(|t| t.name).collect();
    assert_eq!(names, vec!["people".to_string(), "pets".to_string()]);

    // The catalog remembers the kind even though the default is a B+ tree
    let people = engine.table::<Person>("people").unwrap();
    assert_eq!(people.index_kind(), IndexKind::ExtensibleHash);
    assert_eq!(people.read("42").unwrap().unwrap().name, "Ana");
}

#[test]
fn test_switching_index_kind_rebuilds() {
    let (temp_dir, engine) = setup_temp_engine();
    {
        let pets = engine.table::<Pet>("pets").unwrap();
        for i in 0..10 {
            pets.create(Pet::new("p", Species::Cat, i)).unwrap();
        }
        pets.close().unwrap();
    }

    let pets = engine
        .table_with_index::<Pet>("pets", IndexKind::ExtensibleHash)
        .unwrap();
    assert_eq!(pets.index_kind(), IndexKind::ExtensibleHash);
    assert!(!temp_dir.path().join("pets.dat.idx").exists());
    assert!(temp_dir.path().join("pets.dat.hash").exists());
    assert_eq!(pets.index().len().unwrap(), 10);
    assert_eq!(pets.read(7i64).unwrap().unwrap().weight_grams, 6);
    assert_eq!(engine.tables()[0].index, IndexKind::ExtensibleHash);
}

#[test]
fn test_invalid_table_names() {
    let (_temp_dir, engine) = setup_temp_engine();

    for name in ["", "../escape", "with space", "dots.dat"] {
        let result = engine.table::<Pet>(name);
        assert!(
            matches!(result, Err(StoreError::InvalidArgument(_))),
            "{:?} should be rejected",
            name
        );
    }
    assert!(engine.table::<Pet>("pets_2024-v1").is_ok());
}

// =============================================================================
// Vacuum Tests
// =============================================================================

#[test]
fn test_engine_vacuum_updates_catalog() {
    let (_temp_dir, engine) = setup_temp_engine();
    let mut pets = engine.table::<Pet>("pets").unwrap();
    for i in 0..4 {
        pets.create(Pet::new("p", Species::Dog, i)).unwrap();
    }
    pets.delete(2i64).unwrap();

    let report = engine.vacuum(&mut pets).unwrap();
    assert_eq!(report.records_kept, 3);

    let entry = engine.tables().remove(0);
    assert_eq!(entry.vacuum_count, 1);
    assert!(entry.last_vacuum_at.is_some());

    engine.vacuum(&mut pets).unwrap();
    assert_eq!(engine.tables()[0].vacuum_count, 2);
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_tables_opened_from_many_threads() {
    let (_temp_dir, engine) = setup_temp_engine();

    thread::scope(|scope| {
        for t in 0..4 {
            let engine = &engine;
            scope.spawn(move || {
                let name = format!("t{}", t);
                let pets = engine.table::<Pet>(&name).unwrap();
                for i in 0..10 {
                    pets.create(Pet::new("p", Species::Bird, i)).unwrap();
                }
                assert_eq!(pets.list_all_active().unwrap().len(), 10);
            });
        }
    });

    assert_eq!(engine.tables().len(), 4);
}
