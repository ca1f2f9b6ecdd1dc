//! # tombstore
//!
//! A file-backed record store built from primitives:
//! - Append-only record files with tombstoned deletes
//! - One big-endian codec for every field type
//! - A disk-resident B+ tree and an extensible hash index
//! - Vacuum compaction with generation-stamped index recovery
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Engine                              │
//! │              (data directory + catalog.bin)                 │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                      Table<E: Entity>                       │
//! │        (codec field order, key scheme, write lock)          │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌───────────────────────┐
//!   │ RecordStore │          │ Index                 │
//!   │   (.dat)    │          │  BPlusTree  (.idx)    │
//!   └──────┬──────┘          │  ExtensibleHash(.hash)│
//!          │                 └───────────┬───────────┘
//!          └───────────┬─────────────────┘
//!                      ▼
//!               ┌─────────────┐
//!               │   Vacuum    │
//!               └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod codec;
pub mod header;
pub mod store;
pub mod index;
pub mod vacuum;
pub mod entity;
pub mod table;
pub mod catalog;
pub mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{Result, StoreError};
pub use config::{Config, IndexSettings};
pub use codec::{CalendarDate, CodecEnum, PayloadBuilder, PayloadReader};
pub use entity::{Entity, KeyScheme, Lookup};
pub use index::{open_index, BPlusTree, ExtensibleHash, Index, IndexEntry, IndexKind};
pub use store::{Record, RecordStore};
pub use table::{Table, TableStats};
pub use vacuum::VacuumReport;
pub use engine::Engine;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of tombstore
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
