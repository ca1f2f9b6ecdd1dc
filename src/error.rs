//! Error types for tombstore
//!
//! Provides a unified error type for all operations. Logical misses (absent
//! keys, duplicate creates) are reported through `Option`/`bool` results and
//! never show up here.

use thiserror::Error;

/// Result type alias using StoreError
pub type Result<T> = std::result::Result<T, StoreError>;

/// Unified error type for tombstore operations
#[derive(Debug, Error)]
pub enum StoreError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Corruption Errors
    // -------------------------------------------------------------------------
    #[error("Corrupt file: {0}")]
    Corrupt(String),

    #[error("Format version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u8, found: u8 },

    #[error("Decode error: {0}")]
    Decode(String),

    // -------------------------------------------------------------------------
    // Contract Violations
    // -------------------------------------------------------------------------
    #[error("Capacity exceeded: {0}")]
    Capacity(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Structural invariant violated: {0}")]
    Structural(String),

    // -------------------------------------------------------------------------
    // Record Errors
    // -------------------------------------------------------------------------
    #[error("Record not found at offset {offset}")]
    RecordNotFound { offset: u64 },

    #[error("{0} is closed")]
    Closed(&'static str),

    // -------------------------------------------------------------------------
    // Compaction Errors
    // -------------------------------------------------------------------------
    #[error("Index swap failed after data file was replaced: {0}")]
    IndexSwap(String),

    // -------------------------------------------------------------------------
    // Catalog / Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Configuration error: {0}")]
    Config(String),
}
