//! Extensible Hash Index
//!
//! Exact-match index built from a power-of-two directory of bucket
//! pointers and fixed-capacity buckets.
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ Header (128 bytes)                                      │
//! │   version | global_depth | capacity | dir_offset | ...  │
//! ├─────────────────────────────────────────────────────────┤
//! │ Directory (2^global_depth × u64 bucket offsets)         │
//! │   initially at byte 128; moved to end-of-file on every  │
//! │   doubling, the old copy left behind                    │
//! ├─────────────────────────────────────────────────────────┤
//! │ Buckets (bucket_size(capacity) bytes each, appended)    │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! Keys are mixed through [`hash_key`] before the directory masks their
//! low `global_depth` bits.
//!
//! ## Growth
//! ```text
//!   insert into full bucket B (local depth l, global depth d)
//!     │
//!     ├── l == d ──► double directory (d += 1, upper half mirrors lower)
//!     │
//!     └──► split B on bit l: entries with the bit set move to a new
//!          bucket, both at depth l + 1; slots with the bit set repoint
//!          ──► retry the insert
//! ```

mod bucket;
mod table;

pub use bucket::bucket_size;
pub use table::{hash_key, ExtensibleHash, HashStats, MAX_GLOBAL_DEPTH};
