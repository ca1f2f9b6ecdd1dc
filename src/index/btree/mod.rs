//! B+ Tree Index
//!
//! Ordered, disk-resident index with a chained leaf level.
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ Header (128 bytes)                                      │
//! │   version | root | order | height | total_keys | gen   │
//! ├─────────────────────────────────────────────────────────┤
//! │ Pages, all page_size(order) bytes, appended in creation │
//! │ order; root anywhere (pointed to by the header)         │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Invariants
//! - Keys within a page strictly increase
//! - Every key under `children[i]` is `>= keys[i-1]` and `< keys[i]`
//! - All leaves sit at depth `height`
//! - Walking `next` from the leftmost leaf visits every leaf in key order
//!
//! Splits use `mid = (order + 1) / 2`. Deletes never merge or rebalance.

mod cursor;
mod page;
mod tree;

pub use cursor::Cursor;
pub use page::page_size;
pub use tree::{BPlusTree, TreeStats};
