//! B+ tree page layout
//!
//! Every page of a tree has the same size, fixed by the tree's order `m`:
//!
//! ```text
//! ┌──────────┬──────────┬───────────┬──────────────────────┬─────────────────────┐
//! │ kind u8  │ n u32    │ next i64  │ m × (key i64, val)   │ (m+1) × child i64   │
//! │ 1 leaf   │ keys in  │ leaf only │ unused slots zeroed  │ internal only,      │
//! │ 2 inner  │ use      │ -1 = end  │                      │ unused = -1         │
//! └──────────┴──────────┴───────────┴──────────────────────┴─────────────────────┘
//! ```

use crate::codec::{decode_i64, decode_u32, decode_u8, encode_i64, encode_u32};
use crate::error::{Result, StoreError};

const KIND_LEAF: u8 = 1;
const KIND_INTERNAL: u8 = 2;

/// Null page pointer
pub(crate) const NO_PAGE: i64 = -1;

const PAGE_PREFIX: usize = 1 + 4 + 8;
const ENTRY_SIZE: usize = 16;
const CHILD_SIZE: usize = 8;

/// Size in bytes of every page of a tree with the given order
pub fn page_size(order: usize) -> usize {
    PAGE_PREFIX + ENTRY_SIZE * order + CHILD_SIZE * (order + 1)
}

/// A decoded page
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Node {
    Leaf {
        keys: Vec<i64>,
        values: Vec<u64>,
        next: i64,
    },
    Internal {
        keys: Vec<i64>,
        children: Vec<i64>,
    },
}

impl Node {
    pub fn keys(&self) -> &[i64] {
        match self {
            Node::Leaf { keys, .. } | Node::Internal { keys, .. } => keys,
        }
    }

    pub fn encode(&self, order: usize) -> Result<Vec<u8>> {
        let n = self.keys().len();
        if n > order {
            return Err(StoreError::Structural(format!(
                "page holds {} keys, order is {}",
                n, order
            )));
        }

        let mut buf = vec![0u8; page_size(order)];
        let children_at = PAGE_PREFIX + ENTRY_SIZE * order;
        buf[1..5].copy_from_slice(&encode_u32(n as u32));

        // Unused child slots read back as NO_PAGE
        for slot in 0..=order {
            let at = children_at + slot * CHILD_SIZE;
            buf[at..at + CHILD_SIZE].copy_from_slice(&encode_i64(NO_PAGE));
        }

        match self {
            Node::Leaf { keys, values, next } => {
                buf[0] = KIND_LEAF;
                buf[5..13].copy_from_slice(&encode_i64(*next));
                for (i, (key, value)) in keys.iter().zip(values).enumerate() {
                    let at = PAGE_PREFIX + i * ENTRY_SIZE;
                    buf[at..at + 8].copy_from_slice(&encode_i64(*key));
                    buf[at + 8..at + 16].copy_from_slice(&encode_i64(*value as i64));
                }
            }
            Node::Internal { keys, children } => {
                if children.len() != n + 1 {
                    return Err(StoreError::Structural(format!(
                        "internal page with {} keys has {} children",
                        n,
                        children.len()
                    )));
                }
                buf[0] = KIND_INTERNAL;
                buf[5..13].copy_from_slice(&encode_i64(NO_PAGE));
                for (i, key) in keys.iter().enumerate() {
                    let at = PAGE_PREFIX + i * ENTRY_SIZE;
                    buf[at..at + 8].copy_from_slice(&encode_i64(*key));
                }
                for (i, child) in children.iter().enumerate() {
                    let at = children_at + i * CHILD_SIZE;
                    buf[at..at + CHILD_SIZE].copy_from_slice(&encode_i64(*child));
                }
            }
        }
        Ok(buf)
    }

    /// `offset` is only used for error messages
    pub fn decode(buf: &[u8], order: usize, offset: i64) -> Result<Self> {
        if buf.len() < page_size(order) {
            return Err(StoreError::Corrupt(format!(
                "page at {} is {} bytes, expected {}",
                offset,
                buf.len(),
                page_size(order)
            )));
        }

        let kind = decode_u8(buf, 0)?.value;
        let n = decode_u32(buf, 1)?.value as usize;
        if n > order {
            return Err(StoreError::Corrupt(format!(
                "page at {} claims {} keys, order is {}",
                offset, n, order
            )));
        }

        let mut keys = Vec::with_capacity(n + 1);
        for i in 0..n {
            keys.push(decode_i64(buf, PAGE_PREFIX + i * ENTRY_SIZE)?.value);
        }

        match kind {
            KIND_LEAF => {
                let next = decode_i64(buf, 5)?.value;
                let mut values = Vec::with_capacity(n + 1);
                for i in 0..n {
                    let v = decode_i64(buf, PAGE_PREFIX + i * ENTRY_SIZE + 8)?.value;
                    values.push(v as u64);
                }
                Ok(Node::Leaf { keys, values, next })
            }
            KIND_INTERNAL => {
                let children_at = PAGE_PREFIX + ENTRY_SIZE * order;
                let mut children = Vec::with_capacity(n + 2);
                for i in 0..=n {
                    children.push(decode_i64(buf, children_at + i * CHILD_SIZE)?.value);
                }
                Ok(Node::Internal { keys, children })
            }
            other => Err(StoreError::Corrupt(format!(
                "page at {} has unknown kind byte {}",
                offset, other
            ))),
        }
    }
}
