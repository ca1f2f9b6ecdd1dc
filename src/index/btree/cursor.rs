//! Ordered traversal along the leaf chain
//!
//! A cursor descends once to its starting leaf and from there only follows
//! `next` pointers. It holds the tree lock until dropped.

use std::ops::Bound;

use parking_lot::MutexGuard;

use crate::error::{Result, StoreError};
use crate::index::IndexEntry;

use super::page::{Node, NO_PAGE};
use super::tree::TreeInner;

/// Lazy iterator over `(key, offset)` entries in increasing key order
pub struct Cursor<'a> {
    inner: MutexGuard<'a, TreeInner>,
    keys: Vec<i64>,
    values: Vec<u64>,
    pos: usize,
    next: i64,
    upper: Bound<i64>,
    done: bool,
}

impl<'a> Cursor<'a> {
    pub(super) fn new(
        mut inner: MutexGuard<'a, TreeInner>,
        lower: Bound<i64>,
        upper: Bound<i64>,
    ) -> Result<Self> {
        let start = match lower {
            Bound::Included(k) | Bound::Excluded(k) => inner.find_leaf(k)?,
            Bound::Unbounded => inner.leftmost_leaf()?,
        };

        let mut cursor = Self {
            inner,
            keys: Vec::new(),
            values: Vec::new(),
            pos: 0,
            next: NO_PAGE,
            upper,
            done: false,
        };

        if let Some((_, leaf)) = start {
            cursor.load(leaf)?;
            cursor.pos = match lower {
                Bound::Included(k) => cursor.keys.partition_point(|key| *key < k),
                Bound::Excluded(k) => cursor.keys.partition_point(|key| *key <= k),
                Bound::Unbounded => 0,
            };
        } else {
            cursor.done = true;
        }
        Ok(cursor)
    }

    fn load(&mut self, node: Node) -> Result<()> {
        match node {
            Node::Leaf { keys, values, next } => {
                self.keys = keys;
                self.values = values;
                self.next = next;
                self.pos = 0;
                Ok(())
            }
            Node::Internal { .. } => Err(StoreError::Structural(
                "leaf chain points at an internal page".to_string(),
            )),
        }
    }

    fn past_upper(&self, key: i64) -> bool {
        match self.upper {
            Bound::Included(hi) => key > hi,
            Bound::Excluded(hi) => key >= hi,
            Bound::Unbounded => false,
        }
    }

    fn advance(&mut self) -> Result<Option<IndexEntry>> {
        // Empty leaves left behind by deletes are skipped
        while self.pos >= self.keys.len() {
            if self.next == NO_PAGE {
                return Ok(None);
            }
            let page = self.inner.read_page(self.next)?;
            self.load(page)?;
        }

        let key = self.keys[self.pos];
        if self.past_upper(key) {
            return Ok(None);
        }
        let offset = self.values[self.pos];
        self.pos += 1;
        Ok(Some(IndexEntry { key, offset }))
    }
}

impl Iterator for Cursor<'_> {
    type Item = Result<IndexEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.advance() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
