//! Disk-resident B+ tree
//!
//! Keys are `i64`, values are record offsets. Pages are appended at
//! end-of-file and never freed; space left behind by deletes stays until
//! vacuum copies the tree.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::ops::{Bound, RangeBounds};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::debug;

use crate::config::{IndexSettings, MIN_BTREE_ORDER};
use crate::error::{Result, StoreError};
use crate::header::{self, BTreeHeader, HEADER_SIZE};
use crate::index::{Index, IndexEntry, IndexKind};

use super::cursor::Cursor;
use super::page::{page_size, Node, NO_PAGE};

// =============================================================================
// Locked State
// =============================================================================

/// File handle, cached header and page geometry, all behind one lock
pub(super) struct TreeInner {
    file: Option<File>,
    header: BTreeHeader,
    order: usize,
}

/// Index of the child to descend into: the first key strictly greater than
/// `key` bounds it from above
fn child_index(keys: &[i64], key: i64) -> usize {
    keys.partition_point(|k| *k <= key)
}

impl TreeInner {
    fn file(&mut self) -> Result<&mut File> {
        self.file.as_mut().ok_or(StoreError::Closed("B+ tree"))
    }

    fn persist_header(&mut self) -> Result<()> {
        let header = self.header;
        header::write_header(self.file()?, &header)
    }

    pub(super) fn read_page(&mut self, offset: i64) -> Result<Node> {
        if offset < HEADER_SIZE as i64 {
            return Err(StoreError::Corrupt(format!(
                "page pointer {} points into the header",
                offset
            )));
        }
        let order = self.order;
        let mut buf = vec![0u8; page_size(order)];
        let file = self.file()?;
        file.seek(SeekFrom::Start(offset as u64))?;
        file.read_exact(&mut buf)?;
        Node::decode(&buf, order, offset)
    }

    fn write_page(&mut self, offset: i64, node: &Node) -> Result<()> {
        let buf = node.encode(self.order)?;
        let file = self.file()?;
        file.seek(SeekFrom::Start(offset as u64))?;
        file.write_all(&buf)?;
        Ok(())
    }

    fn append_page(&mut self, node: &Node) -> Result<i64> {
        let buf = node.encode(self.order)?;
        let file = self.file()?;
        let offset = file.seek(SeekFrom::End(0))?;
        file.write_all(&buf)?;
        Ok(offset as i64)
    }

    /// Descend to the leaf that holds (or would hold) `key`
    ///
    /// Returns the internal pages passed on the way, each with the child
    /// slot taken, so splits can walk back up without parent pointers.
    fn descend(&mut self, key: i64) -> Result<Option<(Vec<(i64, Node, usize)>, i64, Node)>> {
        let mut offset = self.header.root;
        if offset == NO_PAGE {
            return Ok(None);
        }

        let mut path = Vec::with_capacity(self.header.height as usize);
        loop {
            match self.read_page(offset)? {
                Node::Internal { keys, children } => {
                    if path.len() as u32 >= self.header.height {
                        return Err(StoreError::Structural(format!(
                            "descent deeper than tree height {}",
                            self.header.height
                        )));
                    }
                    let idx = child_index(&keys, key);
                    let child = children[idx];
                    path.push((offset, Node::Internal { keys, children }, idx));
                    offset = child;
                }
                leaf @ Node::Leaf { .. } => return Ok(Some((path, offset, leaf))),
            }
        }
    }

    pub(super) fn find_leaf(&mut self, key: i64) -> Result<Option<(i64, Node)>> {
        Ok(self.descend(key)?.map(|(_, offset, leaf)| (offset, leaf)))
    }

    /// Follow `children[0]` from the root down to the first leaf
    pub(super) fn leftmost_leaf(&mut self) -> Result<Option<(i64, Node)>> {
        let mut offset = self.header.root;
        if offset == NO_PAGE {
            return Ok(None);
        }
        for _ in 0..=self.header.height {
            match self.read_page(offset)? {
                Node::Internal { children, .. } => offset = children[0],
                leaf @ Node::Leaf { .. } => return Ok(Some((offset, leaf))),
            }
        }
        Err(StoreError::Structural(
            "no leaf reached within tree height".to_string(),
        ))
    }

    // =========================================================================
    // Insert
    // =========================================================================

    fn insert(&mut self, key: i64, value: u64) -> Result<bool> {
        let order = self.order;

        let (mut path, leaf_offset, leaf) = match self.descend(key)? {
            Some(found) => found,
            None => {
                // Step 0: the first key creates a single-leaf tree
                let root = self.append_page(&Node::Leaf {
                    keys: vec![key],
                    values: vec![value],
                    next: NO_PAGE,
                })?;
                self.header.root = root;
                self.header.height = 1;
                self.header.total_keys = 1;
                self.persist_header()?;
                return Ok(true);
            }
        };

        let (mut keys, mut values, next) = match leaf {
            Node::Leaf { keys, values, next } => (keys, values, next),
            Node::Internal { .. } => {
                return Err(StoreError::Structural(format!(
                    "descent for key {} ended on internal page {}",
                    key, leaf_offset
                )));
            }
        };

        // Step 1: sorted insert into the leaf, rejecting duplicates
        let pos = match keys.binary_search(&key) {
            Ok(_) => return Ok(false),
            Err(pos) => pos,
        };
        keys.insert(pos, key);
        values.insert(pos, value);
        self.header.total_keys += 1;

        if keys.len() <= order {
            self.write_page(leaf_offset, &Node::Leaf { keys, values, next })?;
            self.persist_header()?;
            return Ok(true);
        }

        // Step 2: split the leaf; the right sibling's first key is copied up
        let mid = (order + 1) / 2;
        let right_keys = keys.split_off(mid);
        let right_values = values.split_off(mid);
        let separator = right_keys[0];
        let right_offset = self.append_page(&Node::Leaf {
            keys: right_keys,
            values: right_values,
            next,
        })?;
        self.write_page(
            leaf_offset,
            &Node::Leaf {
                keys,
                values,
                next: right_offset,
            },
        )?;
        debug!(leaf = leaf_offset, right = right_offset, separator, "split leaf");

        // Step 3: push separators up until a parent absorbs one
        let mut carry = Some((separator, right_offset));
        while let Some((separator, right)) = carry.take() {
            let (parent_offset, parent, idx) = match path.pop() {
                Some(entry) => entry,
                None => {
                    // Root split: the only place the root pointer moves
                    let old_root = self.header.root;
                    let new_root = self.append_page(&Node::Internal {
                        keys: vec![separator],
                        children: vec![old_root, right],
                    })?;
                    self.header.root = new_root;
                    self.header.height += 1;
                    debug!(root = new_root, height = self.header.height, "grew new root");
                    break;
                }
            };

            let (mut keys, mut children) = match parent {
                Node::Internal { keys, children } => (keys, children),
                Node::Leaf { .. } => {
                    return Err(StoreError::Structural(format!(
                        "leaf {} recorded as a parent during split",
                        parent_offset
                    )));
                }
            };
            keys.insert(idx, separator);
            children.insert(idx + 1, right);

            if keys.len() <= order {
                self.write_page(parent_offset, &Node::Internal { keys, children })?;
                break;
            }

            // Internal split: keys[mid] moves up and stays in neither half
            let mid = (order + 1) / 2;
            let right_keys = keys.split_off(mid + 1);
            let promoted = keys.pop().ok_or_else(|| {
                StoreError::Structural("internal split on empty page".to_string())
            })?;
            let right_children = children.split_off(mid + 1);
            let right_offset = self.append_page(&Node::Internal {
                keys: right_keys,
                children: right_children,
            })?;
            self.write_page(parent_offset, &Node::Internal { keys, children })?;
            debug!(
                page = parent_offset,
                right = right_offset,
                promoted,
                "split internal page"
            );
            carry = Some((promoted, right_offset));
        }

        self.persist_header()?;
        Ok(true)
    }

    // =========================================================================
    // Point Operations
    // =========================================================================

    fn get(&mut self, key: i64) -> Result<Option<u64>> {
        match self.find_leaf(key)? {
            Some((_, Node::Leaf { keys, values, .. })) => {
                Ok(keys.binary_search(&key).ok().map(|i| values[i]))
            }
            _ => Ok(None),
        }
    }

    fn update(&mut self, key: i64, value: u64) -> Result<bool> {
        let (offset, mut leaf) = match self.find_leaf(key)? {
            Some(found) => found,
            None => return Ok(false),
        };
        if let Node::Leaf { keys, values, .. } = &mut leaf {
            match keys.binary_search(&key) {
                Ok(i) => values[i] = value,
                Err(_) => return Ok(false),
            }
        }
        self.write_page(offset, &leaf)?;
        Ok(true)
    }

    /// Remove from the owning leaf; underfull leaves are left as they are
    fn remove(&mut self, key: i64) -> Result<bool> {
        let (offset, mut leaf) = match self.find_leaf(key)? {
            Some(found) => found,
            None => return Ok(false),
        };
        if let Node::Leaf { keys, values, .. } = &mut leaf {
            match keys.binary_search(&key) {
                Ok(i) => {
                    keys.remove(i);
                    values.remove(i);
                }
                Err(_) => return Ok(false),
            }
        }
        self.write_page(offset, &leaf)?;
        self.header.total_keys = self.header.total_keys.saturating_sub(1);
        self.persist_header()?;
        Ok(true)
    }

    fn clear(&mut self) -> Result<()> {
        self.file()?.set_len(HEADER_SIZE as u64)?;
        self.header.root = NO_PAGE;
        self.header.height = 0;
        self.header.total_keys = 0;
        self.persist_header()
    }
}

// =============================================================================
// Verification
// =============================================================================

/// Shape of a tree, as measured by [`BPlusTree::verify`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeStats {
    pub height: u32,
    pub leaf_pages: u64,
    pub internal_pages: u64,
    pub keys: u64,
    pub max_leaf_fill: usize,
}

struct Walk {
    stats: TreeStats,
    leaves: Vec<i64>,
}

impl TreeInner {
    fn walk(
        &mut self,
        offset: i64,
        depth: u32,
        lower: Option<i64>,
        upper: Option<i64>,
        walk: &mut Walk,
    ) -> Result<()> {
        if depth > self.header.height {
            return Err(StoreError::Structural(format!(
                "page {} sits at depth {}, below tree height {}",
                offset, depth, self.header.height
            )));
        }

        let node = self.read_page(offset)?;
        let keys = node.keys();
        if keys.len() > self.order {
            return Err(StoreError::Structural(format!(
                "page {} holds {} keys, order is {}",
                offset,
                keys.len(),
                self.order
            )));
        }
        if keys.windows(2).any(|w| w[0] >= w[1]) {
            return Err(StoreError::Structural(format!(
                "page {} keys are not strictly increasing",
                offset
            )));
        }
        for &k in keys {
            let below = lower.map_or(false, |lo| k < lo);
            let above = upper.map_or(false, |hi| k >= hi);
            if below || above {
                return Err(StoreError::Structural(format!(
                    "key {} in page {} escapes its subtree bounds [{:?}, {:?})",
                    k, offset, lower, upper
                )));
            }
        }

        match node {
            Node::Leaf { keys, .. } => {
                if depth != self.header.height {
                    return Err(StoreError::Structural(format!(
                        "leaf {} at depth {}, expected {}",
                        offset, depth, self.header.height
                    )));
                }
                walk.stats.leaf_pages += 1;
                walk.stats.keys += keys.len() as u64;
                walk.stats.max_leaf_fill = walk.stats.max_leaf_fill.max(keys.len());
                walk.leaves.push(offset);
            }
            Node::Internal { keys, children } => {
                if keys.is_empty() {
                    return Err(StoreError::Structural(format!(
                        "internal page {} has no separators",
                        offset
                    )));
                }
                walk.stats.internal_pages += 1;
                for (i, &child) in children.iter().enumerate() {
                    let lo = if i == 0 { lower } else { Some(keys[i - 1]) };
                    let hi = if i == keys.len() { upper } else { Some(keys[i]) };
                    self.walk(child, depth + 1, lo, hi, walk)?;
                }
            }
        }
        Ok(())
    }

    fn verify(&mut self) -> Result<TreeStats> {
        let root = self.header.root;
        if root == NO_PAGE {
            if self.header.height != 0 || self.header.total_keys != 0 {
                return Err(StoreError::Structural(format!(
                    "empty tree claims height {} and {} keys",
                    self.header.height, self.header.total_keys
                )));
            }
            return Ok(TreeStats::default());
        }

        let mut walk = Walk {
            stats: TreeStats {
                height: self.header.height,
                ..TreeStats::default()
            },
            leaves: Vec::new(),
        };
        self.walk(root, 1, None, None, &mut walk)?;

        // The leaf chain must visit exactly the in-order leaves
        let mut chained = Vec::with_capacity(walk.leaves.len());
        let mut offset = walk.leaves[0];
        while offset != NO_PAGE {
            if chained.len() > walk.leaves.len() {
                return Err(StoreError::Structural(
                    "leaf chain is longer than the tree (cycle?)".to_string(),
                ));
            }
            chained.push(offset);
            offset = match self.read_page(offset)? {
                Node::Leaf { next, .. } => next,
                Node::Internal { .. } => {
                    return Err(StoreError::Structural(format!(
                        "leaf chain reaches internal page {}",
                        offset
                    )));
                }
            };
        }
        if chained != walk.leaves {
            return Err(StoreError::Structural(
                "leaf chain disagrees with in-order traversal".to_string(),
            ));
        }

        if walk.stats.keys != self.header.total_keys {
            return Err(StoreError::Structural(format!(
                "header counts {} keys, leaves hold {}",
                self.header.total_keys, walk.stats.keys
            )));
        }
        Ok(walk.stats)
    }
}

// =============================================================================
// Public Handle
// =============================================================================

/// A B+ tree index file
pub struct BPlusTree {
    path: PathBuf,
    order: usize,
    inner: Mutex<TreeInner>,
}

impl BPlusTree {
    /// Open (or create) a tree
    ///
    /// An existing file keeps the order recorded in its header, since page
    /// size depends on it; `settings.btree_order` only applies to new files.
    pub fn open(path: impl AsRef<Path>, settings: IndexSettings) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if settings.btree_order < MIN_BTREE_ORDER {
            return Err(StoreError::Config(format!(
                "btree_order must be at least {}, got {}",
                MIN_BTREE_ORDER, settings.btree_order
            )));
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;
        let (header, fresh) = header::init_or_load(&mut file, settings.format_version, || {
            BTreeHeader::new(settings.format_version, settings.btree_order as u32)
        })?;

        let order = header.order as usize;
        if order < MIN_BTREE_ORDER {
            return Err(StoreError::Corrupt(format!(
                "B+ tree header records order {}",
                order
            )));
        }
        if !fresh && order != settings.btree_order {
            debug!(
                path = %path.display(),
                stored = order,
                configured = settings.btree_order,
                "using order recorded in existing B+ tree"
            );
        }
        debug!(
            path = %path.display(),
            fresh,
            order,
            height = header.height,
            keys = header.total_keys,
            "opened B+ tree"
        );

        Ok(Self {
            path,
            order,
            inner: Mutex::new(TreeInner {
                file: Some(file),
                header,
                order,
            }),
        })
    }

    pub fn order(&self) -> usize {
        self.order
    }

    /// Number of page levels, 0 when empty
    pub fn height(&self) -> u32 {
        self.inner.lock().header.height
    }

    pub fn header(&self) -> BTreeHeader {
        self.inner.lock().header
    }

    /// Every entry in key order, following the leaf chain
    pub fn iter(&self) -> Result<Cursor<'_>> {
        Cursor::new(self.inner.lock(), Bound::Unbounded, Bound::Unbounded)
    }

    /// Entries within `bounds` in key order
    pub fn scan_range(&self, bounds: impl RangeBounds<i64>) -> Result<Cursor<'_>> {
        Cursor::new(
            self.inner.lock(),
            bounds.start_bound().cloned(),
            bounds.end_bound().cloned(),
        )
    }

    /// Walk the whole tree and check every structural invariant
    pub fn verify(&self) -> Result<TreeStats> {
        self.inner.lock().verify()
    }
}

impl Index for BPlusTree {
    fn kind(&self) -> IndexKind {
        IndexKind::BPlusTree
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn get(&self, key: i64) -> Result<Option<u64>> {
        self.inner.lock().get(key)
    }

    fn insert(&self, key: i64, offset: u64) -> Result<bool> {
        self.inner.lock().insert(key, offset)
    }

    fn update(&self, key: i64, offset: u64) -> Result<bool> {
        self.inner.lock().update(key, offset)
    }

    fn remove(&self, key: i64) -> Result<bool> {
        self.inner.lock().remove(key)
    }

    fn len(&self) -> Result<u64> {
        let mut inner = self.inner.lock();
        inner.file()?;
        Ok(inner.header.total_keys)
    }

    fn clear(&self) -> Result<()> {
        self.inner.lock().clear()
    }

    fn range(&self, lower: Bound<i64>, upper: Bound<i64>) -> Result<Option<Vec<IndexEntry>>> {
        let entries = self.scan_range((lower, upper))?.collect::<Result<Vec<_>>>()?;
        Ok(Some(entries))
    }

    fn source_generation(&self) -> Result<u32> {
        let mut inner = self.inner.lock();
        inner.file()?;
        Ok(inner.header.source_generation)
    }

    fn set_source_generation(&self, generation: u32) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.header.source_generation = generation;
        inner.persist_header()
    }

    fn close(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if let Some(mut file) = inner.file.take() {
            file.flush()?;
            debug!(path = %self.path.display(), "closed B+ tree");
        }
        Ok(())
    }
}
