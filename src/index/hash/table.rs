//! Disk-resident extensible hash
//!
//! Nothing but the header is cached: a lookup reads one directory slot and
//! one bucket. Directory doubling appends the doubled directory at
//! end-of-file and repoints the header, so bucket bytes are never
//! overwritten by a growing directory.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::ops::Bound;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::debug;

use crate::codec::{decode_u64, encode_u64};
use crate::config::IndexSettings;
use crate::error::{Result, StoreError};
use crate::header::{self, HashHeader, HEADER_SIZE};
use crate::index::{Index, IndexEntry, IndexKind};

use super::bucket::{bucket_size, Bucket};

/// Deepest directory this index will grow to (2^24 slots, 128 MiB)
pub const MAX_GLOBAL_DEPTH: u32 = 24;

const SLOT_SIZE: u64 = 8;

/// Bucket hash of a key: the splitmix64 finalizer
///
/// Every input bit reaches the low bits the directory masks, so keys that
/// differ only in their high bits still spread across buckets.
pub fn hash_key(key: i64) -> u64 {
    let mut z = key as u64;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

fn low_bits(depth: u32) -> u64 {
    (1u64 << depth) - 1
}

// =============================================================================
// Locked State
// =============================================================================

struct HashInner {
    file: Option<File>,
    header: HashHeader,
    capacity: usize,
}

impl HashInner {
    fn file(&mut self) -> Result<&mut File> {
        self.file.as_mut().ok_or(StoreError::Closed("extensible hash"))
    }

    fn persist_header(&mut self) -> Result<()> {
        let header = self.header;
        header::write_header(self.file()?, &header)
    }

    fn append_bytes(&mut self, bytes: &[u8]) -> Result<u64> {
        let file = self.file()?;
        let offset = file.seek(SeekFrom::End(0))?;
        file.write_all(bytes)?;
        Ok(offset)
    }

    // -------------------------------------------------------------------------
    // Directory
    // -------------------------------------------------------------------------

    fn read_slot(&mut self, slot: u64) -> Result<u64> {
        let at = self.header.directory_offset + slot * SLOT_SIZE;
        let mut raw = [0u8; 8];
        let file = self.file()?;
        file.seek(SeekFrom::Start(at))?;
        file.read_exact(&mut raw)?;
        Ok(decode_u64(&raw, 0)?.value)
    }

    fn write_slot(&mut self, slot: u64, bucket: u64) -> Result<()> {
        let at = self.header.directory_offset + slot * SLOT_SIZE;
        let file = self.file()?;
        file.seek(SeekFrom::Start(at))?;
        file.write_all(&encode_u64(bucket))?;
        Ok(())
    }

    fn read_directory(&mut self) -> Result<Vec<u64>> {
        let slots = 1usize << self.header.global_depth;
        let mut raw = vec![0u8; slots * SLOT_SIZE as usize];
        let at = self.header.directory_offset;
        let file = self.file()?;
        file.seek(SeekFrom::Start(at))?;
        file.read_exact(&mut raw)?;

        let mut directory = Vec::with_capacity(slots);
        for i in 0..slots {
            directory.push(decode_u64(&raw, i * SLOT_SIZE as usize)?.value);
        }
        Ok(directory)
    }

    fn encode_directory(directory: &[u64]) -> Vec<u8> {
        let mut raw = Vec::with_capacity(directory.len() * SLOT_SIZE as usize);
        for slot in directory {
            raw.extend_from_slice(&encode_u64(*slot));
        }
        raw
    }

    // -------------------------------------------------------------------------
    // Buckets
    // -------------------------------------------------------------------------

    fn read_bucket(&mut self, offset: u64) -> Result<Bucket> {
        if offset < HEADER_SIZE as u64 {
            return Err(StoreError::Corrupt(format!(
                "bucket pointer {} points into the header",
                offset
            )));
        }
        let capacity = self.capacity;
        let mut raw = vec![0u8; bucket_size(capacity)];
        let file = self.file()?;
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut raw)?;
        Bucket::decode(&raw, capacity, offset)
    }

    fn write_bucket(&mut self, offset: u64, bucket: &Bucket) -> Result<()> {
        let raw = bucket.encode(self.capacity)?;
        let file = self.file()?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(&raw)?;
        Ok(())
    }

    /// Lay out a fresh index: depth-1 directory at 128, then two empty buckets
    fn initialize(&mut self) -> Result<()> {
        self.file()?.set_len(HEADER_SIZE as u64)?;

        let directory_offset = HEADER_SIZE as u64;
        let first = directory_offset + 2 * SLOT_SIZE;
        let second = first + bucket_size(self.capacity) as u64;

        let mut raw = Self::encode_directory(&[first, second]);
        raw.extend_from_slice(&Bucket::new(1).encode(self.capacity)?);
        raw.extend_from_slice(&Bucket::new(1).encode(self.capacity)?);
        self.append_bytes(&raw)?;

        self.header.global_depth = 1;
        self.header.directory_offset = directory_offset;
        self.header.total_keys = 0;
        self.persist_header()
    }

    fn locate(&mut self, key: i64) -> Result<(u64, Bucket)> {
        let slot = hash_key(key) & low_bits(self.header.global_depth);
        let offset = self.read_slot(slot)?;
        let bucket = self.read_bucket(offset)?;
        Ok((offset, bucket))
    }

    // -------------------------------------------------------------------------
    // Growth
    // -------------------------------------------------------------------------

    /// Whether splitting `bucket` down to `MAX_GLOBAL_DEPTH` bits frees a
    /// place for `key`; checked before any doubling or split is written
    fn separable(bucket: &Bucket, key: i64, capacity: usize) -> bool {
        let mask = low_bits(MAX_GLOBAL_DEPTH);
        let target = hash_key(key) & mask;
        let sharing = bucket
            .entries
            .iter()
            .filter(|(other, _)| hash_key(*other) & mask == target)
            .count();
        sharing < capacity
    }

    /// Mirror every slot into a new upper half; buckets are untouched
    fn double_directory(&mut self) -> Result<()> {
        if self.header.global_depth >= MAX_GLOBAL_DEPTH {
            return Err(StoreError::Capacity(format!(
                "extensible hash directory already at depth {}",
                MAX_GLOBAL_DEPTH
            )));
        }

        let mut directory = self.read_directory()?;
        directory.extend_from_within(..);
        let offset = self.append_bytes(&Self::encode_directory(&directory))?;

        self.header.directory_offset = offset;
        self.header.global_depth += 1;
        self.persist_header()?;
        debug!(
            global_depth = self.header.global_depth,
            directory_offset = offset,
            "doubled hash directory"
        );
        Ok(())
    }

    /// Split a full bucket on its next hash bit and repoint the slots that
    /// now address the new half
    fn split_bucket(&mut self, offset: u64, bucket: Bucket) -> Result<()> {
        let local = bucket.local_depth + 1;
        if local > self.header.global_depth {
            return Err(StoreError::Structural(format!(
                "split would give bucket {} depth {} above global depth {}",
                offset, local, self.header.global_depth
            )));
        }
        let bit = 1u64 << (local - 1);

        let (moved, kept): (Vec<_>, Vec<_>) = bucket
            .entries
            .into_iter()
            .partition(|(key, _)| hash_key(*key) & bit != 0);

        let sibling = Bucket {
            local_depth: local,
            entries: moved,
        };
        let sibling_offset = self.append_bytes(&sibling.encode(self.capacity)?)?;
        self.write_bucket(
            offset,
            &Bucket {
                local_depth: local,
                entries: kept,
            },
        )?;

        let directory = self.read_directory()?;
        let mut repointed = 0;
        for (slot, target) in directory.iter().enumerate() {
            if *target == offset && (slot as u64) & bit != 0 {
                self.write_slot(slot as u64, sibling_offset)?;
                repointed += 1;
            }
        }
        debug!(
            bucket = offset,
            sibling = sibling_offset,
            local_depth = local,
            repointed,
            "split hash bucket"
        );
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Operations
    // -------------------------------------------------------------------------

    fn get(&mut self, key: i64) -> Result<Option<u64>> {
        let (_, bucket) = self.locate(key)?;
        Ok(bucket.position(key).map(|i| bucket.entries[i].1))
    }

    fn insert(&mut self, key: i64, value: u64) -> Result<bool> {
        // May take several splits when entries keep sharing the next bit
        loop {
            let (offset, mut bucket) = self.locate(key)?;
            if bucket.position(key).is_some() {
                return Ok(false);
            }

            if bucket.entries.len() < self.capacity {
                bucket.entries.push((key, value));
                self.write_bucket(offset, &bucket)?;
                self.header.total_keys += 1;
                self.persist_header()?;
                return Ok(true);
            }

            if !Self::separable(&bucket, key, self.capacity) {
                return Err(StoreError::Capacity(format!(
                    "key {} shares its low {} hash bits with a full bucket",
                    key, MAX_GLOBAL_DEPTH
                )));
            }
            if bucket.local_depth > self.header.global_depth {
                return Err(StoreError::Structural(format!(
                    "bucket {} local depth {} exceeds global depth {}",
                    offset, bucket.local_depth, self.header.global_depth
                )));
            }
            if bucket.local_depth == self.header.global_depth {
                self.double_directory()?;
            }
            self.split_bucket(offset, bucket)?;
        }
    }

    fn update(&mut self, key: i64, value: u64) -> Result<bool> {
        let (offset, mut bucket) = self.locate(key)?;
        match bucket.position(key) {
            Some(i) => {
                bucket.entries[i].1 = value;
                self.write_bucket(offset, &bucket)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Remove an entry; buckets are never merged and the directory never shrinks
    fn remove(&mut self, key: i64) -> Result<bool> {
        let (offset, mut bucket) = self.locate(key)?;
        match bucket.position(key) {
            Some(i) => {
                bucket.entries.swap_remove(i);
                self.write_bucket(offset, &bucket)?;
                self.header.total_keys = self.header.total_keys.saturating_sub(1);
                self.persist_header()?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn verify(&mut self) -> Result<HashStats> {
        let depth = self.header.global_depth;
        let directory = self.read_directory()?;
        if directory.len() as u64 != 1u64 << depth {
            return Err(StoreError::Structural(format!(
                "directory has {} slots at global depth {}",
                directory.len(),
                depth
            )));
        }

        let mut referrers: BTreeMap<u64, Vec<u64>> = BTreeMap::new();
        for (slot, target) in directory.iter().enumerate() {
            referrers.entry(*target).or_default().push(slot as u64);
        }

        let mut stats = HashStats {
            global_depth: depth,
            directory_len: directory.len() as u64,
            ..HashStats::default()
        };

        for (offset, slots) in referrers {
            let bucket = self.read_bucket(offset)?;
            let local = bucket.local_depth;
            if local > depth || local == 0 {
                return Err(StoreError::Structural(format!(
                    "bucket {} has local depth {} (global {})",
                    offset, local, depth
                )));
            }

            let expected = 1u64 << (depth - local);
            if slots.len() as u64 != expected {
                return Err(StoreError::Structural(format!(
                    "bucket {} at local depth {} is referenced by {} slots, expected {}",
                    offset,
                    local,
                    slots.len(),
                    expected
                )));
            }

            let prefix = slots[0] & low_bits(local);
            if slots.iter().any(|s| s & low_bits(local) != prefix) {
                return Err(StoreError::Structural(format!(
                    "bucket {} is referenced by slots with different {}-bit prefixes",
                    offset, local
                )));
            }

            for (i, (key, _)) in bucket.entries.iter().enumerate() {
                if hash_key(*key) & low_bits(local) != prefix {
                    return Err(StoreError::Structural(format!(
                        "key {} stored in bucket {} that its hash does not address",
                        key, offset
                    )));
                }
                if bucket.entries[..i].iter().any(|(k, _)| k == key) {
                    return Err(StoreError::Structural(format!(
                        "key {} appears twice in bucket {}",
                        key, offset
                    )));
                }
            }

            stats.buckets += 1;
            stats.keys += bucket.entries.len() as u64;
            stats.max_local_depth = stats.max_local_depth.max(local);
        }

        if stats.keys != self.header.total_keys {
            return Err(StoreError::Structural(format!(
                "header counts {} keys, buckets hold {}",
                self.header.total_keys, stats.keys
            )));
        }
        Ok(stats)
    }
}

/// Shape of a hash index, as measured by [`ExtensibleHash::verify`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HashStats {
    pub global_depth: u32,
    pub directory_len: u64,
    pub buckets: u64,
    pub keys: u64,
    pub max_local_depth: u32,
}

// =============================================================================
// Public Handle
// =============================================================================

/// An extensible hash index file
pub struct ExtensibleHash {
    path: PathBuf,
    capacity: usize,
    inner: Mutex<HashInner>,
}

impl ExtensibleHash {
    /// Open (or create) a hash index
    ///
    /// An existing file keeps the bucket capacity recorded in its header.
    pub fn open(path: impl AsRef<Path>, settings: IndexSettings) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if settings.hash_bucket_capacity == 0 {
            return Err(StoreError::Config(
                "hash_bucket_capacity must be at least 1".to_string(),
            ));
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;
        let (header, fresh) = header::init_or_load(&mut file, settings.format_version, || {
            HashHeader::new(
                settings.format_version,
                settings.hash_bucket_capacity as u32,
                HEADER_SIZE as u64,
            )
        })?;

        let capacity = header.bucket_capacity as usize;
        if capacity == 0 {
            return Err(StoreError::Corrupt(
                "extensible hash header records bucket capacity 0".to_string(),
            ));
        }
        if header.global_depth > MAX_GLOBAL_DEPTH {
            return Err(StoreError::Corrupt(format!(
                "extensible hash header records global depth {}",
                header.global_depth
            )));
        }

        let mut inner = HashInner {
            file: Some(file),
            header,
            capacity,
        };
        if fresh {
            inner.initialize()?;
        }
        debug!(
            path = %path.display(),
            fresh,
            capacity,
            global_depth = inner.header.global_depth,
            keys = inner.header.total_keys,
            "opened extensible hash"
        );

        Ok(Self {
            path,
            capacity,
            inner: Mutex::new(inner),
        })
    }

    pub fn bucket_capacity(&self) -> usize {
        self.capacity
    }

    pub fn global_depth(&self) -> u32 {
        self.inner.lock().header.global_depth
    }

    pub fn header(&self) -> HashHeader {
        self.inner.lock().header
    }

    /// Current directory: `directory[i]` is the bucket offset for slot `i`
    pub fn directory(&self) -> Result<Vec<u64>> {
        self.inner.lock().read_directory()
    }

    /// Check the directory/bucket invariants over the whole file
    pub fn verify(&self) -> Result<HashStats> {
        self.inner.lock().verify()
    }
}

impl Index for ExtensibleHash {
    fn kind(&self) -> IndexKind {
        IndexKind::ExtensibleHash
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
        self.inner.lock().initialize()
    }

    /// Hash order is not key order
    fn range(&self, _lower: Bound<i64>, _upper: Bound<i64>) -> Result<Option<Vec<IndexEntry>>> {
        Ok(None)
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
            debug!(path = %self.path.display(), "closed extensible hash");
        }
        Ok(())
    }
}
