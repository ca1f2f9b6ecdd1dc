//! Table
//!
//! Generic data-access object over one record store and one index.
//!
//! ## Responsibilities
//! - Turn entities into payloads through the codec, in their fixed field order
//! - Keep the index pointing at the single active record of every key
//! - Resolve natural-key hash collisions with a linear scan
//! - Rebuild the index when it is empty or stale, and run vacuum
//!
//! ## Write Path
//! ```text
//!   create/update/delete
//!        │  (table lock, exclusive)
//!        ▼
//!   RecordStore ──► offset ──► Index insert / update / remove
//! ```
//!
//! Reads go the other way under the shared side of the same lock:
//! Index ──► offset ──► RecordStore ──► decode.

use std::marker::PhantomData;
use std::ops::RangeBounds;
use std::path::Path;

use bytes::Bytes;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::codec::{PayloadBuilder, PayloadReader};
use crate::config::IndexSettings;
use crate::entity::{same_natural_key, Entity, KeyScheme, Lookup};
use crate::error::{Result, StoreError};
use crate::index::{open_index, Index, IndexKind};
use crate::store::RecordStore;
use crate::vacuum::{self, VacuumReport};

/// Counters describing one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableStats {
    pub name: String,
    pub index: IndexKind,
    pub active_records: u64,
    pub index_keys: u64,
    pub next_id: i64,
    pub generation: u32,
    pub data_bytes: u64,
}

/// An entity found through the index or a scan
struct Located<E> {
    offset: u64,
    key: i64,
    entity: E,
}

/// A typed table: `<name>.dat` plus `<name>.dat.idx` or `<name>.dat.hash`
pub struct Table<E: Entity> {
    name: String,
    store: RecordStore,
    index: Box<dyn Index>,
    settings: IndexSettings,
    /// Writers hold it exclusively across multi-step store + index
    /// mutations; readers share it so they never see a half-applied one
    lock: RwLock<()>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Table<E> {
    /// Open (or create) the table whose data file is `data_path`
    ///
    /// On open:
    /// 1. Settle temp files left by an interrupted vacuum
    /// 2. Open the store and the index
    /// 3. Rebuild the index if its generation differs from the store's
    /// 4. Otherwise rebuild it if it is empty while the store is not
    pub fn open(
        data_path: impl AsRef<Path>,
        kind: IndexKind,
        settings: IndexSettings,
    ) -> Result<Self> {
        let data_path = data_path.as_ref();
        vacuum::recover_table_files(data_path)?;

        let name = data_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let store = RecordStore::open(data_path, settings.format_version)?;
        let index = open_index(kind, &kind.index_path(data_path), settings)?;

        let table = Self {
            name,
            store,
            index,
            settings,
            lock: RwLock::new(()),
            _entity: PhantomData,
        };

        let store_generation = table.store.generation();
        let index_generation = table.index.source_generation()?;
        if store_generation != index_generation {
            warn!(
                table = %table.name,
                store_generation,
                index_generation,
                "index was built from another generation, rebuilding"
            );
            table.rebuild_index()?;
        } else {
            table.rebuild_if_empty()?;
        }
        Ok(table)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index_kind(&self) -> IndexKind {
        self.index.kind()
    }

    pub fn data_path(&self) -> &Path {
        self.store.path()
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn index(&self) -> &dyn Index {
        self.index.as_ref()
    }

    // =========================================================================
    // Payload Mapping
    // =========================================================================

    fn encode(entity: &E) -> Result<Bytes> {
        let mut out = PayloadBuilder::new();
        entity.encode(&mut out)?;
        Ok(out.finish())
    }

    fn decode(key: i64, payload: &[u8]) -> Result<E> {
        let mut input = PayloadReader::new(payload);
        let entity = E::decode(key, &mut input)?;
        input.expect_end()?;
        Ok(entity)
    }

    fn natural_key_of(entity: &E) -> Result<String> {
        entity.natural_key().map(str::to_owned).ok_or_else(|| {
            StoreError::InvalidArgument("natural-key entity has no natural key".to_string())
        })
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    fn locate(&self, lookup: Lookup<'_>) -> Result<Option<Located<E>>> {
        match (lookup, E::KEY_SCHEME) {
            (Lookup::Id(key), _) => self.locate_key(key),
            (Lookup::Natural(natural), KeyScheme::NaturalKey) => self.locate_natural(natural),
            (Lookup::Natural(_), KeyScheme::Sequential) => Err(StoreError::InvalidArgument(
                format!("table '{}' is keyed by id, not by natural key", self.name),
            )),
        }
    }

    fn locate_key(&self, key: i64) -> Result<Option<Located<E>>> {
        let offset = match self.index.get(key)? {
            Some(offset) => offset,
            None => return Ok(None),
        };
        match self.store.read_record(offset)? {
            Some(record) => Ok(Some(Located {
                offset,
                key: record.key,
                entity: Self::decode(record.key, &record.payload)?,
            })),
            None => {
                warn!(table = %self.name, key, offset, "index points at a tombstoned record");
                Ok(None)
            }
        }
    }

    /// Index first; on a derived-key collision, scan the records sharing the key
    fn locate_natural(&self, natural: &str) -> Result<Option<Located<E>>> {
        let key = E::derive_key(natural);
        let indexed = match self.locate_key(key)? {
            Some(found) => found,
            None => return Ok(None),
        };

        let matches = indexed
            .entity
            .natural_key()
            .map_or(false, |n| same_natural_key(n, natural));
        if matches {
            return Ok(Some(indexed));
        }

        debug!(table = %self.name, key, "derived key collision, falling back to scan");
        for record in self.store.scan()?.active() {
            let record = record?;
            if record.key != key || record.offset == indexed.offset {
                continue;
            }
            let entity = Self::decode(record.key, &record.payload)?;
            if entity
                .natural_key()
                .map_or(false, |n| same_natural_key(n, natural))
            {
                return Ok(Some(Located {
                    offset: record.offset,
                    key,
                    entity,
                }));
            }
        }
        Ok(None)
    }

    // =========================================================================
    // CRUD
    // =========================================================================

    /// Store a new entity and return it with its key set
    ///
    /// Returns `None` for a natural-key entity whose key is already taken.
    pub fn create(&self, mut entity: E) -> Result<Option<E>> {
        let _guard = self.lock.write();

        match E::KEY_SCHEME {
            KeyScheme::Sequential => {
                let key = self.store.allocate_id()?;
                entity.set_key(key);
                let payload = Self::encode(&entity)?;
                let offset = self.store.append(key, &payload)?;
                if !self.index.insert(key, offset)? {
                    return Err(StoreError::Structural(format!(
                        "freshly allocated id {} is already indexed in '{}'",
                        key, self.name
                    )));
                }
            }
            KeyScheme::NaturalKey => {
                let natural = Self::natural_key_of(&entity)?;
                if self.locate_natural(&natural)?.is_some() {
                    return Ok(None);
                }
                let key = E::derive_key(&natural);
                entity.set_key(key);
                let payload = Self::encode(&entity)?;
                let offset = self.store.append(key, &payload)?;
                if !self.index.insert(key, offset)? {
                    debug!(
                        table = %self.name,
                        key,
                        offset,
                        "derived key already indexed, record reachable by scan"
                    );
                }
            }
        }
        Ok(Some(entity))
    }

    pub fn read<'k>(&self, lookup: impl Into<Lookup<'k>>) -> Result<Option<E>> {
        let _guard = self.lock.read();
        Ok(self.locate(lookup.into())?.map(|found| found.entity))
    }

    /// Overwrite the stored entity; `false` if it does not exist
    ///
    /// A payload of the same length is rewritten in place. Otherwise the
    /// record moves to the end of the store and the index follows it.
    pub fn update(&self, entity: &E) -> Result<bool> {
        let _guard = self.lock.write();

        let found = match E::KEY_SCHEME {
            KeyScheme::Sequential => self.locate_key(entity.key())?,
            KeyScheme::NaturalKey => self.locate_natural(&Self::natural_key_of(entity)?)?,
        };
        let found = match found {
            Some(found) => found,
            None => return Ok(false),
        };

        let payload = Self::encode(entity)?;
        let offset = self.store.update_at(found.offset, &payload)?;
        if offset != found.offset && self.index.get(found.key)? == Some(found.offset) {
            self.index.update(found.key, offset)?;
        }
        Ok(true)
    }

    /// Tombstone the entity; `false` if it does not exist
    pub fn delete<'k>(&self, lookup: impl Into<Lookup<'k>>) -> Result<bool> {
        let _guard = self.lock.write();

        let found = match self.locate(lookup.into())? {
            Some(found) => found,
            None => return Ok(false),
        };

        self.store.tombstone(found.offset)?;
        if self.index.get(found.key)? == Some(found.offset) {
            self.index.remove(found.key)?;
            if E::KEY_SCHEME == KeyScheme::NaturalKey {
                self.reindex_collision(found.key)?;
            }
        }
        Ok(true)
    }

    /// Hand a freed derived key to another active record that shares it
    fn reindex_collision(&self, key: i64) -> Result<()> {
        let mut survivor = None;
        for record in self.store.scan()?.active() {
            let record = record?;
            if record.key == key {
                survivor = Some(record.offset);
                break;
            }
        }
        if let Some(offset) = survivor {
            debug!(table = %self.name, key, offset, "reindexing colliding record");
            self.index.insert(key, offset)?;
        }
        Ok(())
    }

    // =========================================================================
    // Listing
    // =========================================================================

    /// Every active entity, in physical order
    pub fn list_all_active(&self) -> Result<Vec<E>> {
        let _guard = self.lock.read();
        let records = self.store.scan()?.active().collect::<Result<Vec<_>>>()?;
        records
            .iter()
            .map(|r| Self::decode(r.key, &r.payload))
            .collect()
    }

    /// Entities whose keys fall in `range`, in key order
    ///
    /// `None` when the table's index cannot answer ordered queries.
    pub fn list_range(&self, range: impl RangeBounds<i64>) -> Result<Option<Vec<E>>> {
        let _guard = self.lock.read();
        let entries = match self
            .index
            .range(range.start_bound().cloned(), range.end_bound().cloned())?
        {
            Some(entries) => entries,
            None => return Ok(None),
        };

        let mut out = Vec::with_capacity(entries.len());
        for entry in entries {
            if let Some(record) = self.store.read_record(entry.offset)? {
                out.push(Self::decode(record.key, &record.payload)?);
            }
        }
        Ok(Some(out))
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Rebuild the index from a scan if it is empty but the store is not
    pub fn rebuild_if_empty(&self) -> Result<bool> {
        let _guard = self.lock.write();
        if !self.index.is_empty()? {
            return Ok(false);
        }
        let has_active = self.store.scan()?.active().next().transpose()?.is_some();
        if !has_active {
            return Ok(false);
        }
        self.rebuild_locked()?;
        Ok(true)
    }

    /// Clear and repopulate the index from a full scan
    pub fn rebuild_index(&self) -> Result<u64> {
        let _guard = self.lock.write();
        self.rebuild_locked()
    }

    fn rebuild_locked(&self) -> Result<u64> {
        self.index.clear()?;

        let entries = self
            .store
            .scan()?
            .active()
            .map(|r| r.map(|r| (r.key, r.offset)))
            .collect::<Result<Vec<_>>>()?;

        // First record per key wins; later ones stay reachable by scan
        let mut indexed = 0u64;
        for (key, offset) in entries {
            if self.index.insert(key, offset)? {
                indexed += 1;
            }
        }

        self.index.set_source_generation(self.store.generation())?;
        let active = self.store.recount()?;
        info!(table = %self.name, indexed, active, "rebuilt index from scan");
        Ok(indexed)
    }

    /// Compact the store and rebuild the index
    pub fn vacuum(&mut self) -> Result<VacuumReport> {
        vacuum::vacuum(&mut self.store, &mut self.index, self.settings)
    }

    pub fn stats(&self) -> Result<TableStats> {
        let _guard = self.lock.read();
        let header = self.store.header();
        Ok(TableStats {
            name: self.name.clone(),
            index: self.index.kind(),
            active_records: header.active_count,
            index_keys: self.index.len()?,
            next_id: header.next_id,
            generation: header.generation,
            data_bytes: self.store.file_len()?,
        })
    }

    /// Release both files; later calls fail with `Closed`
    pub fn close(&self) -> Result<()> {
        let _guard = self.lock.write();
        self.store.close()?;
        self.index.close()
    }
}
