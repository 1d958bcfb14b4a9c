//! Record storage backends.
//!
//! `MemoryCacheStore`: LRU table bounded by record count and weighed bytes.
//! `DualCacheStore`: a primary store layered over a secondary one.
//! The disk-backed store lives in `disk.rs`.

use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::Mutex;

use indexmap::IndexMap;
use lru::LruCache;
use metrics::counter;
use tracing::debug;

use super::config::CacheConfig;
use super::error::StoreError;
use super::lock::mutex_lock;
use super::record::Record;
use super::weigher::weigh;

const SOURCE: &str = "cache::store";

pub(crate) const METRIC_STORE_HIT: &str = "gqlstore_store_hit_total";
pub(crate) const METRIC_STORE_MISS: &str = "gqlstore_store_miss_total";
pub(crate) const METRIC_STORE_EVICT: &str = "gqlstore_store_evict_total";

/// Backing table for normalized records.
///
/// Implementations are not synchronized for writes; the cache facade holds
/// them behind one read/write lock, so `&mut self` methods run exclusively.
pub trait CacheStore: Send + Sync {
    fn load_record(&self, key: &str) -> Result<Option<Record>, StoreError>;

    /// Load every record in `keys` that exists; missing keys are skipped.
    fn load_records(&self, keys: &[String]) -> Result<Vec<Record>, StoreError> {
        let mut records = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(record) = self.load_record(key)? {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Merge one record and return the fully-qualified keys that changed.
    fn merge(&mut self, record: Record) -> Result<HashSet<String>, StoreError>;

    /// Merge many records; the changed keys are the union of each merge.
    fn merge_all(&mut self, records: Vec<Record>) -> Result<HashSet<String>, StoreError> {
        let mut changed = HashSet::new();
        for record in records {
            changed.extend(self.merge(record)?);
        }
        Ok(changed)
    }

    /// Drop a single record. Returns whether it existed.
    fn remove_record(&mut self, key: &str) -> Result<bool, StoreError>;

    /// Drop a record and, with `cascade`, every record reachable through its
    /// references. Returns whether the root record existed.
    fn remove(&mut self, key: &str, cascade: bool) -> Result<bool, StoreError> {
        if !cascade {
            return self.remove_record(key);
        }
        let mut visited = HashSet::new();
        let mut pending = vec![key.to_string()];
        let mut root_existed = false;
        while let Some(next) = pending.pop() {
            if !visited.insert(next.clone()) {
                continue;
            }
            if let Some(record) = self.load_record(&next)? {
                pending.extend(record.references().iter().map(|r| r.key().to_string()));
            }
            let existed = self.remove_record(&next)?;
            if next == key {
                root_existed = existed;
            }
        }
        Ok(root_existed)
    }

    fn clear_all(&mut self) -> Result<(), StoreError>;

    /// Every stored record.
    fn dump(&self) -> Result<Vec<Record>, StoreError>;
}

impl<S: CacheStore + ?Sized> CacheStore for Box<S> {
    fn load_record(&self, key: &str) -> Result<Option<Record>, StoreError> {
        (**self).load_record(key)
    }

    fn load_records(&self, keys: &[String]) -> Result<Vec<Record>, StoreError> {
        (**self).load_records(keys)
    }

    fn merge(&mut self, record: Record) -> Result<HashSet<String>, StoreError> {
        (**self).merge(record)
    }

    fn merge_all(&mut self, records: Vec<Record>) -> Result<HashSet<String>, StoreError> {
        (**self).merge_all(records)
    }

    fn remove_record(&mut self, key: &str) -> Result<bool, StoreError> {
        (**self).remove_record(key)
    }

    fn remove(&mut self, key: &str, cascade: bool) -> Result<bool, StoreError> {
        (**self).remove(key, cascade)
    }

    fn clear_all(&mut self) -> Result<(), StoreError> {
        (**self).clear_all()
    }

    fn dump(&self) -> Result<Vec<Record>, StoreError> {
        (**self).dump()
    }
}

// ============================================================================
// Memory store
// ============================================================================

struct MemoryState {
    records: LruCache<String, Record>,
    weight: usize,
}

/// In-memory LRU store.
///
/// Reads refresh recency, so the table sits behind its own mutex and loads
/// work under the facade's shared read lock.
pub struct MemoryCacheStore {
    state: Mutex<MemoryState>,
    max_bytes: Option<NonZeroUsize>,
}

impl MemoryCacheStore {
    /// Store without any bound.
    pub fn unbounded() -> Self {
        Self::with_limits(None, None)
    }

    pub fn new(config: &CacheConfig) -> Self {
        Self::with_limits(config.memory_record_limit(), config.memory_byte_limit())
    }

    pub fn with_limits(max_records: Option<NonZeroUsize>, max_bytes: Option<NonZeroUsize>) -> Self {
        let records = match max_records {
            Some(limit) => LruCache::new(limit),
            None => LruCache::unbounded(),
        };
        Self {
            state: Mutex::new(MemoryState { records, weight: 0 }),
            max_bytes,
        }
    }

    /// Weighed size of everything stored.
    pub fn weight(&self) -> usize {
        mutex_lock(&self.state, SOURCE, "weight").weight
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.state, SOURCE, "len").records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn evict_over_budget(&self, state: &mut MemoryState) {
        let Some(max_bytes) = self.max_bytes else {
            return;
        };
        // The most recently merged record always stays, even when oversized.
        while state.weight > max_bytes.get() && state.records.len() > 1 {
            let Some((key, evicted)) = state.records.pop_lru() else {
                break;
            };
            state.weight = state.weight.saturating_sub(weigh(&evicted));
            counter!(METRIC_STORE_EVICT, "store" => "memory", "reason" => "bytes").increment(1);
            debug!(key = %key, weight = state.weight, "evicted record over byte budget");
        }
    }
}

impl Default for MemoryCacheStore {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl CacheStore for MemoryCacheStore {
    fn load_record(&self, key: &str) -> Result<Option<Record>, StoreError> {
        let record = mutex_lock(&self.state, SOURCE, "load_record")
            .records
            .get(key)
            .cloned();
        if record.is_some() {
            counter!(METRIC_STORE_HIT, "store" => "memory").increment(1);
        } else {
            counter!(METRIC_STORE_MISS, "store" => "memory").increment(1);
        }
        Ok(record)
    }

    fn merge(&mut self, record: Record) -> Result<HashSet<String>, StoreError> {
        let mut state = mutex_lock(&self.state, SOURCE, "merge");
        let state = &mut *state;

        let changed = match state.records.get_mut(record.key()) {
            Some(existing) => {
                let before = weigh(existing);
                let changed = existing.merge_with(record);
                let after = weigh(existing);
                state.weight = (state.weight + after).saturating_sub(before);
                changed
            }
            None => {
                let changed = record.keys();
                state.weight += weigh(&record);
                let key = record.key().to_string();
                if let Some((evicted_key, evicted)) = state.records.push(key, record) {
                    state.weight = state.weight.saturating_sub(weigh(&evicted));
                    counter!(METRIC_STORE_EVICT, "store" => "memory", "reason" => "count")
                        .increment(1);
                    debug!(key = %evicted_key, "evicted record over count budget");
                }
                changed
            }
        };

        self.evict_over_budget(state);
        Ok(changed)
    }

    fn remove_record(&mut self, key: &str) -> Result<bool, StoreError> {
        let mut state = mutex_lock(&self.state, SOURCE, "remove_record");
        match state.records.pop(key) {
            Some(record) => {
                state.weight = state.weight.saturating_sub(weigh(&record));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn clear_all(&mut self) -> Result<(), StoreError> {
        let mut state = mutex_lock(&self.state, SOURCE, "clear_all");
        state.records.clear();
        state.weight = 0;
        Ok(())
    }

    fn dump(&self) -> Result<Vec<Record>, StoreError> {
        let state = mutex_lock(&self.state, SOURCE, "dump");
        Ok(state.records.iter().map(|(_, record)| record.clone()).collect())
    }
}

// ============================================================================
// Dual store
// ============================================================================

/// Primary store in front of a secondary one, e.g. memory over disk.
///
/// Reads try the primary and fall back to the secondary. Writes go to both in
/// the same call, secondary first, so a failing secondary leaves the primary
/// untouched; the primary's changed keys are returned. A record the primary
/// does not hold is first copied up from the secondary, so the primary always
/// holds complete records.
pub struct DualCacheStore<P, S> {
    primary: P,
    secondary: S,
}

impl<P: CacheStore, S: CacheStore> DualCacheStore<P, S> {
    pub fn new(primary: P, secondary: S) -> Self {
        Self { primary, secondary }
    }

    pub fn primary(&self) -> &P {
        &self.primary
    }

    pub fn secondary(&self) -> &S {
        &self.secondary
    }
}

impl<P: CacheStore, S: CacheStore> CacheStore for DualCacheStore<P, S> {
    fn load_record(&self, key: &str) -> Result<Option<Record>, StoreError> {
        match self.primary.load_record(key)? {
            Some(record) => Ok(Some(record)),
            None => self.secondary.load_record(key),
        }
    }

    fn merge(&mut self, record: Record) -> Result<HashSet<String>, StoreError> {
        // A primary miss (eviction, fresh process) is seeded from the
        // secondary so a partial record never shadows the full one.
        let seed = match self.primary.load_record(record.key())? {
            Some(_) => None,
            None => self.secondary.load_record(record.key())?,
        };
        self.secondary.merge(record.clone())?;
        if let Some(existing) = seed {
            self.primary.merge(existing)?;
        }
        self.primary.merge(record)
    }

    fn remove_record(&mut self, key: &str) -> Result<bool, StoreError> {
        let in_secondary = self.secondary.remove_record(key)?;
        let in_primary = self.primary.remove_record(key)?;
        Ok(in_primary || in_secondary)
    }

    fn clear_all(&mut self) -> Result<(), StoreError> {
        self.secondary.clear_all()?;
        self.primary.clear_all()
    }

    fn dump(&self) -> Result<Vec<Record>, StoreError> {
        let mut merged: IndexMap<String, Record> = self
            .secondary
            .dump()?
            .into_iter()
            .map(|record| (record.key().to_string(), record))
            .collect();
        for record in self.primary.dump()? {
            merged.insert(record.key().to_string(), record);
        }
        Ok(merged.into_values().collect())
    }
}
