//! Read and read-write transactions over a locked store.
//!
//! A transaction owns the lock guard for its lifetime. `close` drops the guard
//! and every later call fails with [`CacheError::TransactionClosed`]; dropping
//! an unclosed transaction releases the lock as well.

use std::collections::HashSet;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

use metrics::histogram;
use tracing::{debug, instrument};

use super::error::CacheError;
use super::lock::{rw_read, rw_write};
use super::record::Record;
use super::store::CacheStore;

const SOURCE: &str = "cache::transaction";

pub(crate) const METRIC_MERGE_MS: &str = "gqlstore_merge_ms";

/// Shared, read-only access to the store.
pub trait ReadTransaction {
    fn read(&self, key: &str) -> Result<Option<Record>, CacheError>;

    /// Every record in `keys` that exists, in the order asked.
    fn read_all(&self, keys: &[String]) -> Result<Vec<Record>, CacheError>;

    /// Every stored record.
    fn dump(&self) -> Result<Vec<Record>, CacheError>;

    /// Release the lock. Calling it again is a no-op.
    fn close(&mut self);

    fn is_closed(&self) -> bool;
}

/// Exclusive access to the store.
pub trait ReadWriteTransaction: ReadTransaction {
    /// Merge records and return the fully-qualified keys that changed.
    fn merge(&mut self, records: Vec<Record>) -> Result<HashSet<String>, CacheError>;

    fn merge_record(&mut self, record: Record) -> Result<HashSet<String>, CacheError> {
        self.merge(vec![record])
    }

    /// Remove a record, following its references when `cascade` is set.
    fn remove(&mut self, key: &str, cascade: bool) -> Result<bool, CacheError>;

    fn clear_all(&mut self) -> Result<(), CacheError>;
}

// ============================================================================
// Store-backed transactions
// ============================================================================

pub struct StoreReadTransaction<'a, S: ?Sized> {
    guard: Option<RwLockReadGuard<'a, S>>,
}

impl<'a, S: CacheStore + ?Sized> StoreReadTransaction<'a, S> {
    pub fn begin(lock: &'a RwLock<S>) -> Self {
        Self {
            guard: Some(rw_read(lock, SOURCE, "read_transaction")),
        }
    }

    fn store(&self) -> Result<&S, CacheError> {
        self.guard.as_deref().ok_or(CacheError::TransactionClosed)
    }
}

impl<S: CacheStore + ?Sized> ReadTransaction for StoreReadTransaction<'_, S> {
    fn read(&self, key: &str) -> Result<Option<Record>, CacheError> {
        Ok(self.store()?.load_record(key)?)
    }

    fn read_all(&self, keys: &[String]) -> Result<Vec<Record>, CacheError> {
        Ok(self.store()?.load_records(keys)?)
    }

    fn dump(&self) -> Result<Vec<Record>, CacheError> {
        Ok(self.store()?.dump()?)
    }

    fn close(&mut self) {
        self.guard.take();
    }

    fn is_closed(&self) -> bool {
        self.guard.is_none()
    }
}

pub struct StoreWriteTransaction<'a, S: ?Sized> {
    guard: Option<RwLockWriteGuard<'a, S>>,
}

impl<'a, S: CacheStore + ?Sized> StoreWriteTransaction<'a, S> {
    pub fn begin(lock: &'a RwLock<S>) -> Self {
        Self {
            guard: Some(rw_write(lock, SOURCE, "write_transaction")),
        }
    }

    fn store(&self) -> Result<&S, CacheError> {
        self.guard.as_deref().ok_or(CacheError::TransactionClosed)
    }

    fn store_mut(&mut self) -> Result<&mut S, CacheError> {
        self.guard.as_deref_mut().ok_or(CacheError::TransactionClosed)
    }
}

impl<S: CacheStore + ?Sized> ReadTransaction for StoreWriteTransaction<'_, S> {
    fn read(&self, key: &str) -> Result<Option<Record>, CacheError> {
        Ok(self.store()?.load_record(key)?)
    }

    fn read_all(&self, keys: &[String]) -> Result<Vec<Record>, CacheError> {
        Ok(self.store()?.load_records(keys)?)
    }

    fn dump(&self) -> Result<Vec<Record>, CacheError> {
        Ok(self.store()?.dump()?)
    }

    fn close(&mut self) {
        self.guard.take();
    }

    fn is_closed(&self) -> bool {
        self.guard.is_none()
    }
}

impl<S: CacheStore + ?Sized> ReadWriteTransaction for StoreWriteTransaction<'_, S> {
    #[instrument(skip_all, fields(records = records.len()))]
    fn merge(&mut self, records: Vec<Record>) -> Result<HashSet<String>, CacheError> {
        let started_at = Instant::now();
        let changed = self.store_mut()?.merge_all(records)?;
        histogram!(METRIC_MERGE_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);
        debug!(changed = changed.len(), "merged records into store");
        Ok(changed)
    }

    #[instrument(skip(self))]
    fn remove(&mut self, key: &str, cascade: bool) -> Result<bool, CacheError> {
        Ok(self.store_mut()?.remove(key, cascade)?)
    }

    fn clear_all(&mut self) -> Result<(), CacheError> {
        self.store_mut()?.clear_all()?;
        debug!("cleared store");
        Ok(())
    }
}

// ============================================================================
// Empty transaction
// ============================================================================

/// Transaction over nothing: reads find no records, writes change nothing.
#[derive(Debug, Default)]
pub struct EmptyTransaction {
    closed: bool,
}

impl EmptyTransaction {
    fn check_open(&self) -> Result<(), CacheError> {
        if self.closed {
            return Err(CacheError::TransactionClosed);
        }
        Ok(())
    }
}

impl ReadTransaction for EmptyTransaction {
    fn read(&self, _key: &str) -> Result<Option<Record>, CacheError> {
        self.check_open()?;
        Ok(None)
    }

    fn read_all(&self, _keys: &[String]) -> Result<Vec<Record>, CacheError> {
        self.check_open()?;
        Ok(Vec::new())
    }

    fn dump(&self) -> Result<Vec<Record>, CacheError> {
        self.check_open()?;
        Ok(Vec::new())
    }

    fn close(&mut self) {
        self.closed = true;
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

impl ReadWriteTransaction for EmptyTransaction {
    fn merge(&mut self, _records: Vec<Record>) -> Result<HashSet<String>, CacheError> {
        self.check_open()?;
        Ok(HashSet::new())
    }

    fn remove(&mut self, _key: &str, _cascade: bool) -> Result<bool, CacheError> {
        self.check_open()?;
        Ok(false)
    }

    fn clear_all(&mut self) -> Result<(), CacheError> {
        self.check_open()
    }
}
