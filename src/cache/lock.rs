//! Lock helpers for the record store and subscriber lists.
//!
//! A panic while a lock is held poisons it. Readers and writers take the guard
//! anyway and log a warning: a half-applied merge leaves individual fields
//! stale, which the next write of those fields corrects.

use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::warn;

/// Shared guard over a store, recovered if poisoned.
pub(crate) fn rw_read<'a, T: ?Sized>(
    lock: &'a RwLock<T>,
    target: &'static str,
    op: &'static str,
) -> RwLockReadGuard<'a, T> {
    lock.read().unwrap_or_else(|poisoned| {
        warn!(
            op,
            target_module = target,
            lock_kind = "rwlock.read",
            result = "poisoned_recovered",
            hint = "records may be half-merged after a panic in another thread",
            "Recovered from poisoned store lock"
        );
        poisoned.into_inner()
    })
}

/// Exclusive guard over a store, recovered if poisoned.
pub(crate) fn rw_write<'a, T: ?Sized>(
    lock: &'a RwLock<T>,
    target: &'static str,
    op: &'static str,
) -> RwLockWriteGuard<'a, T> {
    lock.write().unwrap_or_else(|poisoned| {
        warn!(
            op,
            target_module = target,
            lock_kind = "rwlock.write",
            result = "poisoned_recovered",
            hint = "records may be half-merged after a panic in another thread",
            "Recovered from poisoned store lock"
        );
        poisoned.into_inner()
    })
}

/// Guard over memory-store state, subscriber lists and watcher keys.
pub(crate) fn mutex_lock<'a, T: ?Sized>(
    lock: &'a Mutex<T>,
    target: &'static str,
    op: &'static str,
) -> MutexGuard<'a, T> {
    lock.lock().unwrap_or_else(|poisoned| {
        warn!(
            op,
            target_module = target,
            lock_kind = "mutex.lock",
            result = "poisoned_recovered",
            "Recovered from poisoned cache lock"
        );
        poisoned.into_inner()
    })
}
