//! Query watchers: re-read an operation whenever a change touches it.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, Weak};

use tracing::{debug, warn};

use super::error::CacheError;
use super::events::{ChangeEvent, Subscriber};
use super::field::Operation;
use super::lock::mutex_lock;
use super::normalized::NormalizedCache;
use super::reader::ReadResult;

const SOURCE: &str = "cache::watcher";

type WatchCallback = Box<dyn Fn(Result<ReadResult, CacheError>) + Send + Sync>;

/// Subscriber bound to one operation.
///
/// Holds the cache weakly, so a registered watcher does not keep its cache
/// alive. After each successful re-read the watched keys become the keys of the
/// new result.
pub struct QueryWatcher<C> {
    cache: Weak<C>,
    operation: Operation,
    dependent_keys: Mutex<HashSet<String>>,
    callback: WatchCallback,
}

impl<C: NormalizedCache + 'static> QueryWatcher<C> {
    /// Read `operation` now and watch the keys that read depended on.
    ///
    /// Fails, without subscribing, when the operation is not in the cache.
    pub fn watch<F>(
        cache: &Arc<C>,
        operation: Operation,
        callback: F,
    ) -> Result<(Arc<Self>, ReadResult), CacheError>
    where
        F: Fn(Result<ReadResult, CacheError>) + Send + Sync + 'static,
    {
        let initial = cache.read_operation(&operation)?;
        let watcher = Self::with_dependent_keys(
            cache,
            operation,
            initial.dependent_keys.clone(),
            callback,
        );
        Ok((watcher, initial))
    }

    /// Watch `dependent_keys`, typically the keys reported when the operation's
    /// response was written.
    pub fn with_dependent_keys<F>(
        cache: &Arc<C>,
        operation: Operation,
        dependent_keys: HashSet<String>,
        callback: F,
    ) -> Arc<Self>
    where
        F: Fn(Result<ReadResult, CacheError>) + Send + Sync + 'static,
    {
        let watcher = Arc::new(Self {
            cache: Arc::downgrade(cache),
            operation,
            dependent_keys: Mutex::new(dependent_keys),
            callback: Box::new(callback),
        });
        cache.subscribe(Arc::clone(&watcher) as Arc<dyn Subscriber>);
        watcher
    }

    pub fn dependent_keys(&self) -> HashSet<String> {
        mutex_lock(&self.dependent_keys, SOURCE, "dependent_keys").clone()
    }

    /// Stop watching. Returns whether the watcher was still registered.
    pub fn cancel(self: &Arc<Self>) -> bool {
        let Some(cache) = self.cache.upgrade() else {
            return false;
        };
        let subscriber: Arc<dyn Subscriber> = Arc::clone(self) as Arc<dyn Subscriber>;
        cache.unsubscribe(&subscriber)
    }
}

impl<C: NormalizedCache + 'static> Subscriber for QueryWatcher<C> {
    fn on_change(&self, event: &ChangeEvent) {
        let touched = event.touches(&mutex_lock(&self.dependent_keys, SOURCE, "on_change"));
        if !touched {
            return;
        }
        let Some(cache) = self.cache.upgrade() else {
            return;
        };

        debug!(
            operation = %self.operation.name,
            event_id = %event.id,
            event_epoch = event.epoch,
            "Refreshing watched query"
        );
        let result = cache.read_operation(&self.operation);
        match &result {
            Ok(read) => {
                let mut keys = mutex_lock(&self.dependent_keys, SOURCE, "on_change");
                *keys = read.dependent_keys.clone();
            }
            Err(err) => warn!(
                operation = %self.operation.name,
                error = %err,
                "Watched query could not be re-read"
            ),
        }
        (self.callback)(result);
    }
}
