//! The cache facade: a locked store, its key resolver and its subscribers.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use tracing::{debug, info, instrument};

use super::config::CacheConfig;
use super::disk::DiskCacheStore;
use super::error::{CacheError, StoreError};
use super::events::{Subscriber, SubscriberList};
use super::field::Operation;
use super::normalizer::ResponseNormalizer;
use super::reader::{ReadResult, ResponseReader};
use super::record::Record;
use super::resolver::{CacheKeyResolver, IdResolver, PathResolver};
use super::store::{CacheStore, DualCacheStore, MemoryCacheStore};
use super::transaction::{
    EmptyTransaction, ReadTransaction, ReadWriteTransaction, StoreReadTransaction,
    StoreWriteTransaction,
};

/// What writing one response did to the cache.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteResult {
    /// Keys the written response depends on.
    pub dependent_keys: HashSet<String>,
    /// Keys whose stored value changed.
    pub changed_keys: HashSet<String>,
}

/// Normalized cache operations shared by the real and the disabled cache, so
/// callers never branch on whether caching is on.
pub trait NormalizedCache: Send + Sync {
    /// Register a subscriber. Returns `false` when it already was.
    fn subscribe(&self, subscriber: Arc<dyn Subscriber>) -> bool;

    fn unsubscribe(&self, subscriber: &Arc<dyn Subscriber>) -> bool;

    /// Fan `changed_keys` out to every subscriber on the calling thread.
    fn publish(&self, changed_keys: HashSet<String>);

    /// Run `f` under the shared lock. The transaction is closed afterwards.
    fn read_transaction<R, F>(&self, f: F) -> Result<R, CacheError>
    where
        F: FnOnce(&mut dyn ReadTransaction) -> Result<R, CacheError>;

    /// Run `f` under the exclusive lock. The transaction is closed afterwards;
    /// nothing is published.
    fn write_transaction<R, F>(&self, f: F) -> Result<R, CacheError>
    where
        F: FnOnce(&mut dyn ReadWriteTransaction) -> Result<R, CacheError>;

    /// A fresh normalizer bound to this cache's resolver.
    fn response_normalizer(&self) -> ResponseNormalizer;

    fn resolver(&self) -> Arc<dyn CacheKeyResolver>;

    /// Merge `records`, then publish what changed once the lock is released.
    #[instrument(skip_all, fields(records = records.len()))]
    fn write_records(&self, records: Vec<Record>) -> Result<HashSet<String>, CacheError> {
        let changed = self.write_transaction(|tx| tx.merge(records))?;
        if !changed.is_empty() {
            self.publish(changed.clone());
        }
        Ok(changed)
    }

    fn load_record(&self, key: &str) -> Result<Option<Record>, CacheError> {
        self.read_transaction(|tx| tx.read(key))
    }

    /// Normalize `data` for `operation` and write it.
    ///
    /// Normalization finishes before the lock is taken; a malformed response
    /// writes nothing.
    fn write_response(
        &self,
        operation: &Operation,
        data: &serde_json::Value,
    ) -> Result<WriteResult, CacheError> {
        let normalized =
            ResponseReader::new(operation).normalize(data, self.response_normalizer())?;
        let changed_keys = self.write_records(normalized.records.into_records())?;
        Ok(WriteResult {
            dependent_keys: normalized.dependent_keys,
            changed_keys,
        })
    }

    /// Every stored record.
    fn dump(&self) -> Result<Vec<Record>, CacheError> {
        self.read_transaction(|tx| tx.dump())
    }

    /// Remove every record. Nothing is published.
    fn clear_all(&self) -> Result<(), CacheError> {
        self.write_transaction(|tx| tx.clear_all())
    }

    /// Rebuild `operation`'s response from the store.
    fn read_operation(&self, operation: &Operation) -> Result<ReadResult, CacheError> {
        let resolver = self.resolver();
        self.read_transaction(|tx| ResponseReader::new(operation).read(tx, resolver.as_ref()))
    }
}

// ============================================================================
// Real cache
// ============================================================================

pub struct RealCache<S> {
    store: RwLock<S>,
    resolver: Arc<dyn CacheKeyResolver>,
    subscribers: SubscriberList,
}

impl<S: CacheStore> RealCache<S> {
    pub fn new(store: S, resolver: Arc<dyn CacheKeyResolver>) -> Self {
        Self {
            store: RwLock::new(store),
            resolver,
            subscribers: SubscriberList::new(),
        }
    }
}

impl<S: CacheStore> NormalizedCache for RealCache<S> {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber>) -> bool {
        self.subscribers.subscribe(subscriber)
    }

    fn unsubscribe(&self, subscriber: &Arc<dyn Subscriber>) -> bool {
        self.subscribers.unsubscribe(subscriber)
    }

    fn publish(&self, changed_keys: HashSet<String>) {
        self.subscribers.publish(changed_keys);
    }

    fn read_transaction<R, F>(&self, f: F) -> Result<R, CacheError>
    where
        F: FnOnce(&mut dyn ReadTransaction) -> Result<R, CacheError>,
    {
        let mut tx = StoreReadTransaction::begin(&self.store);
        let result = f(&mut tx);
        tx.close();
        result
    }

    #[instrument(skip_all)]
    fn write_transaction<R, F>(&self, f: F) -> Result<R, CacheError>
    where
        F: FnOnce(&mut dyn ReadWriteTransaction) -> Result<R, CacheError>,
    {
        let mut tx = StoreWriteTransaction::begin(&self.store);
        let result = f(&mut tx);
        tx.close();
        result
    }

    fn response_normalizer(&self) -> ResponseNormalizer {
        ResponseNormalizer::new(Arc::clone(&self.resolver))
    }

    fn resolver(&self) -> Arc<dyn CacheKeyResolver> {
        Arc::clone(&self.resolver)
    }
}

// ============================================================================
// Disabled cache
// ============================================================================

/// Cache that stores nothing: writes change nothing, reads find nothing and
/// the normalizer ignores every callback.
#[derive(Default)]
pub struct NoCache {
    subscribers: SubscriberList,
}

impl NoCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl NormalizedCache for NoCache {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber>) -> bool {
        self.subscribers.subscribe(subscriber)
    }

    fn unsubscribe(&self, subscriber: &Arc<dyn Subscriber>) -> bool {
        self.subscribers.unsubscribe(subscriber)
    }

    fn publish(&self, _changed_keys: HashSet<String>) {}

    fn read_transaction<R, F>(&self, f: F) -> Result<R, CacheError>
    where
        F: FnOnce(&mut dyn ReadTransaction) -> Result<R, CacheError>,
    {
        f(&mut EmptyTransaction::default())
    }

    fn write_transaction<R, F>(&self, f: F) -> Result<R, CacheError>
    where
        F: FnOnce(&mut dyn ReadWriteTransaction) -> Result<R, CacheError>,
    {
        f(&mut EmptyTransaction::default())
    }

    fn response_normalizer(&self) -> ResponseNormalizer {
        ResponseNormalizer::no_op()
    }

    fn resolver(&self) -> Arc<dyn CacheKeyResolver> {
        Arc::new(PathResolver)
    }
}

// ============================================================================
// Construction from configuration
// ============================================================================

/// Resolver described by `config`.
pub fn resolver_from_config(config: &CacheConfig) -> Arc<dyn CacheKeyResolver> {
    if !config.resolve_ids {
        return Arc::new(PathResolver);
    }
    let resolver = IdResolver::new().with_id_argument("id");
    if config.typename_prefix {
        Arc::new(resolver.with_typename_prefix())
    } else {
        Arc::new(resolver)
    }
}

/// Memory store, layered over a disk store when a directory is configured.
pub fn store_from_config(config: &CacheConfig) -> Result<Box<dyn CacheStore>, StoreError> {
    let memory = MemoryCacheStore::new(config);
    match &config.disk_directory {
        Some(directory) => {
            let disk = DiskCacheStore::open(directory)?;
            info!(
                directory = %directory.display(),
                memory_max_records = config.memory_max_records,
                memory_max_bytes = config.memory_max_bytes,
                "Opened memory store over disk store"
            );
            Ok(Box::new(DualCacheStore::new(memory, disk)))
        }
        None => {
            debug!(
                memory_max_records = config.memory_max_records,
                memory_max_bytes = config.memory_max_bytes,
                "Opened memory store"
            );
            Ok(Box::new(memory))
        }
    }
}

/// Cache described by `config`.
pub fn cache_from_config(
    config: &CacheConfig,
) -> Result<RealCache<Box<dyn CacheStore>>, StoreError> {
    Ok(RealCache::new(
        store_from_config(config)?,
        resolver_from_config(config),
    ))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;
    use crate::cache::events::ChangeEvent;
    use crate::cache::field::Field;
    use crate::cache::record::FieldValue;
    use crate::cache::reference::CacheReference;

    fn memory_cache() -> RealCache<MemoryCacheStore> {
        RealCache::new(MemoryCacheStore::unbounded(), Arc::new(IdResolver::new()))
    }

    fn recorder() -> (Arc<Mutex<Vec<HashSet<String>>>>, Arc<dyn Subscriber>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let subscriber: Arc<dyn Subscriber> = Arc::new(move |event: &ChangeEvent| {
            sink.lock().expect("sink lock").push(event.changed_keys.clone());
        });
        (events, subscriber)
    }

    #[test]
    fn write_records_publishes_changes_once() {
        let cache = memory_cache();
        let (events, subscriber) = recorder();
        assert!(cache.subscribe(Arc::clone(&subscriber)));
        assert!(!cache.subscribe(Arc::clone(&subscriber)));

        let luke = Record::new("1000").with_field("name", "Luke");
        cache.write_records(vec![luke.clone()]).expect("write");
        cache.write_records(vec![luke]).expect("write");

        let events = events.lock().expect("sink lock");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0], HashSet::from(["1000.name".to_string()]));
    }

    #[test]
    fn subscribers_may_read_during_publish() {
        let cache = Arc::new(memory_cache());
        let seen = Arc::new(Mutex::new(None));

        let reader_cache = Arc::clone(&cache);
        let sink = Arc::clone(&seen);
        cache.subscribe(Arc::new(move |_: &ChangeEvent| {
            let record = reader_cache.load_record("1000").expect("read in callback");
            *sink.lock().expect("sink lock") = record;
        }));

        cache
            .write_records(vec![Record::new("1000").with_field("name", "Luke")])
            .expect("write");
        assert!(seen.lock().expect("sink lock").is_some());
    }

    #[test]
    fn write_and_read_response() {
        let cache = memory_cache();
        let operation = Operation::query(
            "Hero",
            vec![Field::object(
                "hero",
                vec![Field::scalar("__typename"), Field::scalar("id"), Field::scalar("name")],
            )],
        );
        let data = json!({"hero": {"__typename": "Droid", "id": "2001", "name": "R2-D2"}});

        let written = cache.write_response(&operation, &data).expect("write");
        assert!(written.changed_keys.contains("2001.name"));
        assert!(written.dependent_keys.contains("QUERY_ROOT.hero"));
        assert_eq!(
            cache
                .load_record("QUERY_ROOT")
                .expect("load")
                .and_then(|root| root.field("hero").cloned()),
            Some(FieldValue::Reference(CacheReference::new("2001")))
        );

        let read = cache.read_operation(&operation).expect("read");
        assert_eq!(read.data, data);
    }

    #[test]
    fn malformed_response_writes_nothing() {
        let cache = memory_cache();
        let operation = Operation::query(
            "Hero",
            vec![Field::object("hero", vec![Field::scalar("name")])],
        );

        let err = cache
            .write_response(&operation, &json!({"hero": {"name": ["not", "scalar"]}}))
            .expect_err("shape error");
        assert!(matches!(err, CacheError::Read(_)));
        assert!(cache.dump().expect("dump").is_empty());
    }

    #[test]
    fn transactions_are_closed_after_the_block() {
        let cache = memory_cache();
        let changed = cache
            .write_transaction(|tx| {
                let changed = tx.merge_record(Record::new("1000").with_field("name", "Luke"))?;
                assert!(tx.read("1000")?.is_some());
                Ok(changed)
            })
            .expect("write");
        assert_eq!(changed.len(), 1);

        // Both locks are free again.
        assert!(cache.store.try_write().is_ok());
        cache.clear_all().expect("clear");
        assert!(cache.load_record("1000").expect("load").is_none());
    }

    #[test]
    fn no_cache_is_empty_and_silent() {
        let cache = NoCache::new();
        let (events, subscriber) = recorder();
        cache.subscribe(subscriber);

        let changed = cache
            .write_records(vec![Record::new("1000").with_field("name", "Luke")])
            .expect("write");
        assert!(changed.is_empty());
        assert!(cache.load_record("1000").expect("load").is_none());
        assert!(!cache.response_normalizer().is_enabled());

        cache.publish(HashSet::from(["1000.name".to_string()]));
        assert!(events.lock().expect("sink lock").is_empty());

        let operation = Operation::query("Hero", vec![Field::scalar("hero")]);
        let written = cache
            .write_response(&operation, &json!({"hero": "R2-D2"}))
            .expect("write");
        assert_eq!(written, WriteResult::default());
        assert!(matches!(
            cache.read_operation(&operation),
            Err(CacheError::Read(_))
        ));
    }

    #[test]
    fn config_selects_resolver_and_store() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let config = CacheConfig {
            disk_directory: Some(dir.path().join("records")),
            ..Default::default()
        };
        let cache = cache_from_config(&config).expect("cache");
        cache
            .write_records(vec![Record::new("1000").with_field("name", "Luke")])
            .expect("write");
        assert_eq!(std::fs::read_dir(dir.path().join("records")).expect("dir").count(), 1);

        let path_only = CacheConfig {
            resolve_ids: false,
            ..Default::default()
        };
        let resolver = resolver_from_config(&path_only);
        let object = json!({"__typename": "Human", "id": "1000"});
        let key = resolver.from_field_record_set(
            &Field::scalar("hero"),
            object.as_object().expect("object"),
        );
        assert!(key.is_no_key());
    }
}
