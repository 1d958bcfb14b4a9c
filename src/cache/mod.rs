//! gqlstore normalized cache
//!
//! Flattens GraphQL responses into keyed records, merges them into a shared
//! store, and reads responses back by following references:
//!
//! - **Normalization**: [`ResponseReader::normalize`] drives a
//!   [`ResponseNormalizer`] over a response, producing a [`RecordSet`] and the
//!   keys the response depends on
//! - **Storage**: [`CacheStore`] implementations (memory LRU, disk, dual)
//!   behind one read/write lock, accessed through transactions
//! - **Change tracking**: merges report changed field keys, which the
//!   [`NormalizedCache`] publishes to subscribers such as [`QueryWatcher`]
//!
//! ## Configuration
//!
//! Cache behavior is controlled via the `[cache]` table of `gqlstore.toml`:
//!
//! ```toml
//! [cache]
//! enabled = true
//! memory_max_records = 10000
//! memory_max_bytes = 16777216
//! disk_directory = "/var/cache/gqlstore"
//! resolve_ids = true
//! # ... see config.rs for all options
//! ```

mod config;
mod disk;
mod error;
mod events;
mod field;
mod keys;
mod lock;
mod normalized;
mod normalizer;
mod reader;
mod record;
mod record_set;
mod reference;
mod resolver;
mod store;
mod transaction;
mod watcher;
pub mod weigher;

pub use config::CacheConfig;
pub use disk::DiskCacheStore;
pub use error::{CacheError, NormalizeError, ReadError, StoreError};
pub use events::{ChangeEvent, Epoch, Subscriber, SubscriberList};
pub use field::{Field, FieldType, Operation, OperationKind, Variables, variable_marker};
pub use keys::{field_cache_key, qualified_key, resolve_argument};
pub use normalized::{
    NoCache, NormalizedCache, RealCache, WriteResult, cache_from_config, resolver_from_config,
    store_from_config,
};
pub use normalizer::ResponseNormalizer;
pub use reader::{Normalized, ReadResult, ResponseReader};
pub use record::{FieldValue, Record};
pub use record_set::RecordSet;
pub use reference::{CacheKey, CacheReference};
pub use resolver::{
    CacheKeyResolver, IdResolver, MUTATION_ROOT_KEY, PathResolver, QUERY_ROOT_KEY,
    SUBSCRIPTION_ROOT_KEY,
};
pub use store::{CacheStore, DualCacheStore, MemoryCacheStore};
pub use transaction::{
    EmptyTransaction, ReadTransaction, ReadWriteTransaction, StoreReadTransaction,
    StoreWriteTransaction,
};
pub use watcher::QueryWatcher;
