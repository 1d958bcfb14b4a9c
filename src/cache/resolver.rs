//! Global identity policy for normalized objects.

use serde_json::{Map, Value};

use super::field::{Field, OperationKind, Variables};
use super::keys::resolve_argument;
use super::reference::CacheKey;

pub const QUERY_ROOT_KEY: &str = "QUERY_ROOT";
pub const MUTATION_ROOT_KEY: &str = "MUTATION_ROOT";
pub const SUBSCRIPTION_ROOT_KEY: &str = "SUBSCRIPTION_ROOT";

/// Decides whether an object gets a store-wide identity.
///
/// Returning [`CacheKey::NO_KEY`] (or any empty key) is not an error: the
/// object is then keyed by its path from the operation root.
pub trait CacheKeyResolver: Send + Sync {
    /// Key for an object as it appeared in a response, before normalization.
    fn from_field_record_set(&self, field: &Field, object: &Map<String, Value>) -> CacheKey;

    /// Key for an object field computed from its arguments alone, so reads can
    /// jump to a record without a parent reference (e.g. `character(id: 1002)`).
    fn from_field_arguments(&self, _field: &Field, _variables: &Variables) -> CacheKey {
        CacheKey::NO_KEY
    }

    /// Key of the record the operation's top-level fields are stored on.
    fn root_key(&self, kind: OperationKind) -> CacheKey {
        CacheKey::new(match kind {
            OperationKind::Query => QUERY_ROOT_KEY,
            OperationKind::Mutation => MUTATION_ROOT_KEY,
            OperationKind::Subscription => SUBSCRIPTION_ROOT_KEY,
        })
    }
}

/// Keys every object by path.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathResolver;

impl CacheKeyResolver for PathResolver {
    fn from_field_record_set(&self, _field: &Field, _object: &Map<String, Value>) -> CacheKey {
        CacheKey::NO_KEY
    }
}

/// Keys objects that carry both `__typename` and `id` by their `id`.
///
/// With `typename_prefix` the key becomes `<typename>:<id>`, for schemas where
/// ids are only unique per type. `id_argument` names an argument (commonly
/// `id`) that identifies the object a field returns, enabling read shortcuts.
#[derive(Debug, Clone, Default)]
pub struct IdResolver {
    typename_prefix: bool,
    id_argument: Option<String>,
}

impl IdResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_typename_prefix(mut self) -> Self {
        self.typename_prefix = true;
        self
    }

    pub fn with_id_argument(mut self, argument: impl Into<String>) -> Self {
        self.id_argument = Some(argument.into());
        self
    }
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

impl CacheKeyResolver for IdResolver {
    fn from_field_record_set(&self, _field: &Field, object: &Map<String, Value>) -> CacheKey {
        let Some(typename) = object.get("__typename").and_then(Value::as_str) else {
            return CacheKey::NO_KEY;
        };
        let Some(id) = object.get("id").and_then(id_string) else {
            return CacheKey::NO_KEY;
        };
        if self.typename_prefix {
            CacheKey::new(format!("{typename}:{id}"))
        } else {
            CacheKey::new(id)
        }
    }

    fn from_field_arguments(&self, field: &Field, variables: &Variables) -> CacheKey {
        // Without a typename in hand a prefixed key cannot be rebuilt.
        if self.typename_prefix {
            return CacheKey::NO_KEY;
        }
        self.id_argument
            .as_deref()
            .and_then(|name| field.arguments.get(name))
            .map(|raw| resolve_argument(raw, variables))
            .and_then(|value| id_string(&value))
            .map(CacheKey::new)
            .unwrap_or(CacheKey::NO_KEY)
    }
}
