//! Response normalization.
//!
//! [`ResponseNormalizer`] is driven by callbacks in schema order while a
//! response is walked (see `reader.rs`). Nested objects are finished before
//! their parent, so the in-progress parent record and its path are parked on
//! stacks and restored when the child completes. One normalizer serves exactly
//! one pass.

use std::collections::HashSet;
use std::mem;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use super::error::NormalizeError;
use super::field::{Field, OperationKind, Variables};
use super::keys::{field_cache_key, qualified_key};
use super::record::{FieldValue, Record};
use super::record_set::RecordSet;
use super::reference::{CacheKey, CacheReference};
use super::resolver::CacheKeyResolver;

const PATH_STACK: &str = "path";
const PATH_STACK_SAVED: &str = "saved path";
const RECORD_STACK: &str = "record";
const VALUE_STACK: &str = "value";

/// Flattens one response into a [`RecordSet`] and the keys it depends on.
pub struct ResponseNormalizer {
    /// `None` for the disabled normalizer, which ignores every callback.
    resolver: Option<Arc<dyn CacheKeyResolver>>,
    path_stack: Vec<Vec<String>>,
    record_stack: Vec<Record>,
    value_stack: Vec<FieldValue>,
    path: Vec<String>,
    current_record: Record,
    dependent_keys: HashSet<String>,
    record_set: RecordSet,
}

impl ResponseNormalizer {
    pub fn new(resolver: Arc<dyn CacheKeyResolver>) -> Self {
        Self::with_resolver(Some(resolver))
    }

    /// Normalizer that accepts every callback and produces nothing.
    pub fn no_op() -> Self {
        Self::with_resolver(None)
    }

    fn with_resolver(resolver: Option<Arc<dyn CacheKeyResolver>>) -> Self {
        Self {
            resolver,
            path_stack: Vec::new(),
            record_stack: Vec::new(),
            value_stack: Vec::new(),
            path: Vec::new(),
            current_record: Record::new(CacheKey::NO_KEY.into_string()),
            dependent_keys: HashSet::new(),
            record_set: RecordSet::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.resolver.is_some()
    }

    /// Start a pass for an operation of `kind`, rooted where the resolver says.
    pub fn begin(&mut self, kind: OperationKind) {
        let Some(resolver) = &self.resolver else {
            return;
        };
        let root_key = resolver.root_key(kind);
        self.will_resolve_root_query(&root_key);
    }

    /// Start a pass whose top-level fields are stored on `root_key`.
    pub fn will_resolve_root_query(&mut self, root_key: &CacheKey) {
        if !self.is_enabled() {
            return;
        }
        self.path_stack.clear();
        self.record_stack.clear();
        self.value_stack.clear();
        self.dependent_keys.clear();
        self.record_set = RecordSet::new();
        self.path = vec![root_key.as_str().to_string()];
        self.current_record = Record::new(root_key.as_str());
    }

    pub fn will_resolve(&mut self, field: &Field, variables: &Variables) {
        if !self.is_enabled() {
            return;
        }
        self.path.push(field_cache_key(field, variables));
    }

    pub fn did_resolve(
        &mut self,
        _field: &Field,
        _variables: &Variables,
    ) -> Result<(), NormalizeError> {
        if !self.is_enabled() {
            return Ok(());
        }
        let field_key = self.path.pop().ok_or(NormalizeError::EmptyStack { stack: PATH_STACK })?;
        let value = self
            .value_stack
            .pop()
            .ok_or(NormalizeError::EmptyStack { stack: VALUE_STACK })?;

        self.dependent_keys
            .insert(qualified_key(self.current_record.key(), &field_key));
        self.current_record.add_field(field_key, value);

        // Top-level fields have no enclosing object to wait for.
        if self.record_stack.is_empty() {
            self.record_set.merge(self.current_record.clone());
        }
        Ok(())
    }

    pub fn did_resolve_scalar(&mut self, value: FieldValue) {
        if !self.is_enabled() {
            return;
        }
        self.value_stack.push(value);
    }

    pub fn did_resolve_null(&mut self) {
        self.did_resolve_scalar(FieldValue::Null);
    }

    pub fn will_resolve_object(&mut self, field: &Field, object: &Map<String, Value>) {
        let Some(resolver) = &self.resolver else {
            return;
        };
        self.path_stack.push(self.path.clone());

        let resolved = resolver.from_field_record_set(field, object);
        let key = if resolved.is_no_key() {
            self.path.join(".")
        } else {
            self.path = vec![resolved.as_str().to_string()];
            resolved.into_string()
        };

        let parent = mem::replace(&mut self.current_record, Record::new(key));
        self.record_stack.push(parent);
    }

    pub fn did_resolve_object(
        &mut self,
        _field: &Field,
        _object: &Map<String, Value>,
    ) -> Result<(), NormalizeError> {
        if !self.is_enabled() {
            return Ok(());
        }
        if self.record_stack.is_empty() {
            return Err(NormalizeError::EmptyStack {
                stack: RECORD_STACK,
            });
        }
        self.path = self.path_stack.pop().ok_or(NormalizeError::EmptyStack {
            stack: PATH_STACK_SAVED,
        })?;
        let parent = self.record_stack.pop().ok_or(NormalizeError::EmptyStack {
            stack: RECORD_STACK,
        })?;

        let finished = mem::replace(&mut self.current_record, parent);
        self.value_stack
            .push(FieldValue::Reference(CacheReference::new(finished.key())));
        self.dependent_keys.insert(finished.key().to_string());
        self.record_set.merge(finished);
        Ok(())
    }

    pub fn will_resolve_element(&mut self, index: usize) {
        if !self.is_enabled() {
            return;
        }
        self.path.push(index.to_string());
    }

    pub fn did_resolve_element(&mut self, _index: usize) -> Result<(), NormalizeError> {
        if !self.is_enabled() {
            return Ok(());
        }
        self.path
            .pop()
            .map(|_| ())
            .ok_or(NormalizeError::EmptyStack { stack: PATH_STACK })
    }

    /// Collapse the last `len` values into one list, keeping their order.
    pub fn did_resolve_list(&mut self, len: usize) -> Result<(), NormalizeError> {
        if !self.is_enabled() {
            return Ok(());
        }
        let available = self.value_stack.len();
        if available < len {
            return Err(NormalizeError::ShortList {
                expected: len,
                available,
            });
        }
        let items = self.value_stack.split_off(available - len);
        self.value_stack.push(FieldValue::List(items));
        Ok(())
    }

    pub fn record_set(&self) -> &RecordSet {
        &self.record_set
    }

    /// Records produced so far, in the order they were first completed.
    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.record_set.records()
    }

    pub fn dependent_keys(&self) -> &HashSet<String> {
        &self.dependent_keys
    }

    /// Finish the pass.
    pub fn into_parts(self) -> (RecordSet, HashSet<String>) {
        debug!(
            records = self.record_set.len(),
            dependent_keys = self.dependent_keys.len(),
            "normalized response"
        );
        (self.record_set, self.dependent_keys)
    }
}
