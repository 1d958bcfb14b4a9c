//! Walks an operation's field tree over a JSON response (to normalize it) or
//! over the store (to read it back).

use std::collections::HashSet;

use serde_json::{Map, Value};
use tracing::{debug, instrument};

use super::error::{CacheError, ReadError};
use super::field::{Field, FieldType, Operation};
use super::keys::{field_cache_key, qualified_key};
use super::normalizer::ResponseNormalizer;
use super::record::{FieldValue, Record};
use super::record_set::RecordSet;
use super::reference::CacheReference;
use super::resolver::CacheKeyResolver;
use super::transaction::ReadTransaction;

/// Output of one normalization pass.
#[derive(Debug, Clone, Default)]
pub struct Normalized {
    pub records: RecordSet,
    pub dependent_keys: HashSet<String>,
}

/// A response rebuilt from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadResult {
    /// Response `data`, keyed by response names.
    pub data: Value,
    /// Record and field keys the data was assembled from.
    pub dependent_keys: HashSet<String>,
}

pub struct ResponseReader<'a> {
    operation: &'a Operation,
}

impl<'a> ResponseReader<'a> {
    pub fn new(operation: &'a Operation) -> Self {
        Self { operation }
    }

    /// Feed `data` through `normalizer` in selection order.
    ///
    /// The whole response is walked before anything is returned, so a shape
    /// error leaves nothing half-normalized for the caller to merge.
    #[instrument(skip_all, fields(operation = %self.operation.name))]
    pub fn normalize(
        &self,
        data: &Value,
        mut normalizer: ResponseNormalizer,
    ) -> Result<Normalized, ReadError> {
        let Some(root) = data.as_object() else {
            return Err(ReadError::shape(&[], "object"));
        };
        normalizer.begin(self.operation.kind);
        let mut path = Vec::new();
        self.normalize_selections(&self.operation.selections, root, &mut path, &mut normalizer)?;

        let (records, dependent_keys) = normalizer.into_parts();
        Ok(Normalized {
            records,
            dependent_keys,
        })
    }

    fn normalize_selections(
        &self,
        selections: &[Field],
        object: &Map<String, Value>,
        path: &mut Vec<String>,
        normalizer: &mut ResponseNormalizer,
    ) -> Result<(), ReadError> {
        let variables = &self.operation.variables;
        for field in selections {
            path.push(field.response_name.clone());
            let value = match object.get(&field.response_name) {
                Some(value) => value,
                // Absent optional fields are not written, so reads omit them too.
                None if field.optional => {
                    path.pop();
                    continue;
                }
                None => return Err(ReadError::missing(path)),
            };

            normalizer.will_resolve(field, variables);
            self.normalize_value(field, &field.ty, value, path, normalizer)?;
            normalizer.did_resolve(field, variables)?;
            path.pop();
        }
        Ok(())
    }

    fn normalize_value(
        &self,
        field: &Field,
        ty: &FieldType,
        value: &Value,
        path: &mut Vec<String>,
        normalizer: &mut ResponseNormalizer,
    ) -> Result<(), ReadError> {
        if value.is_null() {
            normalizer.did_resolve_null();
            return Ok(());
        }
        match ty {
            FieldType::Scalar => {
                if value.is_object() || value.is_array() {
                    return Err(ReadError::shape(path, "scalar"));
                }
                normalizer.did_resolve_scalar(FieldValue::from_json(value.clone()));
            }
            FieldType::CustomScalar => {
                normalizer.did_resolve_scalar(FieldValue::from_json(value.clone()));
            }
            FieldType::Object { selections } => {
                let Some(object) = value.as_object() else {
                    return Err(ReadError::shape(path, "object"));
                };
                normalizer.will_resolve_object(field, object);
                self.normalize_selections(selections, object, path, normalizer)?;
                normalizer.did_resolve_object(field, object)?;
            }
            FieldType::List { of } => {
                let Some(items) = value.as_array() else {
                    return Err(ReadError::shape(path, "list"));
                };
                for (index, item) in items.iter().enumerate() {
                    path.push(index.to_string());
                    normalizer.will_resolve_element(index);
                    self.normalize_value(field, of, item, path, normalizer)?;
                    normalizer.did_resolve_element(index)?;
                    path.pop();
                }
                normalizer.did_resolve_list(items.len())?;
            }
        }
        Ok(())
    }

    /// Rebuild the operation's `data` from the store.
    ///
    /// Object fields whose arguments identify a record (see
    /// [`CacheKeyResolver::from_field_arguments`]) are read from that record
    /// directly. Any record or field not in the store is a cache miss.
    #[instrument(skip_all, fields(operation = %self.operation.name))]
    pub fn read(
        &self,
        transaction: &dyn ReadTransaction,
        resolver: &dyn CacheKeyResolver,
    ) -> Result<ReadResult, CacheError> {
        let root_key = resolver.root_key(self.operation.kind);
        let root = transaction
            .read(root_key.as_str())?
            .ok_or_else(|| ReadError::miss(root_key.as_str()))?;

        let mut walk = StoreWalk {
            operation: self.operation,
            transaction,
            resolver,
            dependent_keys: HashSet::new(),
        };
        let data = walk.read_selections(&root, &self.operation.selections)?;
        debug!(
            dependent_keys = walk.dependent_keys.len(),
            "read response from store"
        );
        Ok(ReadResult {
            data: Value::Object(data),
            dependent_keys: walk.dependent_keys,
        })
    }
}

struct StoreWalk<'a> {
    operation: &'a Operation,
    transaction: &'a dyn ReadTransaction,
    resolver: &'a dyn CacheKeyResolver,
    dependent_keys: HashSet<String>,
}

impl StoreWalk<'_> {
    fn read_selections(
        &mut self,
        record: &Record,
        selections: &[Field],
    ) -> Result<Map<String, Value>, CacheError> {
        let operation = self.operation;
        let variables = &operation.variables;
        let mut out = Map::new();
        for field in selections {
            let field_key = field_cache_key(field, variables);
            let qualified = qualified_key(record.key(), &field_key);

            let value = match self.argument_record(field)? {
                Some((keyed, selections)) => self.read_record(&keyed, selections)?,
                None => match record.field(&field_key) {
                    Some(stored) => self.read_value(&field.ty, stored, &qualified)?,
                    None if field.optional => continue,
                    None => return Err(ReadError::miss(qualified.as_str()).into()),
                },
            };
            self.dependent_keys.insert(qualified);
            out.insert(field.response_name.clone(), value);
        }
        Ok(out)
    }

    /// The record an object field's arguments identify, when it is stored.
    ///
    /// Objects written without the identity the resolver expects were keyed by
    /// path instead; those are read through the parent's reference.
    fn argument_record<'f>(
        &self,
        field: &'f Field,
    ) -> Result<Option<(Record, &'f [Field])>, CacheError> {
        let FieldType::Object { selections } = &field.ty else {
            return Ok(None);
        };
        let key = self
            .resolver
            .from_field_arguments(field, &self.operation.variables);
        if key.is_no_key() {
            return Ok(None);
        }
        Ok(self
            .transaction
            .read(key.as_str())?
            .map(|record| (record, selections.as_slice())))
    }

    fn read_value(
        &mut self,
        ty: &FieldType,
        value: &FieldValue,
        at: &str,
    ) -> Result<Value, CacheError> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        match (ty, value) {
            (FieldType::Object { selections }, FieldValue::Reference(reference)) => {
                self.read_reference(reference, selections)
            }
            (FieldType::Object { .. }, _) => Err(unexpected(at, "reference")),
            (FieldType::List { of }, FieldValue::List(items)) => items
                .iter()
                .map(|item| self.read_value(of, item, at))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            (FieldType::List { .. }, _) => Err(unexpected(at, "list")),
            (FieldType::Scalar | FieldType::CustomScalar, scalar) => Ok(scalar.to_json()),
        }
    }

    fn read_reference(
        &mut self,
        reference: &CacheReference,
        selections: &[Field],
    ) -> Result<Value, CacheError> {
        let record = self
            .transaction
            .read(reference.key())?
            .ok_or_else(|| ReadError::miss(reference.key()))?;
        self.read_record(&record, selections)
    }

    fn read_record(
        &mut self,
        record: &Record,
        selections: &[Field],
    ) -> Result<Value, CacheError> {
        self.dependent_keys.insert(record.key().to_string());
        self.read_selections(record, selections).map(Value::Object)
    }
}

fn unexpected(at: &str, expected: &'static str) -> CacheError {
    CacheError::Read(ReadError::UnexpectedShape {
        path: at.to_string(),
        expected,
    })
}
