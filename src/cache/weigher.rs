//! Approximate in-memory size of a record, for byte-bounded stores.

use super::record::{FieldValue, Record};

pub const SIZE_OF_BOOLEAN: usize = 16;
pub const SIZE_OF_NUMBER: usize = 16;
pub const SIZE_OF_NULL: usize = 16;
pub const SIZE_OF_ARRAY_OVERHEAD: usize = 16;
pub const SIZE_OF_RECORD_OVERHEAD: usize = 16;
pub const SIZE_OF_CACHE_REFERENCE_OVERHEAD: usize = 16;

/// Estimated byte cost of `record`: key, field names and values.
pub fn weigh(record: &Record) -> usize {
    let mut size = SIZE_OF_RECORD_OVERHEAD + record.key().len();
    for (field, value) in record.fields() {
        size += field.len() + weigh_value(value);
    }
    size
}

/// Estimated byte cost of one field value, recursing through lists.
pub fn weigh_value(value: &FieldValue) -> usize {
    match value {
        FieldValue::Null => SIZE_OF_NULL,
        FieldValue::Bool(_) => SIZE_OF_BOOLEAN,
        FieldValue::Number(_) => SIZE_OF_NUMBER,
        FieldValue::String(text) => text.len(),
        FieldValue::Reference(reference) => {
            SIZE_OF_CACHE_REFERENCE_OVERHEAD + reference.key().len()
        }
        FieldValue::List(items) => {
            SIZE_OF_ARRAY_OVERHEAD + items.iter().map(weigh_value).sum::<usize>()
        }
        FieldValue::Embedded(entries) => serde_json::Value::Object(entries.clone())
            .to_string()
            .len(),
    }
}
