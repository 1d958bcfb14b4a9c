//! Flat, keyed records and their field values.

use std::collections::HashSet;

use indexmap::IndexMap;
use serde_json::{Map, Number, Value};

use super::keys::qualified_key;
use super::reference::CacheReference;

/// Value stored in a record field.
///
/// Object-typed GraphQL values never appear here inline; the normalizer turns
/// them into records and stores a [`FieldValue::Reference`] instead.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Reference(CacheReference),
    List(Vec<FieldValue>),
    /// Custom scalar JSON kept verbatim.
    Embedded(Map<String, Value>),
}

impl FieldValue {
    /// Convert a leaf JSON value as it appeared in a response.
    ///
    /// Arrays become lists and objects are embedded; only custom scalars should
    /// reach this with an object.
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Null => FieldValue::Null,
            Value::Bool(flag) => FieldValue::Bool(flag),
            Value::Number(number) => FieldValue::Number(number),
            Value::String(text) => FieldValue::String(text),
            Value::Array(items) => {
                FieldValue::List(items.into_iter().map(FieldValue::from_json).collect())
            }
            Value::Object(entries) => FieldValue::Embedded(entries),
        }
    }

    /// JSON form for persistence: references become prefixed strings.
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Null => Value::Null,
            FieldValue::Bool(flag) => Value::Bool(*flag),
            FieldValue::Number(number) => Value::Number(number.clone()),
            FieldValue::String(text) => Value::String(text.clone()),
            FieldValue::Reference(reference) => Value::String(reference.serialize()),
            FieldValue::List(items) => {
                Value::Array(items.iter().map(FieldValue::to_json).collect())
            }
            FieldValue::Embedded(entries) => Value::Object(entries.clone()),
        }
    }

    /// Inverse of [`FieldValue::to_json`]: strings carrying the reference
    /// prefix are promoted back to references.
    pub fn from_persisted_json(value: Value) -> Self {
        match value {
            Value::String(text) => match CacheReference::deserialize(&text) {
                Some(reference) => FieldValue::Reference(reference),
                None => FieldValue::String(text),
            },
            Value::Array(items) => FieldValue::List(
                items
                    .into_iter()
                    .map(FieldValue::from_persisted_json)
                    .collect(),
            ),
            other => FieldValue::from_json(other),
        }
    }

    pub fn as_reference(&self) -> Option<&CacheReference> {
        match self {
            FieldValue::Reference(reference) => Some(reference),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<&'a CacheReference>) {
        match self {
            FieldValue::Reference(reference) => out.push(reference),
            FieldValue::List(items) => {
                for item in items {
                    item.collect_references(out);
                }
            }
            FieldValue::Null
            | FieldValue::Bool(_)
            | FieldValue::Number(_)
            | FieldValue::String(_)
            | FieldValue::Embedded(_) => {}
        }
    }
}

impl From<CacheReference> for FieldValue {
    fn from(value: CacheReference) -> Self {
        FieldValue::Reference(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_string())
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Number(value.into())
    }
}

/// One normalized entity: a key and its fields in insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    key: String,
    fields: IndexMap<String, FieldValue>,
}

impl Record {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            fields: IndexMap::new(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Insert or overwrite a field.
    pub fn add_field(&mut self, key: impl Into<String>, value: FieldValue) {
        self.fields.insert(key.into(), value);
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.add_field(key, value.into());
        self
    }

    /// `None` when the field was never stored; `Some(FieldValue::Null)` when it
    /// was stored as null.
    pub fn field(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    pub fn has_field(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Fully-qualified keys of every field.
    pub fn keys(&self) -> HashSet<String> {
        self.fields
            .keys()
            .map(|field| qualified_key(&self.key, field))
            .collect()
    }

    /// Every reference held by this record, lists included.
    pub fn references(&self) -> Vec<&CacheReference> {
        let mut out = Vec::new();
        for value in self.fields.values() {
            value.collect_references(&mut out);
        }
        out
    }

    /// Copy in every field of `other` that is missing here or holds a different
    /// value, and report the fully-qualified keys that changed.
    ///
    /// Fields with equal values are left untouched and not reported.
    ///
    /// # Panics
    ///
    /// When `other` has a different key. Merging unrelated records is a bug in
    /// the caller.
    pub fn merge_with(&mut self, other: Record) -> HashSet<String> {
        assert_eq!(
            self.key, other.key,
            "cannot merge record `{}` into record `{}`",
            other.key, self.key
        );

        let mut changed = HashSet::new();
        for (field, value) in other.fields {
            let differs = self
                .fields
                .get(&field)
                .is_none_or(|existing| *existing != value);
            if differs {
                changed.insert(qualified_key(&self.key, &field));
                self.fields.insert(field, value);
            }
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn absent_and_explicit_null_are_distinct() {
        let mut record = Record::new("1001");
        record.add_field("homePlanet", FieldValue::Null);

        assert_eq!(record.field("homePlanet"), Some(&FieldValue::Null));
        assert_eq!(record.field("primaryFunction"), None);
        assert!(record.has_field("homePlanet"));
        assert!(!record.has_field("primaryFunction"));
    }

    #[test]
    fn add_field_upserts_in_place() {
        let mut record = Record::new("1001")
            .with_field("name", "Luke")
            .with_field("height", 172_i64);
        record.add_field("name", "Luke Skywalker".into());

        let order: Vec<&str> = record.fields().map(|(key, _)| key).collect();
        assert_eq!(order, vec!["name", "height"]);
        assert_eq!(record.field("name"), Some(&FieldValue::from("Luke Skywalker")));
    }

    #[test]
    fn merge_reports_only_differing_fields() {
        let mut stored = Record::new("2001")
            .with_field("name", "R2-D2")
            .with_field("primaryFunction", "Astromech");
        let incoming = Record::new("2001")
            .with_field("name", "R2-D2")
            .with_field("primaryFunction", "Protocol")
            .with_field("appearsIn", FieldValue::List(vec!["NEWHOPE".into()]));

        let changed = stored.merge_with(incoming);

        assert_eq!(
            changed,
            HashSet::from([
                "2001.primaryFunction".to_string(),
                "2001.appearsIn".to_string()
            ])
        );
        assert_eq!(stored.field("primaryFunction"), Some(&FieldValue::from("Protocol")));
        assert_eq!(stored.len(), 3);
    }

    #[test]
    fn merge_of_identical_record_changes_nothing() {
        let mut stored = Record::new("2001").with_field("name", "R2-D2");
        let changed = stored.merge_with(stored.clone());
        assert!(changed.is_empty());
    }

    #[test]
    fn merge_keeps_fields_missing_from_incoming() {
        let mut stored = Record::new("2001")
            .with_field("name", "R2-D2")
            .with_field("primaryFunction", "Astromech");
        stored.merge_with(Record::new("2001").with_field("name", "Artoo"));

        assert_eq!(stored.field("primaryFunction"), Some(&FieldValue::from("Astromech")));
    }

    #[test]
    #[should_panic(expected = "cannot merge record")]
    fn merge_with_other_key_panics() {
        let mut stored = Record::new("2001");
        stored.merge_with(Record::new("1000"));
    }

    #[test]
    fn references_are_collected_through_lists() {
        let record = Record::new("hero")
            .with_field("bestFriend", CacheReference::new("1000"))
            .with_field(
                "friends",
                FieldValue::List(vec![
                    CacheReference::new("1002").into(),
                    FieldValue::List(vec![CacheReference::new("1003").into()]),
                    FieldValue::Null,
                ]),
            );

        let keys: Vec<&str> = record.references().iter().map(|r| r.key()).collect();
        assert_eq!(keys, vec!["1000", "1002", "1003"]);
    }

    #[test]
    fn persisted_json_promotes_references() {
        let value = FieldValue::List(vec![
            CacheReference::new("1002").into(),
            "plain".into(),
        ]);
        let json = value.to_json();
        assert_eq!(json, json!(["ApolloCacheReference{1002}", "plain"]));
        assert_eq!(FieldValue::from_persisted_json(json), value);
    }

    #[test]
    fn response_json_never_promotes_strings() {
        let value = FieldValue::from_json(json!("ApolloCacheReference{1002}"));
        assert!(matches!(value, FieldValue::String(_)));
    }
}
