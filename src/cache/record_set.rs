//! Transient table of records produced by one normalization pass.

use std::collections::HashSet;

use indexmap::IndexMap;
use indexmap::map::Entry;

use super::record::Record;

/// Records by key, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordSet {
    records: IndexMap<String, Record>,
}

impl RecordSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Record> {
        self.records.get(key)
    }

    /// Merge `record` field by field into any record with the same key, or
    /// insert it. Returns the fully-qualified keys that changed; a new record
    /// reports all of its fields.
    pub fn merge(&mut self, record: Record) -> HashSet<String> {
        match self.records.entry(record.key().to_string()) {
            Entry::Occupied(mut existing) => existing.get_mut().merge_with(record),
            Entry::Vacant(slot) => {
                let changed = record.keys();
                slot.insert(record);
                changed
            }
        }
    }

    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.records.values()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records.into_values().collect()
    }
}

impl FromIterator<Record> for RecordSet {
    fn from_iter<I: IntoIterator<Item = Record>>(iter: I) -> Self {
        let mut set = RecordSet::new();
        for record in iter {
            set.merge(record);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_records_report_every_field() {
        let mut set = RecordSet::new();
        let changed = set.merge(Record::new("1000").with_field("name", "Luke"));

        assert_eq!(changed, HashSet::from(["1000.name".to_string()]));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn existing_records_merge_by_field() {
        let mut set = RecordSet::new();
        set.merge(
            Record::new("1000")
                .with_field("name", "Luke")
                .with_field("height", 172_i64),
        );
        let changed = set.merge(Record::new("1000").with_field("height", 180_i64));

        assert_eq!(changed, HashSet::from(["1000.height".to_string()]));
        let record = set.get("1000").expect("record present");
        assert_eq!(record.len(), 2);
    }

    #[test]
    fn order_follows_first_insertion() {
        let set: RecordSet = [Record::new("b"), Record::new("a"), Record::new("b")]
            .into_iter()
            .collect();
        assert_eq!(set.keys().collect::<Vec<_>>(), vec!["b", "a"]);
    }
}
