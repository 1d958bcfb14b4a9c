//! Disk-backed record store.
//!
//! One JSON file per record, named by the SHA-256 of the record key. Field
//! values are written with [`FieldValue::to_json`], so references travel as
//! prefixed strings and are promoted back on load.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};

use super::error::StoreError;
use super::record::{FieldValue, Record};
use super::store::{CacheStore, METRIC_STORE_HIT, METRIC_STORE_MISS};

const RECORD_EXTENSION: &str = "json";
const TEMP_EXTENSION: &str = "json.tmp";

#[derive(Serialize, Deserialize)]
struct PersistedRecord {
    key: String,
    fields: Map<String, Value>,
}

impl PersistedRecord {
    fn from_record(record: &Record) -> Self {
        Self {
            key: record.key().to_string(),
            fields: record
                .fields()
                .map(|(field, value)| (field.to_string(), value.to_json()))
                .collect(),
        }
    }

    fn into_record(self) -> Record {
        let mut record = Record::new(self.key);
        for (field, value) in self.fields {
            record.add_field(field, FieldValue::from_persisted_json(value));
        }
        record
    }
}

/// Store keeping each record in its own file under `directory`.
#[derive(Debug, Clone)]
pub struct DiskCacheStore {
    directory: PathBuf,
}

impl DiskCacheStore {
    /// Open (creating if needed) a store rooted at `directory`.
    pub fn open(directory: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let directory = directory.into();
        fs::create_dir_all(&directory).map_err(|err| StoreError::io(&directory, err))?;
        Ok(Self { directory })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        self.directory
            .join(format!("{}.{RECORD_EXTENSION}", hex::encode(hasher.finalize())))
    }

    fn read_file(&self, path: &Path) -> Result<Option<Record>, StoreError> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(StoreError::io(path, err)),
        };
        let persisted: PersistedRecord = serde_json::from_slice(&bytes)
            .map_err(|err| StoreError::corrupt(path, err.to_string()))?;
        Ok(Some(persisted.into_record()))
    }

    fn write_record(&self, record: &Record) -> Result<(), StoreError> {
        let path = self.path_for(record.key());
        let temp = path.with_extension(TEMP_EXTENSION);
        let body = serde_json::to_vec(&PersistedRecord::from_record(record)).map_err(|source| {
            StoreError::Serialization {
                key: record.key().to_string(),
                source,
            }
        })?;
        let mut file = File::create(&temp).map_err(|err| StoreError::io(&temp, err))?;
        file.write_all(&body)
            .and_then(|()| file.sync_all())
            .map_err(|err| StoreError::io(&temp, err))?;
        drop(file);
        fs::rename(&temp, &path).map_err(|err| StoreError::io(&path, err))
    }

    fn record_paths(&self) -> Result<Vec<PathBuf>, StoreError> {
        let entries =
            fs::read_dir(&self.directory).map_err(|err| StoreError::io(&self.directory, err))?;
        let mut paths = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|err| StoreError::io(&self.directory, err))?
                .path();
            if path.extension().and_then(|ext| ext.to_str()) == Some(RECORD_EXTENSION) {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }
}

impl CacheStore for DiskCacheStore {
    fn load_record(&self, key: &str) -> Result<Option<Record>, StoreError> {
        let path = self.path_for(key);
        let record = self.read_file(&path)?;
        match &record {
            Some(found) if found.key() != key => {
                return Err(StoreError::corrupt(
                    &path,
                    format!("expected record `{key}`, found `{}`", found.key()),
                ));
            }
            Some(_) => counter!(METRIC_STORE_HIT, "store" => "disk").increment(1),
            None => counter!(METRIC_STORE_MISS, "store" => "disk").increment(1),
        }
        Ok(record)
    }

    #[instrument(skip_all, fields(key = %record.key()))]
    fn merge(&mut self, record: Record) -> Result<HashSet<String>, StoreError> {
        match self.load_record(record.key())? {
            Some(mut existing) => {
                let changed = existing.merge_with(record);
                if !changed.is_empty() {
                    self.write_record(&existing)?;
                }
                Ok(changed)
            }
            None => {
                let changed = record.keys();
                self.write_record(&record)?;
                debug!(fields = changed.len(), "wrote new record to disk");
                Ok(changed)
            }
        }
    }

    fn remove_record(&mut self, key: &str) -> Result<bool, StoreError> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(StoreError::io(&path, err)),
        }
    }

    fn clear_all(&mut self) -> Result<(), StoreError> {
        for path in self.record_paths()? {
            fs::remove_file(&path).map_err(|err| StoreError::io(&path, err))?;
        }
        Ok(())
    }

    fn dump(&self) -> Result<Vec<Record>, StoreError> {
        let mut records = Vec::new();
        for path in self.record_paths()? {
            if let Some(record) = self.read_file(&path)? {
                records.push(record);
            }
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;
    use crate::cache::reference::CacheReference;

    fn hero() -> Record {
        let Value::Object(location) = json!({"lat": 1.5, "lng": -3}) else {
            unreachable!()
        };
        Record::new("QUERY_ROOT.hero")
            .with_field("name", "R2-D2")
            .with_field("nickname", "ApolloCacheReference")
            .with_field("bestFriend", CacheReference::new("1000"))
            .with_field(
                "friends",
                FieldValue::List(vec![CacheReference::new("1002").into(), FieldValue::Null]),
            )
            .with_field("location", FieldValue::Embedded(location))
    }

    #[test]
    fn records_round_trip_with_references() {
        let dir = TempDir::new().expect("tempdir");
        let mut store = DiskCacheStore::open(dir.path()).expect("open store");

        store.merge(hero()).expect("merge");
        let loaded = store
            .load_record("QUERY_ROOT.hero")
            .expect("load")
            .expect("present");

        assert_eq!(loaded, hero());
        assert_eq!(
            loaded.field("bestFriend").and_then(FieldValue::as_reference),
            Some(&CacheReference::new("1000"))
        );
        assert_eq!(loaded.field("nickname"), Some(&FieldValue::from("ApolloCacheReference")));
    }

    #[test]
    fn merge_reports_changes_and_persists_across_reopen() {
        let dir = TempDir::new().expect("tempdir");
        {
            let mut store = DiskCacheStore::open(dir.path()).expect("open store");
            store.merge(hero()).expect("merge");
            assert!(store.merge(hero()).expect("merge").is_empty());
        }

        let mut reopened = DiskCacheStore::open(dir.path()).expect("reopen store");
        let changed = reopened
            .merge(Record::new("QUERY_ROOT.hero").with_field("name", "Artoo"))
            .expect("merge");
        assert_eq!(changed, HashSet::from(["QUERY_ROOT.hero.name".to_string()]));
        assert_eq!(reopened.dump().expect("dump").len(), 1);
    }

    #[test]
    fn remove_and_clear() {
        let dir = TempDir::new().expect("tempdir");
        let mut store = DiskCacheStore::open(dir.path()).expect("open store");
        store.merge(hero()).expect("merge");
        store.merge(Record::new("1000").with_field("name", "Luke")).expect("merge");

        assert!(store.remove("1000", false).expect("remove"));
        assert!(!store.remove("1000", false).expect("remove"));

        store.clear_all().expect("clear");
        assert!(store.dump().expect("dump").is_empty());
    }

    #[test]
    fn corrupt_file_is_reported() {
        let dir = TempDir::new().expect("tempdir");
        let store = DiskCacheStore::open(dir.path()).expect("open store");
        fs::write(store.path_for("1000"), b"not json").expect("write garbage");

        let err = store.load_record("1000").expect_err("corrupt record");
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[test]
    fn unreadable_directory_is_an_io_error() {
        let dir = TempDir::new().expect("tempdir");
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"file, not a directory").expect("write file");

        let err = DiskCacheStore::open(&blocker).expect_err("cannot open over a file");
        assert!(matches!(err, StoreError::Io { .. }));
    }

    #[test]
    fn writes_leave_only_record_files() {
        let dir = TempDir::new().expect("tempdir");
        let mut store = DiskCacheStore::open(dir.path()).expect("open store");
        store.merge(hero()).expect("merge");
        store
            .merge(Record::new("QUERY_ROOT.hero").with_field("name", "Artoo"))
            .expect("merge");

        let names: Vec<PathBuf> = fs::read_dir(dir.path())
            .expect("read dir")
            .map(|entry| entry.expect("entry").path())
            .collect();
        assert_eq!(names, vec![store.path_for("QUERY_ROOT.hero")]);

        let body = fs::read(store.path_for("QUERY_ROOT.hero")).expect("read record");
        let persisted: Value = serde_json::from_slice(&body).expect("complete JSON");
        assert_eq!(persisted["fields"]["name"], json!("Artoo"));
    }
}
