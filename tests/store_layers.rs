//! Memory-over-disk stores built from configuration.

use std::collections::HashSet;
use std::sync::Arc;

use gqlstore::cache::{
    CacheConfig, CacheError, CacheStore, DiskCacheStore, Field, FieldValue, NormalizedCache,
    Operation, ReadError, Record, cache_from_config,
};
use serde_json::json;
use tempfile::TempDir;

fn hero_name() -> Operation {
    Operation::query(
        "HeroName",
        vec![Field::object(
            "hero",
            vec![
                Field::scalar("__typename"),
                Field::scalar("id"),
                Field::scalar("name"),
            ],
        )],
    )
}

fn disk_config(dir: &TempDir) -> CacheConfig {
    CacheConfig {
        disk_directory: Some(dir.path().to_path_buf()),
        ..Default::default()
    }
}

#[test]
fn records_survive_a_new_cache_over_the_same_directory() {
    let dir = TempDir::new().expect("tempdir");
    let data = json!({"hero": {"__typename": "Droid", "id": "2001", "name": "R2-D2"}});

    {
        let cache = cache_from_config(&disk_config(&dir)).expect("cache");
        cache.write_response(&hero_name(), &data).expect("write");
    }

    let reopened = cache_from_config(&disk_config(&dir)).expect("cache");
    let read = reopened.read_operation(&hero_name()).expect("read");
    assert_eq!(read.data, data);
}

#[test]
fn evicted_memory_records_are_served_from_disk() {
    let dir = TempDir::new().expect("tempdir");
    let config = CacheConfig {
        memory_max_records: 1,
        ..disk_config(&dir)
    };
    let cache = cache_from_config(&config).expect("cache");
    cache
        .write_records(vec![
            Record::new("1000").with_field("name", "Luke Skywalker"),
            Record::new("1002").with_field("name", "Han Solo"),
        ])
        .expect("write");

    let luke = cache.load_record("1000").expect("load").expect("on disk");
    assert_eq!(luke.field("name"), Some(&FieldValue::from("Luke Skywalker")));
    assert_eq!(cache.dump().expect("dump").len(), 2);
}

#[test]
fn partial_write_after_eviction_keeps_stored_fields() {
    let dir = TempDir::new().expect("tempdir");
    let config = CacheConfig {
        memory_max_records: 1,
        ..disk_config(&dir)
    };
    let cache = cache_from_config(&config).expect("cache");
    cache
        .write_records(vec![
            Record::new("1000")
                .with_field("name", "Luke Skywalker")
                .with_field("homePlanet", "Tatooine"),
            Record::new("1002").with_field("name", "Han Solo"),
        ])
        .expect("write");

    let changed = cache
        .write_records(vec![Record::new("1000").with_field("name", "Luke")])
        .expect("partial write");
    assert_eq!(changed, HashSet::from(["1000.name".to_string()]));

    let luke = cache.load_record("1000").expect("load").expect("present");
    assert_eq!(luke.field("name"), Some(&FieldValue::from("Luke")));
    assert_eq!(luke.field("homePlanet"), Some(&FieldValue::from("Tatooine")));
}

#[test]
fn second_process_keeps_root_fields_of_the_first() {
    let dir = TempDir::new().expect("tempdir");
    let hero = json!({"hero": {"__typename": "Droid", "id": "2001", "name": "R2-D2"}});

    {
        let cache = cache_from_config(&disk_config(&dir)).expect("cache");
        cache.write_response(&hero_name(), &hero).expect("write hero");
    }

    let droid_function = Operation::query(
        "DroidFunction",
        vec![Field::object(
            "droid",
            vec![
                Field::scalar("__typename"),
                Field::scalar("id"),
                Field::scalar("primaryFunction"),
            ],
        )],
    );
    let reopened = cache_from_config(&disk_config(&dir)).expect("cache");
    let droid_data = json!({
        "droid": {"__typename": "Droid", "id": "2001", "primaryFunction": "Astromech"}
    });
    let written = reopened
        .write_response(&droid_function, &droid_data)
        .expect("write droid");
    assert!(!written.changed_keys.contains("2001.id"));

    let read = reopened.read_operation(&hero_name()).expect("read hero");
    assert_eq!(read.data, hero);

    let droid = reopened.load_record("2001").expect("load").expect("present");
    assert_eq!(droid.field("name"), Some(&FieldValue::from("R2-D2")));
    assert_eq!(
        droid.field("primaryFunction"),
        Some(&FieldValue::from("Astromech"))
    );
}

#[test]
fn clear_all_empties_both_layers() {
    let dir = TempDir::new().expect("tempdir");
    let cache = cache_from_config(&disk_config(&dir)).expect("cache");
    cache
        .write_response(
            &hero_name(),
            &json!({"hero": {"__typename": "Droid", "id": "2001", "name": "R2-D2"}}),
        )
        .expect("write");

    cache.clear_all().expect("clear");

    assert!(cache.dump().expect("dump").is_empty());
    let disk = DiskCacheStore::open(dir.path()).expect("disk");
    assert!(disk.dump().expect("dump").is_empty());
    assert!(matches!(
        cache.read_operation(&hero_name()),
        Err(CacheError::Read(ReadError::CacheMiss { .. }))
    ));
}

#[test]
fn cascading_remove_follows_references() {
    let dir = TempDir::new().expect("tempdir");
    let cache = Arc::new(cache_from_config(&disk_config(&dir)).expect("cache"));
    cache
        .write_response(
            &hero_name(),
            &json!({"hero": {"__typename": "Droid", "id": "2001", "name": "R2-D2"}}),
        )
        .expect("write");

    let removed = cache
        .write_transaction(|tx| tx.remove("QUERY_ROOT", true))
        .expect("remove");
    assert!(removed);
    assert!(cache.load_record("2001").expect("load").is_none());
    assert!(cache.dump().expect("dump").is_empty());
}
