//! Query watchers driven by writes from other operations.

use std::sync::{Arc, Mutex};

use gqlstore::cache::{
    ChangeEvent, Field, IdResolver, MemoryCacheStore, NormalizedCache, Operation, QueryWatcher,
    RealCache, Subscriber,
};
use serde_json::{Value, json};

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

fn hero_by_id() -> Operation {
    Operation::query(
        "HeroById",
        vec![
            Field::object(
                "character",
                vec![
                    Field::scalar("__typename"),
                    Field::scalar("id"),
                    Field::scalar("name"),
                ],
            )
            .with_argument("id", json!("2001")),
        ],
    )
}

#[test]
fn watcher_sees_updates_written_through_another_operation() {
    let cache = Arc::new(RealCache::new(
        MemoryCacheStore::unbounded(),
        Arc::new(IdResolver::new()),
    ));
    let written = cache
        .write_response(
            &hero_name(),
            &json!({"hero": {"__typename": "Droid", "id": "2001", "name": "R2-D2"}}),
        )
        .expect("seed");

    let seen: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let watcher = QueryWatcher::with_dependent_keys(
        &cache,
        hero_name(),
        written.dependent_keys,
        move |result| {
            let read = result.expect("re-read");
            sink.lock().expect("sink lock").push(read.data);
        },
    );

    cache
        .write_response(
            &hero_by_id(),
            &json!({"character": {"__typename": "Droid", "id": "2001", "name": "Artoo-Detoo"}}),
        )
        .expect("update");

    {
        let seen = seen.lock().expect("sink lock");
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0]["hero"]["name"], json!("Artoo-Detoo"));
    }

    assert!(watcher.cancel());
}

#[test]
fn every_subscriber_receives_the_same_event() {
    let cache = RealCache::new(MemoryCacheStore::unbounded(), Arc::new(IdResolver::new()));
    let events: Arc<Mutex<Vec<ChangeEvent>>> = Arc::new(Mutex::new(Vec::new()));

    for _ in 0..2 {
        let sink = Arc::clone(&events);
        let subscriber: Arc<dyn Subscriber> = Arc::new(move |event: &ChangeEvent| {
            sink.lock().expect("sink lock").push(event.clone());
        });
        cache.subscribe(subscriber);
    }

    cache
        .write_response(
            &hero_name(),
            &json!({"hero": {"__typename": "Droid", "id": "2001", "name": "R2-D2"}}),
        )
        .expect("write");

    let events = events.lock().expect("sink lock");
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].id, events[1].id);
    assert!(events[0].changed_keys.contains("2001.name"));
    assert!(events[0].changed_keys.contains("QUERY_ROOT.hero"));
}
