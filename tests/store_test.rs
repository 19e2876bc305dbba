//! Integration tests for the collaborator store surfaces
//!
//! `Store` derives keys through the injected key function and returns
//! errors; `ThreadSafeStore` takes explicit keys and terminates the
//! process on storage failure, because its interface has no error
//! channel.

mod common;

use std::collections::HashMap;
use std::sync::Arc;

use common::Car;
use hindsight::{CacheError, Indexer, JsonCodec, KeyFunc, Store, ThreadSafeStore};
use tempfile::TempDir;

// ── Test helpers ────────────────────────────────────────────────────────

fn open_backend(dir: &TempDir) -> Indexer<Car> {
    Indexer::open(
        dir.path().join("cars.sqlite"),
        JsonCodec::new(),
        common::brand_indexers(),
    )
    .unwrap()
}

// ── Store ───────────────────────────────────────────────────────────────

#[test]
fn test_store_add_get_update_delete() {
    let dir = TempDir::new().unwrap();
    let store = Store::new(open_backend(&dir), common::key_func());

    let mut red = common::car("testa rossa", 1, 4, "ferrari", "red");
    store.add(&red).unwrap();

    let found = store.get(&red).unwrap().unwrap();
    assert_eq!(found, red);
    assert_eq!(store.get_by_key("testa rossa").unwrap().unwrap(), red);

    red.revision = 2;
    red.color = "crimson".to_string();
    store.update(&red).unwrap();
    assert_eq!(store.get(&red).unwrap().unwrap().color, "crimson");

    store.delete(&red).unwrap();
    assert!(store.get(&red).unwrap().is_none());
}

#[test]
fn test_store_replace_and_resync() {
    let dir = TempDir::new().unwrap();
    let store = Store::new(open_backend(&dir), common::key_func());

    store
        .add(&common::car("old", 1, 4, "ford", "red"))
        .unwrap();
    store
        .replace(vec![
            common::car("new-1", 2, 4, "audi", "grey"),
            common::car("new-2", 3, 4, "audi", "black"),
        ])
        .unwrap();

    let mut keys = store.list_keys().unwrap();
    keys.sort();
    assert_eq!(keys, vec!["new-1", "new-2"]);
    assert_eq!(store.list().unwrap().len(), 2);

    // Resync is a contractual no-op.
    store.resync().unwrap();
    assert_eq!(store.list().unwrap().len(), 2);
}

#[test]
fn test_store_surfaces_key_func_error() {
    let dir = TempDir::new().unwrap();
    let failing: KeyFunc<Car> = Arc::new(|_: &Car| Err(CacheError::user_func("object has no key")));
    let store = Store::new(open_backend(&dir), failing);

    let result = store.add(&common::car("a", 1, 4, "ford", "red"));
    assert!(matches!(result, Err(CacheError::UserFunc(_))));
}

#[test]
fn test_store_operations_fail_after_close() {
    let dir = TempDir::new().unwrap();
    let store = Store::new(open_backend(&dir), common::key_func());

    store.close().unwrap();
    assert!(matches!(store.list(), Err(CacheError::Closed)));
    assert!(matches!(
        store.add(&common::car("a", 1, 4, "ford", "red")),
        Err(CacheError::Closed)
    ));
}

// ── ThreadSafeStore ─────────────────────────────────────────────────────

#[test]
fn test_thread_safe_store_round_trip() {
    let dir = TempDir::new().unwrap();
    let store = ThreadSafeStore::new(open_backend(&dir));

    let red = common::car("testa rossa", 1, 4, "ferrari", "red");
    store.add("testa rossa", &red);
    assert_eq!(store.get("testa rossa"), Some(red.clone()));
    assert_eq!(store.list().len(), 1);
    assert_eq!(store.list_keys(), vec!["testa rossa"]);

    let mut crimson = red;
    crimson.color = "crimson".to_string();
    store.update("testa rossa", &crimson);
    assert_eq!(store.get("testa rossa").unwrap().color, "crimson");

    store.delete("testa rossa");
    assert_eq!(store.get("testa rossa"), None);

    let mut fresh = HashMap::new();
    fresh.insert("focus".to_string(), common::car("focus", 2, 4, "ford", "blue"));
    store.replace(fresh);
    assert_eq!(store.list_keys(), vec!["focus"]);

    store.resync();
}

#[test]
#[should_panic(expected = "unrecoverable cache failure in ThreadSafeStore::list")]
fn test_thread_safe_store_panics_on_storage_failure() {
    let dir = TempDir::new().unwrap();
    let store = ThreadSafeStore::new(open_backend(&dir));

    // Closing the backend invalidates the handle; the error-less surface
    // has nowhere to put the failure.
    store.backend().close().unwrap();
    store.list();
}
