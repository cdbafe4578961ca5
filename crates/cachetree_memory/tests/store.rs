// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Integration tests for `MemoryStore`.

use std::time::Duration;

use cachetree_memory::{MemoryStore, MemoryStoreBuilder};
use cachetree_store::{CacheEntry, CacheStore};

fn block_on<F: std::future::Future>(f: F) -> F::Output {
    futures::executor::block_on(f)
}

fn key(name: &str) -> String {
    name.to_string()
}

#[test]
fn new_store_is_empty() {
    let store = MemoryStore::<String, i32>::new();
    assert_eq!(store.len(), Some(0));
    assert_eq!(store.is_empty(), Some(true));
}

#[test]
fn insert_get_and_overwrite() {
    block_on(async {
        let store = MemoryStore::<String, i32>::default();
        store.insert(&key("k"), CacheEntry::new(1)).await.unwrap();
        store.insert(&key("k"), CacheEntry::new(2)).await.unwrap();

        let entry = store.get(&key("k")).await.unwrap().expect("entry should exist");
        assert_eq!(*entry.value(), 2);
        assert!(store.get(&key("missing")).await.unwrap().is_none());
    });
}

#[test]
fn batched_operations_use_single_key_paths() {
    block_on(async {
        let store = MemoryStore::<String, i32>::new();
        store
            .insert_many(vec![(key("a"), CacheEntry::new(1)), (key("b"), CacheEntry::new(2))])
            .await
            .unwrap();

        let hits = store.get_many(&[key("a"), key("b"), key("c")]).await.unwrap();
        assert_eq!(hits.len(), 2);

        store.invalidate_many(&[key("a"), key("c")]).await.unwrap();
        assert!(store.get(&key("a")).await.unwrap().is_none());
        assert!(store.get(&key("b")).await.unwrap().is_some());
    });
}

#[test]
fn entry_ttl_expires_only_that_entry() {
    block_on(async {
        let store = MemoryStore::<String, i32>::new();
        store
            .insert(&key("short"), CacheEntry::with_ttl(1, Duration::from_millis(50)))
            .await
            .unwrap();
        store.insert(&key("long"), CacheEntry::new(2)).await.unwrap();

        std::thread::sleep(Duration::from_millis(150));

        assert!(store.get(&key("short")).await.unwrap().is_none());
        assert!(store.get(&key("long")).await.unwrap().is_some());
    });
}

#[test]
fn rewrite_without_ttl_clears_expiry() {
    block_on(async {
        let store = MemoryStore::<String, i32>::new();
        store
            .insert(&key("k"), CacheEntry::with_ttl(1, Duration::from_millis(50)))
            .await
            .unwrap();
        store.insert(&key("k"), CacheEntry::new(2)).await.unwrap();

        std::thread::sleep(Duration::from_millis(150));

        let entry = store.get(&key("k")).await.unwrap().expect("entry should survive");
        assert_eq!(*entry.value(), 2);
    });
}

#[test]
fn clear_and_len() {
    block_on(async {
        let store = MemoryStoreBuilder::<String, i32>::new().name("test").initial_capacity(8).build();
        store.insert(&key("a"), CacheEntry::new(1)).await.unwrap();
        store.insert(&key("b"), CacheEntry::new(2)).await.unwrap();
        store.run_pending_tasks().await;
        assert_eq!(store.len(), Some(2));

        store.clear().await.unwrap();
        store.run_pending_tasks().await;
        assert_eq!(store.len(), Some(0));
    });
}

#[test]
fn capacity_bound_evicts() {
    block_on(async {
        let store = MemoryStore::<u32, u32>::with_capacity(10);
        for i in 0..100 {
            store.insert(&i, CacheEntry::new(i)).await.unwrap();
        }
        store.run_pending_tasks().await;
        assert!(store.len().is_some_and(|len| len <= 10));
    });
}
