// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Contract tests for the default batched operations of [`CacheStore`].

use std::{collections::HashMap, hash::Hash, time::Duration};

use cachetree_store::testing::{MockStore, StoreOp};
use cachetree_store::{CacheEntry, CacheStore, Error};

/// Forwards single-key operations to a [`MockStore`] and keeps the default batch methods.
struct SingleKeyStore<K, V>(MockStore<K, V>);

impl<K, V> CacheStore<K, V> for SingleKeyStore<K, V>
where
    K: Clone + Eq + Hash + Send + Sync,
    V: Clone + Send + Sync,
{
    async fn get(&self, key: &K) -> Result<Option<CacheEntry<V>>, Error> {
        self.0.get(key).await
    }

    async fn insert(&self, key: &K, entry: CacheEntry<V>) -> Result<(), Error> {
        self.0.insert(key, entry).await
    }

    async fn invalidate(&self, key: &K) -> Result<(), Error> {
        self.0.invalidate(key).await
    }

    async fn clear(&self) -> Result<(), Error> {
        self.0.clear().await
    }
}

fn keys(names: &[&str]) -> Vec<String> {
    names.iter().map(ToString::to_string).collect()
}

#[tokio::test]
async fn default_get_many_skips_missing_keys() {
    let inner = MockStore::<String, i32>::new();
    let store = SingleKeyStore(inner.clone());
    store.insert(&"a".to_string(), CacheEntry::new(1)).await.unwrap();
    inner.clear_operations();

    let hits: HashMap<String, CacheEntry<i32>> = store.get_many(&keys(&["a", "b"])).await.unwrap();

    assert_eq!(hits.len(), 1);
    assert_eq!(*hits["a"].value(), 1);
    assert_eq!(
        inner.operations(),
        vec![StoreOp::Get("a".to_string()), StoreOp::Get("b".to_string())]
    );
}

#[tokio::test]
async fn default_insert_many_keeps_each_ttl() {
    let inner = MockStore::<String, &'static str>::new();
    let store = SingleKeyStore(inner.clone());

    store
        .insert_many(vec![
            ("short".to_string(), CacheEntry::with_ttl("s", Duration::from_secs(5))),
            ("forever".to_string(), CacheEntry::new("f")),
        ])
        .await
        .unwrap();

    assert_eq!(inner.entry(&"short".to_string()).and_then(|e| e.ttl()), Some(Duration::from_secs(5)));
    assert_eq!(inner.entry(&"forever".to_string()).and_then(|e| e.ttl()), None);
    assert_eq!(inner.operations().len(), 2);
}

#[tokio::test]
async fn default_invalidate_many_stops_at_first_failure() {
    let inner = MockStore::<String, i32>::new();
    let store = SingleKeyStore(inner.clone());
    for key in keys(&["a", "b", "c"]) {
        store.insert(&key, CacheEntry::new(0)).await.unwrap();
    }
    inner.fail_when(|op| matches!(op, StoreOp::Invalidate(k) if k == "b"));

    let result = store.invalidate_many(&keys(&["a", "b", "c"])).await;

    assert!(result.is_err());
    assert!(!inner.contains_key(&"a".to_string()));
    assert!(inner.contains_key(&"b".to_string()));
    assert!(inner.contains_key(&"c".to_string()));
}

#[tokio::test]
async fn size_is_unknown_unless_tracked() {
    let inner = MockStore::<String, i32>::new();
    let store = SingleKeyStore(inner.clone());
    assert_eq!(store.len(), None);
    assert_eq!(store.is_empty(), None);

    inner.insert(&"a".to_string(), CacheEntry::new(1)).await.unwrap();
    assert_eq!(inner.len(), Some(1));
    assert_eq!(inner.is_empty(), Some(false));
}

#[tokio::test]
async fn clear_removes_everything() {
    let store = MockStore::<String, i32>::new();
    store.insert_many(vec![("a".to_string(), CacheEntry::new(1))]).await.unwrap();
    store.clear().await.unwrap();
    assert_eq!(store.entry_count(), 0);
    assert_eq!(store.operations().last(), Some(&StoreOp::Clear));
}
