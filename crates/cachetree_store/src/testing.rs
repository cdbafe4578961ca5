// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Recording store for tests.
//!
//! [`MockStore`] keeps its entries in a map, records every operation it receives, and can be
//! told to fail selected operations. Batched operations are recorded as a single
//! [`StoreOp`] so tests can assert how many round trips the engine made.

use std::{collections::HashMap, hash::Hash, sync::Arc};

use parking_lot::Mutex;

use crate::{CacheEntry, CacheStore, Error};

/// An operation received by a [`MockStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp<K, V> {
    /// A single-key read.
    Get(K),
    /// A batched read.
    GetMany(Vec<K>),
    /// A single-key write.
    Insert {
        /// The key written.
        key: K,
        /// The entry written.
        entry: CacheEntry<V>,
    },
    /// A batched write.
    InsertMany(Vec<(K, CacheEntry<V>)>),
    /// A single-key removal.
    Invalidate(K),
    /// A batched removal.
    InvalidateMany(Vec<K>),
    /// A full clear.
    Clear,
}

type FailPredicate<K, V> = Box<dyn Fn(&StoreOp<K, V>) -> bool + Send + Sync>;

/// An in-memory [`CacheStore`] that records operations and injects failures.
///
/// Entries never expire; the TTL each entry was written with is visible through
/// [`MockStore::entry`] and the recorded [`StoreOp::Insert`]/[`StoreOp::InsertMany`] operations.
///
/// # Examples
///
/// ```
/// use cachetree_store::testing::{MockStore, StoreOp};
/// use cachetree_store::{CacheEntry, CacheStore};
///
/// # futures::executor::block_on(async {
/// let store = MockStore::<String, i32>::new();
/// store.insert(&"a".to_string(), CacheEntry::new(1)).await.unwrap();
///
/// store.fail_when(|op| matches!(op, StoreOp::InvalidateMany(_)));
/// assert!(store.invalidate_many(&["a".to_string()]).await.is_err());
/// assert!(store.contains_key(&"a".to_string()));
/// # });
/// ```
pub struct MockStore<K, V> {
    data: Arc<Mutex<HashMap<K, CacheEntry<V>>>>,
    operations: Arc<Mutex<Vec<StoreOp<K, V>>>>,
    fail_when: Arc<Mutex<Option<FailPredicate<K, V>>>>,
}

impl<K, V> std::fmt::Debug for MockStore<K, V>
where
    K: std::fmt::Debug,
    V: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockStore")
            .field("data", &self.data)
            .field("operations", &self.operations)
            .field("fail_when", &self.fail_when.lock().is_some())
            .finish()
    }
}

impl<K, V> Clone for MockStore<K, V> {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
            operations: Arc::clone(&self.operations),
            fail_when: Arc::clone(&self.fail_when),
        }
    }
}

impl<K, V> Default for MockStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> MockStore<K, V> {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: Arc::new(Mutex::new(HashMap::new())),
            operations: Arc::new(Mutex::new(Vec::new())),
            fail_when: Arc::new(Mutex::new(None)),
        }
    }

    /// Returns the number of stored entries.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.data.lock().len()
    }
}

impl<K, V> MockStore<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    /// Returns `true` if an entry is stored under `key`.
    #[must_use]
    pub fn contains_key(&self, key: &K) -> bool {
        self.data.lock().contains_key(key)
    }

    /// Returns a copy of the entry stored under `key`.
    #[must_use]
    pub fn entry(&self, key: &K) -> Option<CacheEntry<V>> {
        self.data.lock().get(key).cloned()
    }
}

impl<K, V> MockStore<K, V>
where
    K: Clone,
    V: Clone,
{
    /// Makes every operation matching `predicate` fail without touching the data.
    pub fn fail_when<F>(&self, predicate: F)
    where
        F: Fn(&StoreOp<K, V>) -> bool + Send + Sync + 'static,
    {
        *self.fail_when.lock() = Some(Box::new(predicate));
    }

    /// Removes the failure predicate.
    pub fn clear_failures(&self) {
        *self.fail_when.lock() = None;
    }

    /// Returns every operation received so far, oldest first.
    #[must_use]
    pub fn operations(&self) -> Vec<StoreOp<K, V>> {
        self.operations.lock().clone()
    }

    /// Forgets the recorded operations.
    pub fn clear_operations(&self) {
        self.operations.lock().clear();
    }

    /// Records `op` and reports whether it must fail.
    fn admit(&self, op: StoreOp<K, V>, name: &'static str) -> Result<(), Error> {
        let fail = self.fail_when.lock().as_ref().is_some_and(|predicate| predicate(&op));
        self.operations.lock().push(op);
        if fail {
            return Err(Error::from_message(format!("mock: {name} failed")));
        }
        Ok(())
    }
}

impl<K, V> CacheStore<K, V> for MockStore<K, V>
where
    K: Clone + Eq + Hash + Send + Sync,
    V: Clone + Send + Sync,
{
    async fn get(&self, key: &K) -> Result<Option<CacheEntry<V>>, Error> {
        self.admit(StoreOp::Get(key.clone()), "get")?;
        Ok(self.data.lock().get(key).cloned())
    }

    async fn insert(&self, key: &K, entry: CacheEntry<V>) -> Result<(), Error> {
        self.admit(
            StoreOp::Insert {
                key: key.clone(),
                entry: entry.clone(),
            },
            "insert",
        )?;
        self.data.lock().insert(key.clone(), entry);
        Ok(())
    }

    async fn invalidate(&self, key: &K) -> Result<(), Error> {
        self.admit(StoreOp::Invalidate(key.clone()), "invalidate")?;
        self.data.lock().remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<(), Error> {
        self.admit(StoreOp::Clear, "clear")?;
        self.data.lock().clear();
        Ok(())
    }

    async fn get_many(&self, keys: &[K]) -> Result<HashMap<K, CacheEntry<V>>, Error> {
        self.admit(StoreOp::GetMany(keys.to_vec()), "get_many")?;
        let data = self.data.lock();
        Ok(keys
            .iter()
            .filter_map(|key| data.get(key).map(|entry| (key.clone(), entry.clone())))
            .collect())
    }

    async fn insert_many(&self, entries: Vec<(K, CacheEntry<V>)>) -> Result<(), Error> {
        self.admit(StoreOp::InsertMany(entries.clone()), "insert_many")?;
        self.data.lock().extend(entries);
        Ok(())
    }

    async fn invalidate_many(&self, keys: &[K]) -> Result<(), Error> {
        self.admit(StoreOp::InvalidateMany(keys.to_vec()), "invalidate_many")?;
        let mut data = self.data.lock();
        for key in keys {
            data.remove(key);
        }
        Ok(())
    }

    #[expect(clippy::cast_possible_truncation, reason = "entry counts in tests are tiny")]
    fn len(&self) -> Option<u64> {
        Some(self.data.lock().len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block_on<F: std::future::Future>(f: F) -> F::Output {
        futures::executor::block_on(f)
    }

    #[test]
    fn batched_operations_are_recorded_once() {
        block_on(async {
            let store = MockStore::<String, i32>::new();
            store
                .insert_many(vec![("a".to_string(), CacheEntry::new(1)), ("b".to_string(), CacheEntry::new(2))])
                .await
                .unwrap();
            let hits = store.get_many(&["a".to_string(), "c".to_string()]).await.unwrap();
            store.invalidate_many(&["a".to_string(), "b".to_string()]).await.unwrap();

            assert_eq!(hits.len(), 1);
            assert_eq!(store.entry_count(), 0);
            assert_eq!(store.operations().len(), 3);
            assert!(matches!(store.operations()[1], StoreOp::GetMany(ref keys) if keys.len() == 2));
        });
    }

    #[test]
    fn failed_operation_is_recorded_and_leaves_data_untouched() {
        block_on(async {
            let store = MockStore::<String, i32>::new();
            store.insert(&"a".to_string(), CacheEntry::new(1)).await.unwrap();
            store.fail_when(|op| matches!(op, StoreOp::Invalidate(_)));

            assert!(store.invalidate(&"a".to_string()).await.is_err());
            assert!(store.contains_key(&"a".to_string()));
            assert_eq!(store.operations().last(), Some(&StoreOp::Invalidate("a".to_string())));

            store.clear_failures();
            store.invalidate(&"a".to_string()).await.unwrap();
            assert!(!store.contains_key(&"a".to_string()));
        });
    }

    #[test]
    fn clones_share_state() {
        let store = MockStore::<String, i32>::new();
        let clone = store.clone();
        block_on(clone.insert(&"k".to_string(), CacheEntry::new(5))).unwrap();
        assert_eq!(store.entry(&"k".to_string()).map(CacheEntry::into_value), Some(5));
        store.clear_operations();
        assert!(clone.operations().is_empty());
    }
}
