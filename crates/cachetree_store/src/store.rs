// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The store trait.

use std::{collections::HashMap, hash::Hash};

use crate::{CacheEntry, Error};

/// A key-value store with optional per-entry expiry.
///
/// `get`, `insert`, `invalidate` and `clear` are required. The batched operations
/// (`get_many`, `insert_many`, `invalidate_many`) default to sequential single-key calls.
/// Callers treat every batch as all-or-nothing: an implementation that overrides them must
/// not report success for a partially applied batch.
pub trait CacheStore<K, V>: Send + Sync
where
    K: Clone + Eq + Hash + Send + Sync,
    V: Send + Sync,
{
    /// Returns the live entry stored under `key`, if any.
    fn get(&self, key: &K) -> impl Future<Output = Result<Option<CacheEntry<V>>, Error>> + Send;

    /// Stores `entry` under `key`, replacing any previous entry.
    fn insert(&self, key: &K, entry: CacheEntry<V>) -> impl Future<Output = Result<(), Error>> + Send;

    /// Removes the entry stored under `key`. Removing a missing key is not an error.
    fn invalidate(&self, key: &K) -> impl Future<Output = Result<(), Error>> + Send;

    /// Removes every entry.
    fn clear(&self) -> impl Future<Output = Result<(), Error>> + Send;

    /// Returns the entries stored under `keys`; keys without a live entry are left out.
    fn get_many(&self, keys: &[K]) -> impl Future<Output = Result<HashMap<K, CacheEntry<V>>, Error>> + Send {
        async move {
            let mut hits = HashMap::with_capacity(keys.len());
            for key in keys {
                if let Some(entry) = self.get(key).await? {
                    hits.insert(key.clone(), entry);
                }
            }
            Ok(hits)
        }
    }

    /// Stores every `(key, entry)` pair.
    fn insert_many(&self, entries: Vec<(K, CacheEntry<V>)>) -> impl Future<Output = Result<(), Error>> + Send {
        async move {
            for (key, entry) in entries {
                self.insert(&key, entry).await?;
            }
            Ok(())
        }
    }

    /// Removes the entries stored under `keys`.
    fn invalidate_many(&self, keys: &[K]) -> impl Future<Output = Result<(), Error>> + Send {
        async move {
            for key in keys {
                self.invalidate(key).await?;
            }
            Ok(())
        }
    }

    /// Returns the number of entries, if the store tracks it.
    fn len(&self) -> Option<u64> {
        None
    }

    /// Returns `true` if the store holds no entries, if the store tracks its size.
    fn is_empty(&self) -> Option<bool> {
        self.len().map(|len| len == 0)
    }
}
