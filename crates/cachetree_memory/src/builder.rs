// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Builder for [`MemoryStore`].

use std::hash::Hash;
use std::marker::PhantomData;
use std::time::Duration;

use crate::store::MemoryStore;

/// Configures a [`MemoryStore`].
///
/// # Examples
///
/// ```
/// use cachetree_memory::MemoryStore;
/// use std::time::Duration;
///
/// let store = MemoryStore::<String, i32>::builder()
///     .max_capacity(10_000)
///     .initial_capacity(100)
///     .max_time_to_live(Duration::from_secs(3600))
///     .name("trees")
///     .build();
/// ```
#[derive(Debug)]
pub struct MemoryStoreBuilder<K, V> {
    pub(crate) max_capacity: Option<u64>,
    pub(crate) initial_capacity: Option<usize>,
    pub(crate) max_time_to_live: Option<Duration>,
    pub(crate) name: Option<String>,
    _phantom: PhantomData<(K, V)>,
}

impl<K, V> Default for MemoryStoreBuilder<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> MemoryStoreBuilder<K, V> {
    /// Creates a builder for an unbounded store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_capacity: None,
            initial_capacity: None,
            max_time_to_live: None,
            name: None,
            _phantom: PhantomData,
        }
    }

    /// Bounds the number of entries. Past the bound, entries are evicted with `TinyLFU`.
    #[must_use]
    pub fn max_capacity(mut self, capacity: u64) -> Self {
        self.max_capacity = Some(capacity);
        self
    }

    /// Pre-allocates room for `capacity` entries.
    #[must_use]
    pub fn initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = Some(capacity);
        self
    }

    /// Caps the life of every entry, including entries written without a TTL.
    ///
    /// An entry whose own TTL is shorter still expires after its own TTL.
    ///
    /// # Examples
    ///
    /// ```
    /// use cachetree_memory::MemoryStore;
    /// use std::time::Duration;
    ///
    /// let store = MemoryStore::<String, i32>::builder()
    ///     .max_time_to_live(Duration::from_secs(86_400))
    ///     .build();
    /// ```
    #[must_use]
    pub fn max_time_to_live(mut self, duration: Duration) -> Self {
        self.max_time_to_live = Some(duration);
        self
    }

    /// Names the store in moka's debugging output.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Builds the store.
    #[must_use]
    pub fn build(self) -> MemoryStore<K, V>
    where
        K: Hash + Eq + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        MemoryStore::from_builder(&self)
    }
}
