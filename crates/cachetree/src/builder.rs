// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Builder for [`CacheTree`].

#[cfg(feature = "memory")]
use cachetree_memory::MemoryStore;
use cachetree_store::CacheStore;

use crate::{
    accessor::EntityAccessor,
    error::ConfigError,
    instance::CachedValue,
    registry::{RegistryConfig, SpecRegistry},
    settings::Settings,
    telemetry::CacheTreeTelemetry,
    tree::CacheTree,
};

/// Builds a [`CacheTree`] from a configuration, a data source and a store.
///
/// Created by [`CacheTree::builder`]. The data source and the store are required; the
/// builder only offers [`CacheTreeBuilder::build`] once both are set.
///
/// # Examples
///
/// ```
/// # #[cfg(all(feature = "test-util", feature = "memory"))]
/// # fn main() {
/// use cachetree::testing::MemoryGraph;
/// use cachetree::{CacheSpecConfig, CacheTree, RegistryConfig, Settings};
///
/// let graph = MemoryGraph::builder().entity("Parent", "id", ["name"]).build();
/// let tree = CacheTree::builder(RegistryConfig::new().cache("Parent", CacheSpecConfig::new()))
///     .accessor(graph)
///     .memory()
///     .settings(Settings::default().collection_prefix("cached_"))
///     .build()
///     .unwrap();
/// assert_eq!(tree.settings().prefix(), "cached_");
/// # }
/// # #[cfg(not(all(feature = "test-util", feature = "memory")))]
/// # fn main() {}
/// ```
#[derive(Debug)]
pub struct CacheTreeBuilder<A = (), S = ()> {
    config: RegistryConfig,
    accessor: A,
    store: S,
    settings: Settings,
    telemetry: CacheTreeTelemetry,
}

impl CacheTreeBuilder {
    pub(crate) fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            accessor: (),
            store: (),
            settings: Settings::default(),
            telemetry: CacheTreeTelemetry::default(),
        }
    }
}

impl<S> CacheTreeBuilder<(), S> {
    /// Sets the data source.
    pub fn accessor<A>(self, accessor: A) -> CacheTreeBuilder<A, S>
    where
        A: EntityAccessor,
    {
        CacheTreeBuilder {
            config: self.config,
            accessor,
            store: self.store,
            settings: self.settings,
            telemetry: self.telemetry,
        }
    }
}

impl<A> CacheTreeBuilder<A, ()> {
    /// Sets the cache store.
    pub fn store<S>(self, store: S) -> CacheTreeBuilder<A, S>
    where
        S: CacheStore<String, CachedValue>,
    {
        CacheTreeBuilder {
            config: self.config,
            accessor: self.accessor,
            store,
            settings: self.settings,
            telemetry: self.telemetry,
        }
    }

    /// Stores cached trees in an unbounded in-memory store.
    #[cfg(feature = "memory")]
    #[must_use]
    pub fn memory(self) -> CacheTreeBuilder<A, MemoryStore<String, CachedValue>> {
        self.store(MemoryStore::new())
    }
}

impl<A, S> CacheTreeBuilder<A, S> {
    /// Sets the runtime switches.
    #[must_use]
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Sets where events are reported.
    #[must_use]
    pub fn telemetry(mut self, telemetry: CacheTreeTelemetry) -> Self {
        self.telemetry = telemetry;
        self
    }
}

impl<A, S> CacheTreeBuilder<A, S>
where
    A: EntityAccessor,
    S: CacheStore<String, CachedValue>,
{
    /// Resolves the configuration against the data source and builds the cache tree.
    ///
    /// # Errors
    ///
    /// Any [`ConfigError`] found while resolving the configuration.
    pub fn build(self) -> Result<CacheTree<A, S>, ConfigError> {
        let registry = SpecRegistry::build(&self.config, &self.accessor)?;
        Ok(CacheTree::from_parts(registry, self.accessor, self.store, self.settings, self.telemetry))
    }
}
