// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The cache tree: one object owning the engines' collaborators and the event entry points.

use std::sync::atomic::{AtomicUsize, Ordering};

use cachetree_store::CacheStore;

use crate::{
    accessor::{CachingAccessor, EntityAccessor},
    builder::CacheTreeBuilder,
    error::{Error, Result},
    instance::{CachedValue, Instance},
    invalidate::{InvalidationEngine, InvalidationReport, LinkChange},
    key::Lookup,
    populate::PopulationEngine,
    registry::{RegistryConfig, SpecRegistry},
    settings::Settings,
    telemetry::CacheTreeTelemetry,
    value::EntityType,
};

/// Caches trees of related entities and invalidates them when entities change.
///
/// Lookups go through [`CacheTree::get_cached`]. The host reports changes through
/// [`CacheTree::on_instance_changed`] (an entity was created, updated or deleted) and
/// [`CacheTree::on_relation_link_changed`] (links of a collection were added, removed or
/// are about to be cleared).
///
/// # Examples
///
/// ```
/// # #[cfg(all(feature = "test-util", feature = "memory"))]
/// # futures::executor::block_on(async {
/// use cachetree::testing::MemoryGraph;
/// use cachetree::{CacheTree, FieldValue, Instance, Lookup, PrefetchConfig, RegistryConfig};
///
/// let graph = MemoryGraph::builder()
///     .entity("Parent", "id", ["name"])
///     .entity("Child", "id", ["parent_id"])
///     .foreign_key("Child", "parent_id", "parent", "Parent", "children")
///     .build();
/// graph.save(&mut Instance::new("Parent", "id", [("id", 1)]));
/// graph.save(&mut Instance::new("Parent", "id", [("id", 2)]));
/// graph.save(&mut Instance::new("Child", "id", [("id", 5), ("parent_id", 1)]));
///
/// let config = RegistryConfig::new().cache_with("Parent", |spec| spec.prefetch(PrefetchConfig::new().leaf("children")));
/// let tree = CacheTree::builder(config).accessor(graph.clone()).memory().build().unwrap();
///
/// let parent = tree.get_cached("Parent", &Lookup::new().with("id", 1)).await.unwrap();
/// assert_eq!(parent.prefetched("_cached_children").unwrap().instances().len(), 1);
///
/// let mut child = graph.get("Child", 5).unwrap();
/// child.set("parent_id", 2);
/// graph.save(&mut child.clone());
/// let report = tree.on_instance_changed(&mut child).await.unwrap();
/// assert_eq!(report.roots(), 2);
/// # });
/// ```
#[derive(Debug)]
pub struct CacheTree<A, S> {
    registry: SpecRegistry,
    accessor: A,
    store: S,
    settings: Settings,
    telemetry: CacheTreeTelemetry,
    paused: AtomicUsize,
}

impl CacheTree<(), ()> {
    /// Starts building a cache tree for `config`.
    #[must_use]
    pub fn builder(config: RegistryConfig) -> CacheTreeBuilder {
        CacheTreeBuilder::new(config)
    }
}

impl<A, S> CacheTree<A, S>
where
    A: EntityAccessor,
    S: CacheStore<String, CachedValue>,
{
    pub(crate) fn from_parts(registry: SpecRegistry, accessor: A, store: S, settings: Settings, telemetry: CacheTreeTelemetry) -> Self {
        Self {
            registry,
            accessor,
            store,
            settings,
            telemetry,
            paused: AtomicUsize::new(0),
        }
    }

    /// Returns the resolved cache specs and invalidation paths.
    #[must_use]
    pub fn registry(&self) -> &SpecRegistry {
        &self.registry
    }

    /// Returns the data source.
    #[must_use]
    pub fn accessor(&self) -> &A {
        &self.accessor
    }

    /// Returns the cache store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns the runtime switches.
    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Returns the read-path engine.
    #[must_use]
    pub fn population(&self) -> PopulationEngine<'_, A, S> {
        PopulationEngine::new(&self.registry, &self.accessor, &self.store)
            .with_settings(&self.settings)
            .with_telemetry(&self.telemetry)
    }

    /// Returns the write-path engine.
    #[must_use]
    pub fn invalidation(&self) -> InvalidationEngine<'_, A, S> {
        InvalidationEngine::new(&self.registry, &self.accessor, &self.store)
            .with_settings(&self.settings)
            .with_telemetry(&self.telemetry)
    }

    /// Returns the data source wrapped so that relations read from a cached instance are
    /// answered from the sub-trees attached to it.
    #[must_use]
    pub fn caching_accessor(&self) -> CachingAccessor<&A> {
        CachingAccessor::with_prefix(&self.accessor, self.settings.prefix().to_owned())
    }

    /// Returns the entity of `entity_type` matching `lookup`. See [`PopulationEngine::get_cached`].
    pub async fn get_cached(&self, entity_type: impl Into<EntityType>, lookup: &Lookup) -> Result<Instance> {
        self.population().get_cached(&entity_type.into(), lookup).await
    }

    /// Returns the cached value of every lookup, in order. See [`PopulationEngine::get_many_cached`].
    pub async fn get_many_cached(&self, entity_type: impl Into<EntityType>, lookups: &[Lookup]) -> Result<Vec<CachedValue>> {
        self.population().get_many_cached(&entity_type.into(), lookups).await
    }

    /// Like [`CacheTree::get_cached`], with a lookup that matches nothing answered as `None`.
    pub async fn find_cached(&self, entity_type: impl Into<EntityType>, lookup: &Lookup) -> Result<Option<Instance>> {
        match self.get_cached(entity_type, lookup).await {
            Ok(instance) => Ok(Some(instance)),
            Err(Error::NotFound { .. }) => Ok(None),
            Err(error) => Err(error),
        }
    }

    /// Reports that `instance` was created, updated or deleted. Its baseline is the state
    /// it is diffed against.
    ///
    /// Does nothing while invalidation is turned off or suspended, or if no cached tree
    /// reaches the instance's type.
    pub async fn on_instance_changed(&self, instance: &mut Instance) -> Result<InvalidationReport> {
        if !self.is_active() || !self.registry.is_cacheable(instance.entity_type()) {
            return Ok(InvalidationReport::default());
        }
        self.invalidation().invalidate_instance(instance).await
    }

    /// Reports a link change on a collection of `owner`.
    ///
    /// The owner's cached view of the collection is dropped first, so reading the relation
    /// from `owner` afterwards goes to the data source. Clearing must be reported before the
    /// links are removed.
    pub async fn on_relation_link_changed(&self, owner: &mut Instance, change: &LinkChange) -> Result<InvalidationReport> {
        owner.uncache(&format!("{}{}", self.settings.prefix(), change.relation()));
        if !self.is_active() {
            return Ok(InvalidationReport::default());
        }
        self.invalidation().invalidate_link_change(owner, change).await
    }

    /// Invalidates `instances` now, even while invalidation is suspended.
    pub async fn invalidate(&self, instances: &mut [Instance]) -> Result<InvalidationReport> {
        self.invalidation().invalidate_instances(instances).await
    }

    /// Suspends the event entry points until the returned guard is dropped.
    ///
    /// Guards nest: events resume once every guard is gone. [`CacheTree::invalidate`] is
    /// not affected.
    pub fn suspend_invalidation(&self) -> InvalidationPause<'_> {
        self.paused.fetch_add(1, Ordering::AcqRel);
        InvalidationPause { paused: &self.paused }
    }

    /// Returns `true` while at least one [`InvalidationPause`] is alive.
    #[must_use]
    pub fn is_invalidation_suspended(&self) -> bool {
        self.paused.load(Ordering::Acquire) > 0
    }

    fn is_active(&self) -> bool {
        self.settings.is_invalidation_enabled() && !self.is_invalidation_suspended()
    }
}

/// Suspends event-driven invalidation of a [`CacheTree`] while alive.
#[derive(Debug)]
#[must_use = "invalidation resumes as soon as the guard is dropped"]
pub struct InvalidationPause<'a> {
    paused: &'a AtomicUsize,
}

impl Drop for InvalidationPause<'_> {
    fn drop(&mut self) {
        self.paused.fetch_sub(1, Ordering::AcqRel);
    }
}
