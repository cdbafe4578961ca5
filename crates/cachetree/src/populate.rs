// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The read path: cached lookups and recursive population of prefetch trees.

use std::collections::{HashMap, HashSet};

use cachetree_store::{CacheEntry, CacheStore};
use futures::future::BoxFuture;

use crate::{
    accessor::{AccessError, EntityAccessor, FetchOutcome},
    error::{ConfigError, Error, Result},
    instance::{CachedValue, Instance, Related},
    key::{KeyCodec, Lookup},
    registry::{CacheSpec, PrefetchTree, SpecRegistry},
    settings::Settings,
    telemetry::{Activity, CacheTreeTelemetry, Operation},
    value::EntityType,
};

pub(crate) static DEFAULT_SETTINGS: Settings = Settings::DEFAULT;
pub(crate) static DISABLED_TELEMETRY: CacheTreeTelemetry = CacheTreeTelemetry::disabled();

/// Answers lookups from the cache, filling it from the data source on a miss.
///
/// A miss fetches the entity, reads every relation of its prefetch tree (recursively) and
/// stores the fully populated tree under the lookup's key. Lookups that match nothing, or
/// more than one entity, are cached too.
///
/// # Examples
///
/// ```
/// # #[cfg(feature = "test-util")]
/// # futures::executor::block_on(async {
/// use cachetree::testing::MemoryGraph;
/// use cachetree::{CacheSpecConfig, Instance, Lookup, PopulationEngine, RegistryConfig, SpecRegistry};
/// use cachetree_store::testing::MockStore;
///
/// let graph = MemoryGraph::builder().entity("Parent", "id", ["name"]).build();
/// graph.save(&mut Instance::new("Parent", "id", [("id", 1)]));
///
/// let registry = SpecRegistry::build(&RegistryConfig::new().cache("Parent", CacheSpecConfig::new()), &graph).unwrap();
/// let store = MockStore::new();
/// let engine = PopulationEngine::new(&registry, &graph, &store);
///
/// engine.get_cached(&"Parent".into(), &Lookup::new().with("pk", 1)).await.unwrap();
/// engine.get_cached(&"Parent".into(), &Lookup::new().with("pk", 1)).await.unwrap();
/// assert_eq!(graph.fetch_count(), 1);
/// # });
/// ```
#[derive(Debug)]
pub struct PopulationEngine<'a, A, S> {
    registry: &'a SpecRegistry,
    accessor: &'a A,
    store: &'a S,
    settings: &'a Settings,
    telemetry: &'a CacheTreeTelemetry,
}

impl<'a, A, S> PopulationEngine<'a, A, S>
where
    A: EntityAccessor,
    S: CacheStore<String, CachedValue>,
{
    /// Creates an engine with default settings and no telemetry.
    #[must_use]
    pub fn new(registry: &'a SpecRegistry, accessor: &'a A, store: &'a S) -> Self {
        Self {
            registry,
            accessor,
            store,
            settings: &DEFAULT_SETTINGS,
            telemetry: &DISABLED_TELEMETRY,
        }
    }

    /// Uses `settings` instead of the defaults.
    #[must_use]
    pub fn with_settings(mut self, settings: &'a Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Reports to `telemetry`.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: &'a CacheTreeTelemetry) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Returns the entity of `entity_type` matching `lookup`, with its prefetch tree attached.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] or [`Error::Ambiguous`] when the lookup matches no entity or
    /// several; both outcomes are served from the cache on repeat. [`Error::Usage`] when the
    /// lookup fields match no declared lookup. Store and data-source failures propagate.
    pub async fn get_cached(&self, entity_type: &EntityType, lookup: &Lookup) -> Result<Instance> {
        if self.settings.is_disabled() {
            self.telemetry.record(entity_type, Operation::Get, Activity::Bypassed, 0);
            let outcome = self.accessor.fetch_one(entity_type, lookup).await?;
            return resolve(entity_type, lookup, uncached(outcome));
        }

        let spec = self.spec(entity_type)?;
        spec.validate_lookup(lookup)?;
        let key = KeyCodec::derive(entity_type, lookup);

        let cached = self
            .store
            .get(&key)
            .await
            .map_err(|error| self.store_failed(entity_type, Operation::Get, 1, error))?;
        if let Some(entry) = cached {
            self.telemetry.record(entity_type, Operation::Get, Activity::Hit, 1);
            return resolve(entity_type, lookup, entry.into_value());
        }
        self.telemetry.record(entity_type, Operation::Get, Activity::Miss, 1);

        let outcome = self.accessor.fetch_one(entity_type, lookup).await?;
        let value = self.load(spec, outcome).await?;
        self.store
            .insert(&key, CacheEntry::with_optional_ttl(value.clone(), spec.ttl()))
            .await
            .map_err(|error| self.store_failed(entity_type, Operation::Get, 1, error))?;
        self.telemetry.record(entity_type, Operation::Get, Activity::Stored, 1);

        resolve(entity_type, lookup, value)
    }

    /// Returns the cached value of every lookup, in order.
    ///
    /// Reads all keys in one batch, fetches the misses from the data source in one batch and
    /// writes the newly populated values in one batch. Lookups that resolve to the same key
    /// are fetched once.
    ///
    /// # Errors
    ///
    /// [`Error::Usage`] when any lookup matches no declared lookup, before anything is read.
    /// Store and data-source failures propagate.
    pub async fn get_many_cached(&self, entity_type: &EntityType, lookups: &[Lookup]) -> Result<Vec<CachedValue>> {
        if self.settings.is_disabled() {
            self.telemetry.record(entity_type, Operation::GetMany, Activity::Bypassed, 0);
            let outcomes = self.fetch_many(entity_type, lookups).await?;
            return Ok(outcomes.into_iter().map(uncached).collect());
        }

        let spec = self.spec(entity_type)?;
        for lookup in lookups {
            spec.validate_lookup(lookup)?;
        }

        let keys: Vec<String> = lookups.iter().map(|lookup| KeyCodec::derive(entity_type, lookup)).collect();
        let mut values: HashMap<String, CachedValue> = self
            .store
            .get_many(&keys)
            .await
            .map_err(|error| self.store_failed(entity_type, Operation::GetMany, keys.len(), error))?
            .into_iter()
            .map(|(key, entry)| (key, entry.into_value()))
            .collect();

        let mut pending = HashSet::new();
        let (miss_keys, miss_lookups): (Vec<&String>, Vec<Lookup>) = keys
            .iter()
            .zip(lookups)
            .filter(|(key, _)| !values.contains_key(*key) && pending.insert(*key))
            .map(|(key, lookup)| (key, lookup.clone()))
            .unzip();

        self.telemetry.record(entity_type, Operation::GetMany, Activity::Hit, values.len());
        if miss_lookups.is_empty() {
            return Ok(collect_in_order(&keys, &values));
        }
        self.telemetry.record(entity_type, Operation::GetMany, Activity::Miss, miss_lookups.len());

        let outcomes = self.fetch_many(entity_type, &miss_lookups).await?;
        let mut entries = Vec::with_capacity(outcomes.len());
        for (key, outcome) in miss_keys.into_iter().zip(outcomes) {
            let value = self.load(spec, outcome).await?;
            values.insert(key.clone(), value.clone());
            entries.push((key.clone(), CacheEntry::with_optional_ttl(value, spec.ttl())));
        }

        let stored = entries.len();
        self.store
            .insert_many(entries)
            .await
            .map_err(|error| self.store_failed(entity_type, Operation::GetMany, stored, error))?;
        self.telemetry.record(entity_type, Operation::GetMany, Activity::Stored, stored);

        Ok(collect_in_order(&keys, &values))
    }

    fn spec(&self, entity_type: &EntityType) -> Result<&'a CacheSpec> {
        self.registry.spec(entity_type).ok_or_else(|| {
            Error::from(ConfigError::NotCached {
                entity_type: entity_type.clone(),
            })
        })
    }

    fn store_failed(&self, entity_type: &EntityType, operation: Operation, keys: usize, error: cachetree_store::Error) -> Error {
        self.telemetry.record(entity_type, operation, Activity::Error, keys);
        error.into()
    }

    async fn fetch_many(&self, entity_type: &EntityType, lookups: &[Lookup]) -> Result<Vec<FetchOutcome>> {
        let outcomes = self.accessor.fetch_many(entity_type, lookups).await?;
        if outcomes.len() != lookups.len() {
            return Err(AccessError::from_message(format!(
                "data source answered {} lookups of `{entity_type}` with {} outcomes",
                lookups.len(),
                outcomes.len()
            ))
            .into());
        }
        Ok(outcomes)
    }

    async fn load(&self, spec: &CacheSpec, outcome: FetchOutcome) -> Result<CachedValue> {
        Ok(match outcome {
            FetchOutcome::Found(instance) => CachedValue::Found(self.populate(instance, spec.prefetch()).await?),
            FetchOutcome::NotFound => CachedValue::NotFound,
            FetchOutcome::Multiple => CachedValue::Multiple,
        })
    }

    /// Reads every relation of `tree` on `instance` and attaches the populated results.
    ///
    /// Single relations are attached under their own name; collections under the
    /// collection prefix followed by the relation name.
    fn populate<'f>(&'f self, mut instance: Instance, tree: &'f PrefetchTree) -> BoxFuture<'f, Result<Instance>> {
        Box::pin(async move {
            for (name, branch) in tree.iter() {
                let attribute = if branch.relation().kind().is_collection() {
                    let attribute = format!("{}{name}", self.settings.prefix());
                    if instance.is_attribute_taken(&attribute) {
                        return Err(ConfigError::CachedCollectionClash {
                            entity_type: instance.entity_type().clone(),
                            attribute,
                        }
                        .into());
                    }
                    attribute
                } else {
                    name.to_owned()
                };

                let related = match self.accessor.read_relation(&instance, name).await? {
                    Related::Absent => Related::Absent,
                    Related::One(child) => Related::One(self.populate(child, branch.children()).await?),
                    Related::Many(children) => {
                        let mut populated = Vec::with_capacity(children.len());
                        for child in children {
                            populated.push(self.populate(child, branch.children()).await?);
                        }
                        Related::Many(populated)
                    }
                };
                instance.attach(attribute, related);
            }
            Ok(instance)
        })
    }
}

fn uncached(outcome: FetchOutcome) -> CachedValue {
    match outcome {
        FetchOutcome::Found(instance) => CachedValue::Found(instance),
        FetchOutcome::NotFound => CachedValue::NotFound,
        FetchOutcome::Multiple => CachedValue::Multiple,
    }
}

fn resolve(entity_type: &EntityType, lookup: &Lookup, value: CachedValue) -> Result<Instance> {
    match value {
        CachedValue::Found(instance) => Ok(instance),
        CachedValue::NotFound => Err(Error::NotFound {
            entity_type: entity_type.clone(),
            lookup: lookup.clone(),
        }),
        CachedValue::Multiple => Err(Error::Ambiguous {
            entity_type: entity_type.clone(),
            lookup: lookup.clone(),
        }),
    }
}

fn collect_in_order(keys: &[String], values: &HashMap<String, CachedValue>) -> Vec<CachedValue> {
    keys.iter()
        .map(|key| values.get(key).cloned().unwrap_or(CachedValue::NotFound))
        .collect()
}

#[cfg(test)]
mod tests {
    use cachetree_store::testing::{MockStore, StoreOp};
    use opentelemetry::KeyValue;

    use super::*;
    use crate::{
        FieldValue,
        registry::{CacheSpecConfig, PrefetchConfig, RegistryConfig},
        telemetry::{
            attributes,
            testing::{LogCapture, MetricTester},
        },
        testing::MemoryGraph,
    };

    fn block_on<F: std::future::Future>(f: F) -> F::Output {
        futures::executor::block_on(f)
    }

    fn graph() -> MemoryGraph {
        let graph = MemoryGraph::builder()
            .entity("Parent", "id", ["name"])
            .entity("Child", "id", ["parent_id", "title"])
            .entity("Toy", "id", ["child_id"])
            .foreign_key("Child", "parent_id", "parent", "Parent", "children")
            .foreign_key("Toy", "child_id", "child", "Child", "toys")
            .build();
        graph.save(&mut Instance::new("Parent", "id", [("id", FieldValue::from(1)), ("name", "p".into())]));
        graph.save(&mut Instance::new("Child", "id", [("id", FieldValue::from(5)), ("parent_id", 1.into())]));
        graph.save(&mut Instance::new("Child", "id", [("id", FieldValue::from(6)), ("parent_id", 1.into())]));
        graph.save(&mut Instance::new("Toy", "id", [("id", FieldValue::from(9)), ("child_id", 6.into())]));
        graph
    }

    #[test]
    fn populates_nested_prefetch_tree() {
        block_on(async {
            let graph = graph();
            let config = RegistryConfig::new().cache_with("Parent", |spec| {
                spec.prefetch(PrefetchConfig::new().relation("children", PrefetchConfig::new().leaf("toys")))
            });
            let registry = SpecRegistry::build(&config, &graph).unwrap();
            let store = MockStore::new();
            let engine = PopulationEngine::new(&registry, &graph, &store);

            let parent = engine.get_cached(&"Parent".into(), &Lookup::new().with("id", 1)).await.unwrap();
            let children = parent.prefetched("_cached_children").unwrap().instances();
            assert_eq!(children.len(), 2);
            assert_eq!(children[0].prefetched("_cached_toys").unwrap().instances().len(), 0);
            assert_eq!(children[1].prefetched("_cached_toys").unwrap().instances().len(), 1);
        });
    }

    #[test]
    fn single_relation_attached_under_its_name() {
        block_on(async {
            let graph = graph();
            graph.save(&mut Instance::new("Child", "id", [("id", FieldValue::from(7)), ("parent_id", 99.into())]));
            let config = RegistryConfig::new().cache_with("Child", |spec| spec.prefetch(PrefetchConfig::new().leaf("parent")));
            let registry = SpecRegistry::build(&config, &graph).unwrap();
            let store = MockStore::new();
            let engine = PopulationEngine::new(&registry, &graph, &store);

            let child = engine.get_cached(&"Child".into(), &Lookup::new().with("pk", 5)).await.unwrap();
            assert!(matches!(child.prefetched("parent"), Some(Related::One(parent)) if parent.pk() == &FieldValue::Int(1)));

            let orphan = engine.get_cached(&"Child".into(), &Lookup::new().with("pk", 7)).await.unwrap();
            assert_eq!(orphan.prefetched("parent"), Some(&Related::Absent));
        });
    }

    #[test]
    fn uncached_type_is_a_configuration_error() {
        block_on(async {
            let graph = graph();
            let registry = SpecRegistry::build(&RegistryConfig::new().cache("Parent", CacheSpecConfig::new()), &graph).unwrap();
            let store = MockStore::new();
            let engine = PopulationEngine::new(&registry, &graph, &store);

            let error = engine.get_cached(&"Toy".into(), &Lookup::new().with("id", 9)).await.unwrap_err();
            assert!(matches!(error, Error::Configuration(ConfigError::NotCached { .. })));
            assert_eq!(graph.fetch_count(), 0);
        });
    }

    #[test]
    fn miss_then_hit_is_reported() {
        let capture = LogCapture::new();
        let _guard = tracing::subscriber::set_default(capture.subscriber());
        let tester = MetricTester::new();
        let telemetry = CacheTreeTelemetry::new(true).with_meter_provider(tester.meter_provider());

        block_on(async {
            let graph = graph();
            let registry = SpecRegistry::build(&RegistryConfig::new().cache("Parent", CacheSpecConfig::new()), &graph).unwrap();
            let store = MockStore::new();
            let engine = PopulationEngine::new(&registry, &graph, &store).with_telemetry(&telemetry);

            engine.get_cached(&"Parent".into(), &Lookup::new().with("id", 1)).await.unwrap();
            engine.get_cached(&"Parent".into(), &Lookup::new().with("id", 1)).await.unwrap();
        });

        capture.assert_contains(Activity::Miss.as_str());
        capture.assert_contains(Activity::Stored.as_str());
        capture.assert_contains(Activity::Hit.as_str());
        assert_eq!(tester.total("cachetree.event.count"), 3);
        tester.assert_attributes_contain(&[
            KeyValue::new(attributes::ENTITY_TYPE_NAME, "Parent"),
            KeyValue::new(attributes::ACTIVITY_NAME, Activity::Hit.as_str()),
        ]);
    }

    #[test]
    fn store_failure_is_reported_as_error() {
        let capture = LogCapture::new();
        let _guard = tracing::subscriber::set_default(capture.subscriber());
        let tester = MetricTester::new();
        let telemetry = CacheTreeTelemetry::new(true).with_meter_provider(tester.meter_provider());

        block_on(async {
            let graph = graph();
            let registry = SpecRegistry::build(&RegistryConfig::new().cache("Parent", CacheSpecConfig::new()), &graph).unwrap();
            let store = MockStore::new();
            store.fail_when(|op| matches!(op, StoreOp::Insert { .. } | StoreOp::GetMany(_)));
            let engine = PopulationEngine::new(&registry, &graph, &store).with_telemetry(&telemetry);

            let error = engine.get_cached(&"Parent".into(), &Lookup::new().with("id", 1)).await.unwrap_err();
            assert!(matches!(error, Error::Store(_)));
            let error = engine
                .get_many_cached(&"Parent".into(), &[Lookup::new().with("id", 1)])
                .await
                .unwrap_err();
            assert!(matches!(error, Error::Store(_)));
        });

        capture.assert_contains("ERROR");
        capture.assert_contains(Activity::Error.as_str());
        capture.assert_contains(Operation::GetMany.as_str());
        tester.assert_attributes_contain(&[
            KeyValue::new(attributes::OPERATION_NAME, Operation::Get.as_str()),
            KeyValue::new(attributes::ACTIVITY_NAME, Activity::Error.as_str()),
        ]);
    }
}
