// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The write path: finding and dropping every cached tree a change makes stale.

use std::{
    borrow::Cow,
    collections::{BTreeSet, HashSet},
};

use cachetree_store::CacheStore;

use crate::{
    accessor::{EntityAccessor, FetchOutcome, RelationDescriptor},
    error::{ConfigError, Error, Result},
    instance::{CachedValue, Instance},
    key::{KeyCodec, Lookup},
    paths::InvalidationPath,
    populate::{DEFAULT_SETTINGS, DISABLED_TELEMETRY},
    registry::SpecRegistry,
    settings::Settings,
    telemetry::{Activity, CacheTreeTelemetry, Operation},
    value::{EntityType, FieldValue, PK_ALIAS},
};

/// What happened to the links of a collection relation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LinkAction {
    /// Links were added.
    Added,
    /// Links were removed.
    Removed,
    /// Every link is about to be removed.
    Clearing,
}

/// A change to the links of a collection relation on one owner instance.
///
/// # Examples
///
/// ```
/// use cachetree::{FieldValue, LinkAction, LinkChange};
///
/// let change = LinkChange::added("groups", [3, 4]);
/// assert_eq!(change.action(), LinkAction::Added);
/// assert_eq!(change.changed_ids(), [FieldValue::Int(3), FieldValue::Int(4)]);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkChange {
    relation: String,
    action: LinkAction,
    changed_ids: Vec<FieldValue>,
}

impl LinkChange {
    /// Links from the owner to the entities with `ids` were added through `relation`.
    pub fn added<I>(relation: impl Into<String>, ids: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<FieldValue>,
    {
        Self::new(relation, LinkAction::Added, ids)
    }

    /// Links from the owner to the entities with `ids` were removed from `relation`.
    pub fn removed<I>(relation: impl Into<String>, ids: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<FieldValue>,
    {
        Self::new(relation, LinkAction::Removed, ids)
    }

    /// Every link of `relation` is about to be removed. Must be reported before the links go.
    pub fn clearing(relation: impl Into<String>) -> Self {
        Self::new(relation, LinkAction::Clearing, std::iter::empty::<FieldValue>())
    }

    fn new<I>(relation: impl Into<String>, action: LinkAction, ids: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<FieldValue>,
    {
        Self {
            relation: relation.into(),
            action,
            changed_ids: ids.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns the collection relation on the owner.
    #[must_use]
    pub fn relation(&self) -> &str {
        &self.relation
    }

    /// Returns what happened.
    #[must_use]
    pub fn action(&self) -> LinkAction {
        self.action
    }

    /// Returns the primary keys of the entities whose links changed; empty for clearing.
    #[must_use]
    pub fn changed_ids(&self) -> &[FieldValue] {
        &self.changed_ids
    }
}

/// The outcome of an invalidation round.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InvalidationReport {
    keys: BTreeSet<String>,
    roots: BTreeSet<(EntityType, FieldValue)>,
}

impl InvalidationReport {
    /// Returns the cache keys that were dropped.
    #[must_use]
    pub fn keys(&self) -> &BTreeSet<String> {
        &self.keys
    }

    /// Returns the number of distinct root instances whose trees were dropped.
    #[must_use]
    pub fn roots(&self) -> usize {
        self.roots.len()
    }

    /// Returns `true` if nothing was dropped.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    fn merge(&mut self, other: Self) {
        self.keys.extend(other.keys);
        self.roots.extend(other.roots);
    }
}

/// Drops every cached tree that a changed instance or a link change could make stale.
///
/// For a changed instance, each invalidation path of its type is walked hop by hop. An
/// instance whose fields differ from its baseline is walked in both states, so a moved
/// foreign key reaches the old and the new owner. The roots reached are turned into one key
/// per declared lookup, for their current and their baseline values, and the keys are
/// dropped in one batch. The changed instance then takes its current state as its new
/// baseline.
#[derive(Debug)]
pub struct InvalidationEngine<'a, A, S> {
    registry: &'a SpecRegistry,
    accessor: &'a A,
    store: &'a S,
    settings: &'a Settings,
    telemetry: &'a CacheTreeTelemetry,
}

impl<'a, A, S> InvalidationEngine<'a, A, S>
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

    /// Drops every cached tree `instance` belongs to, in its current and baseline state.
    ///
    /// On success the instance's current state becomes its baseline.
    ///
    /// # Errors
    ///
    /// [`ConfigError::NoInvalidationPath`] if no cached tree reaches the instance's type.
    /// Store and data-source failures propagate; the baseline is then left unchanged.
    pub async fn invalidate_instance(&self, instance: &mut Instance) -> Result<InvalidationReport> {
        self.invalidate_instances(std::slice::from_mut(instance)).await
    }

    /// Drops every cached tree any of `instances` belongs to, in one batched removal.
    ///
    /// # Errors
    ///
    /// As [`InvalidationEngine::invalidate_instance`]; no baseline moves unless every
    /// instance was invalidated.
    pub async fn invalidate_instances(&self, instances: &mut [Instance]) -> Result<InvalidationReport> {
        if !self.settings.is_invalidation_enabled() {
            return Ok(InvalidationReport::default());
        }

        let mut report = InvalidationReport::default();
        for instance in instances.iter() {
            report.merge(self.collect(instance).await?);
        }

        let Some(first) = instances.first() else {
            return Ok(report);
        };
        let entity_type = first.entity_type().clone();
        self.drop_keys(&entity_type, Operation::InvalidateInstance, &report).await?;

        for instance in instances {
            instance.reset_baseline();
        }
        Ok(report)
    }

    /// Drops the cached trees a link change on `owner` makes stale.
    ///
    /// The owner is invalidated if its type caches `change.relation()`; the related
    /// entities are invalidated if their type caches the reverse relation. For added and
    /// removed links the related entities are the changed ids; for clearing they are read
    /// before the links go, unless an explicit linking type mediates the relation, whose
    /// own changes then invalidate. Link changes between types that are not both cached are
    /// ignored.
    ///
    /// # Errors
    ///
    /// [`ConfigError::UnknownRelation`] or [`Error::NotACollection`] if the relation is not a
    /// collection of the owner's type, checked only once the owner's type takes part in
    /// invalidation. Store and data-source failures propagate.
    pub async fn invalidate_link_change(&self, owner: &mut Instance, change: &LinkChange) -> Result<InvalidationReport> {
        let owner_type = owner.entity_type().clone();
        let paths = self.registry.paths();
        if !self.settings.is_invalidation_enabled() || !paths.contains(&owner_type) {
            self.telemetry.record(&owner_type, Operation::LinkChange, Activity::Ignored, 0);
            return Ok(InvalidationReport::default());
        }

        let relation = self.collection(&owner_type, change.relation())?;
        let related_type = relation.target().clone();
        if !paths.contains(&related_type) {
            self.telemetry.record(&owner_type, Operation::LinkChange, Activity::Ignored, 0);
            return Ok(InvalidationReport::default());
        }

        let mut report = InvalidationReport::default();
        let owner_caches = paths.requires_invalidation(&owner_type, &related_type);
        if owner_caches {
            report.merge(self.collect(owner).await?);
        }

        if paths.requires_invalidation(&related_type, &owner_type) {
            for related in self.affected(owner, relation, change).await? {
                report.merge(self.collect(&related).await?);
            }
        }

        self.drop_keys(&owner_type, Operation::LinkChange, &report).await?;
        if owner_caches {
            owner.reset_baseline();
        }
        Ok(report)
    }

    fn collection(&self, owner_type: &EntityType, name: &str) -> Result<&'a RelationDescriptor> {
        let relation = self
            .accessor_relation(owner_type, name)
            .ok_or_else(|| ConfigError::UnknownRelation {
                entity_type: owner_type.clone(),
                relation: name.to_owned(),
            })?;

        if !relation.kind().is_collection() {
            return Err(Error::NotACollection {
                entity_type: owner_type.clone(),
                relation: name.to_owned(),
            });
        }
        Ok(relation)
    }

    fn accessor_relation(&self, owner_type: &EntityType, name: &str) -> Option<&'a RelationDescriptor> {
        let accessor: &'a A = self.accessor;
        accessor.describe(owner_type)?.relation_named(name)
    }

    async fn affected(&self, owner: &Instance, relation: &RelationDescriptor, change: &LinkChange) -> Result<Vec<Instance>> {
        match change.action() {
            LinkAction::Added | LinkAction::Removed => {
                if change.changed_ids().is_empty() {
                    return Ok(Vec::new());
                }
                let lookups: Vec<Lookup> = change
                    .changed_ids()
                    .iter()
                    .map(|id| Lookup::new().with(PK_ALIAS, id.clone()))
                    .collect();
                let outcomes = self.accessor.fetch_many(relation.target(), &lookups).await?;
                Ok(outcomes
                    .into_iter()
                    .filter_map(|outcome| match outcome {
                        FetchOutcome::Found(instance) => Some(instance),
                        FetchOutcome::NotFound | FetchOutcome::Multiple => None,
                    })
                    .collect())
            }
            LinkAction::Clearing => {
                if relation.linking().is_some_and(|linking| !linking.is_auto_created()) {
                    return Ok(Vec::new());
                }
                Ok(self.accessor.read_relation(owner, change.relation()).await?.into_instances())
            }
        }
    }

    /// Walks every path of the instance's type and returns the keys of the roots reached.
    async fn collect(&self, instance: &Instance) -> Result<InvalidationReport> {
        let entity_type = instance.entity_type();
        let paths = self.registry.paths().get(entity_type);
        if paths.is_empty() {
            self.telemetry.record(entity_type, Operation::InvalidateInstance, Activity::Error, 0);
            return Err(ConfigError::NoInvalidationPath {
                entity_type: entity_type.clone(),
            }
            .into());
        }

        let mut report = InvalidationReport::default();
        for path in paths {
            for root in self.walk(instance, path).await? {
                report.roots.insert((root.entity_type().clone(), root.pk().clone()));
                self.root_keys(&root, &mut report.keys);
            }
        }
        Ok(report)
    }

    async fn walk<'i>(&self, instance: &'i Instance, path: &InvalidationPath) -> Result<Vec<Cow<'i, Instance>>> {
        let mut working = vec![Cow::Borrowed(instance)];

        for hop in path.hops() {
            let mut seen = HashSet::new();
            let mut next = Vec::new();

            for current in &working {
                for variant in std::iter::once(Cow::Borrowed(current.as_ref())).chain(current.original().map(Cow::Owned)) {
                    let related = self.accessor.read_relation(&variant, hop.relation()).await?;
                    for related in related.into_instances() {
                        if seen.insert((related.entity_type().clone(), related.pk().clone())) {
                            next.push(Cow::Owned(related));
                        }
                    }
                }
            }

            if next.is_empty() {
                return Ok(Vec::new());
            }
            working = next;
        }

        Ok(working)
    }

    fn root_keys(&self, root: &Instance, keys: &mut BTreeSet<String>) {
        let Some(spec) = self.registry.spec(root.entity_type()) else {
            return;
        };

        let baseline = root
            .baseline()
            .filter(|baseline| baseline.get(spec.primary_key()).is_some_and(|pk| !pk.is_null()));

        for fields in spec.lookups() {
            keys.insert(KeyCodec::derive(spec.entity_type(), &spec.lookup_from(fields, root.fields())));
            if let Some(baseline) = baseline {
                keys.insert(KeyCodec::derive(spec.entity_type(), &spec.lookup_from(fields, baseline.fields())));
            }
        }
    }

    async fn drop_keys(&self, entity_type: &EntityType, operation: Operation, report: &InvalidationReport) -> Result<()> {
        if report.is_empty() {
            return Ok(());
        }

        let keys: Vec<String> = report.keys.iter().cloned().collect();
        if let Err(error) = self.store.invalidate_many(&keys).await {
            self.telemetry.record(entity_type, operation, Activity::Error, keys.len());
            return Err(error.into());
        }
        self.telemetry.record(entity_type, operation, Activity::Invalidated, keys.len());
        Ok(())
    }
}
