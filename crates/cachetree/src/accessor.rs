// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The data-source contract and the relation metadata it describes.

use std::{
    borrow::Cow,
    collections::{BTreeMap, BTreeSet},
};

use crate::{
    instance::{Instance, Related},
    key::Lookup,
    settings::DEFAULT_COLLECTION_PREFIX,
    value::{EntityType, Snapshot},
};

/// What reading a relation yields and which link events it can produce.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RelationKind {
    /// At most one related instance.
    Single,
    /// A collection whose links are added, removed and cleared directly.
    MutableCollection,
    /// A collection that only changes through the related entities themselves.
    ReadOnlyCollection,
}

impl RelationKind {
    /// Returns `true` for the collection kinds.
    #[must_use]
    pub fn is_collection(self) -> bool {
        !matches!(self, Self::Single)
    }
}

/// The linking type of a many-to-many relation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Linking {
    linking_type: EntityType,
    auto_created: bool,
    owner_accessor: String,
}

impl Linking {
    /// A linking type the data source manages on its own.
    pub fn auto(linking_type: impl Into<EntityType>) -> Self {
        Self {
            linking_type: linking_type.into(),
            auto_created: true,
            owner_accessor: String::new(),
        }
    }

    /// An explicit linking type. `owner_accessor` is the relation on the owning side that
    /// reaches the linking rows.
    pub fn explicit(linking_type: impl Into<EntityType>, owner_accessor: impl Into<String>) -> Self {
        Self {
            linking_type: linking_type.into(),
            auto_created: false,
            owner_accessor: owner_accessor.into(),
        }
    }

    /// Returns the linking type.
    #[must_use]
    pub fn linking_type(&self) -> &EntityType {
        &self.linking_type
    }

    /// Returns `true` if the data source manages the linking rows on its own.
    #[must_use]
    pub fn is_auto_created(&self) -> bool {
        self.auto_created
    }

    /// Returns the owner-side relation reaching the linking rows.
    #[must_use]
    pub fn owner_accessor(&self) -> &str {
        &self.owner_accessor
    }
}

/// A relation of an entity type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelationDescriptor {
    kind: RelationKind,
    target: EntityType,
    reverse: String,
    linking: Option<Linking>,
}

impl RelationDescriptor {
    /// A single-valued relation to `target`, read back from `target` through `reverse`.
    pub fn single(target: impl Into<EntityType>, reverse: impl Into<String>) -> Self {
        Self::new(RelationKind::Single, target, reverse)
    }

    /// A collection whose links are changed directly.
    pub fn mutable_collection(target: impl Into<EntityType>, reverse: impl Into<String>) -> Self {
        Self::new(RelationKind::MutableCollection, target, reverse)
    }

    /// A collection that only changes through its members.
    pub fn read_only_collection(target: impl Into<EntityType>, reverse: impl Into<String>) -> Self {
        Self::new(RelationKind::ReadOnlyCollection, target, reverse)
    }

    fn new(kind: RelationKind, target: impl Into<EntityType>, reverse: impl Into<String>) -> Self {
        Self {
            kind,
            target: target.into(),
            reverse: reverse.into(),
            linking: None,
        }
    }

    /// Marks the relation as mediated by a linking type.
    #[must_use]
    pub fn with_linking(mut self, linking: Linking) -> Self {
        self.linking = Some(linking);
        self
    }

    /// Returns the relation kind.
    #[must_use]
    pub fn kind(&self) -> RelationKind {
        self.kind
    }

    /// Returns the related type.
    #[must_use]
    pub fn target(&self) -> &EntityType {
        &self.target
    }

    /// Returns the relation on the target that leads back.
    #[must_use]
    pub fn reverse(&self) -> &str {
        &self.reverse
    }

    /// Returns the linking type, for many-to-many relations.
    #[must_use]
    pub fn linking(&self) -> Option<&Linking> {
        self.linking.as_ref()
    }
}

/// Static metadata of an entity type.
///
/// # Examples
///
/// ```
/// use cachetree::{EntityDescriptor, RelationDescriptor};
///
/// let child = EntityDescriptor::new("Child", "id")
///     .fields(["parent_id", "title"])
///     .relation("parent", RelationDescriptor::single("Parent", "children"));
///
/// assert!(child.has_field("id"));
/// assert!(!child.has_field("parent"));
/// assert_eq!(child.relation_named("parent").unwrap().reverse(), "children");
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntityDescriptor {
    entity_type: EntityType,
    primary_key: String,
    fields: BTreeSet<String>,
    relations: BTreeMap<String, RelationDescriptor>,
}

impl EntityDescriptor {
    /// Describes `entity_type`, whose primary key is the direct field `primary_key`.
    pub fn new(entity_type: impl Into<EntityType>, primary_key: impl Into<String>) -> Self {
        let primary_key = primary_key.into();
        Self {
            entity_type: entity_type.into(),
            fields: BTreeSet::from([primary_key.clone()]),
            primary_key,
            relations: BTreeMap::new(),
        }
    }

    /// Adds a direct field.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>) -> Self {
        self.fields.insert(name.into());
        self
    }

    /// Adds direct fields.
    #[must_use]
    pub fn fields<I>(mut self, names: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.fields.extend(names.into_iter().map(Into::into));
        self
    }

    /// Adds a relation.
    #[must_use]
    pub fn relation(mut self, name: impl Into<String>, relation: RelationDescriptor) -> Self {
        self.relations.insert(name.into(), relation);
        self
    }

    /// Returns the described type.
    #[must_use]
    pub fn entity_type(&self) -> &EntityType {
        &self.entity_type
    }

    /// Returns the primary-key field.
    #[must_use]
    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    /// Returns `true` if `name` is a direct field.
    #[must_use]
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains(name)
    }

    /// Iterates over the direct fields in name order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(String::as_str)
    }

    /// Returns the relation named `name`.
    #[must_use]
    pub fn relation_named(&self, name: &str) -> Option<&RelationDescriptor> {
        self.relations.get(name)
    }

    /// Iterates over `(name, relation)` pairs.
    pub fn relations(&self) -> impl Iterator<Item = (&str, &RelationDescriptor)> {
        self.relations.iter().map(|(name, relation)| (name.as_str(), relation))
    }
}

/// The outcome of fetching by lookup.
#[derive(Clone, Debug, PartialEq)]
pub enum FetchOutcome {
    /// Exactly one entity matched.
    Found(Instance),
    /// Nothing matched.
    NotFound,
    /// More than one entity matched.
    Multiple,
}

/// A failed data-source operation.
///
/// Opaque: the engine passes it to its caller unchanged.
#[ohno::error]
pub struct AccessError {}

impl AccessError {
    /// Creates an access error from a message or from the data source's own error.
    pub fn from_message(cause: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::caused_by(cause)
    }
}

/// The data source: fetches entities by lookup and reads their relations.
///
/// Implementations report a related entity that no longer exists as [`Related::Absent`]
/// (or leave it out of a collection) rather than as an error.
pub trait EntityAccessor: Send + Sync {
    /// Returns the metadata of `entity_type`, if the data source knows it.
    fn describe(&self, entity_type: &EntityType) -> Option<&EntityDescriptor>;

    /// Fetches the entity of `entity_type` matching `lookup`.
    fn fetch_one(&self, entity_type: &EntityType, lookup: &Lookup) -> impl Future<Output = Result<FetchOutcome, AccessError>> + Send;

    /// Fetches one outcome per lookup, in the same order.
    ///
    /// The default calls [`EntityAccessor::fetch_one`] per lookup. Data sources that can answer a
    /// batch in one round trip should override it.
    fn fetch_many(&self, entity_type: &EntityType, lookups: &[Lookup]) -> impl Future<Output = Result<Vec<FetchOutcome>, AccessError>> + Send {
        async move {
            let mut outcomes = Vec::with_capacity(lookups.len());
            for lookup in lookups {
                outcomes.push(self.fetch_one(entity_type, lookup).await?);
            }
            Ok(outcomes)
        }
    }

    /// Reads the relation `relation` of `instance`, using the instance's field values as given.
    fn read_relation(&self, instance: &Instance, relation: &str) -> impl Future<Output = Result<Related, AccessError>> + Send;

    /// Captures the field values of `instance`.
    fn snapshot(&self, instance: &Instance) -> Snapshot {
        instance.snapshot()
    }

    /// Returns the relation on the target of `entity_type.relation` that leads back.
    fn reverse_accessor_name(&self, entity_type: &EntityType, relation: &str) -> Option<&str> {
        self.describe(entity_type)?.relation_named(relation).map(RelationDescriptor::reverse)
    }
}

impl<T: EntityAccessor> EntityAccessor for &T {
    fn describe(&self, entity_type: &EntityType) -> Option<&EntityDescriptor> {
        (**self).describe(entity_type)
    }

    fn fetch_one(&self, entity_type: &EntityType, lookup: &Lookup) -> impl Future<Output = Result<FetchOutcome, AccessError>> + Send {
        (**self).fetch_one(entity_type, lookup)
    }

    fn fetch_many(&self, entity_type: &EntityType, lookups: &[Lookup]) -> impl Future<Output = Result<Vec<FetchOutcome>, AccessError>> + Send {
        (**self).fetch_many(entity_type, lookups)
    }

    fn read_relation(&self, instance: &Instance, relation: &str) -> impl Future<Output = Result<Related, AccessError>> + Send {
        (**self).read_relation(instance, relation)
    }

    fn snapshot(&self, instance: &Instance) -> Snapshot {
        (**self).snapshot(instance)
    }
}

/// Reads relations from the sub-trees a cached instance carries.
///
/// Wraps any [`EntityAccessor`]. Relations that population attached to the instance are
/// answered from the instance; everything else goes to the wrapped accessor.
///
/// # Examples
///
/// ```
/// # #[cfg(feature = "test-util")]
/// # futures::executor::block_on(async {
/// use cachetree::testing::MemoryGraph;
/// use cachetree::{CachingAccessor, EntityAccessor, Instance};
///
/// let graph = MemoryGraph::builder()
///     .entity("Parent", "id", ["name"])
///     .entity("Child", "id", ["parent_id"])
///     .foreign_key("Child", "parent_id", "parent", "Parent", "children")
///     .build();
/// graph.save(&mut Instance::new("Parent", "id", [("id", 1)]));
///
/// let accessor = CachingAccessor::new(&graph);
/// let parent = graph.get("Parent", 1).unwrap();
/// let children = accessor.read_relation(&parent, "children").await.unwrap();
/// assert!(children.instances().is_empty());
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct CachingAccessor<A> {
    inner: A,
    prefix: Cow<'static, str>,
}

impl<A: EntityAccessor> CachingAccessor<A> {
    /// Wraps `inner`, finding cached collections under the default prefix.
    pub fn new(inner: A) -> Self {
        Self::with_prefix(inner, DEFAULT_COLLECTION_PREFIX)
    }

    /// Wraps `inner`, finding cached collections under `prefix`.
    pub fn with_prefix(inner: A, prefix: impl Into<Cow<'static, str>>) -> Self {
        Self {
            inner,
            prefix: prefix.into(),
        }
    }

    /// Returns the wrapped accessor.
    #[must_use]
    pub fn inner(&self) -> &A {
        &self.inner
    }

    fn cached<'i>(&self, instance: &'i Instance, relation: &str) -> Option<&'i Related> {
        let kind = self.inner.describe(instance.entity_type())?.relation_named(relation)?.kind();
        if kind.is_collection() {
            instance.prefetched(&format!("{}{relation}", self.prefix))
        } else {
            instance.prefetched(relation)
        }
    }
}

impl<A: EntityAccessor> EntityAccessor for CachingAccessor<A> {
    fn describe(&self, entity_type: &EntityType) -> Option<&EntityDescriptor> {
        self.inner.describe(entity_type)
    }

    async fn fetch_one(&self, entity_type: &EntityType, lookup: &Lookup) -> Result<FetchOutcome, AccessError> {
        self.inner.fetch_one(entity_type, lookup).await
    }

    async fn fetch_many(&self, entity_type: &EntityType, lookups: &[Lookup]) -> Result<Vec<FetchOutcome>, AccessError> {
        self.inner.fetch_many(entity_type, lookups).await
    }

    async fn read_relation(&self, instance: &Instance, relation: &str) -> Result<Related, AccessError> {
        if let Some(cached) = self.cached(instance, relation) {
            return Ok(cached.clone());
        }
        self.inner.read_relation(instance, relation).await
    }

    fn snapshot(&self, instance: &Instance) -> Snapshot {
        self.inner.snapshot(instance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FieldValue, testing::MemoryGraph};

    fn block_on<F: std::future::Future>(f: F) -> F::Output {
        futures::executor::block_on(f)
    }

    fn graph() -> MemoryGraph {
        let graph = MemoryGraph::builder()
            .entity("Parent", "id", ["name"])
            .entity("Child", "id", ["parent_id", "title"])
            .foreign_key("Child", "parent_id", "parent", "Parent", "children")
            .build();
        graph.save(&mut Instance::new("Parent", "id", [("id", FieldValue::from(1)), ("name", "p".into())]));
        graph.save(&mut Instance::new("Child", "id", [("id", FieldValue::from(5)), ("parent_id", 1.into())]));
        graph
    }

    #[test]
    fn relation_kinds() {
        assert!(!RelationKind::Single.is_collection());
        assert!(RelationKind::MutableCollection.is_collection());
        assert!(RelationKind::ReadOnlyCollection.is_collection());
    }

    #[test]
    fn reverse_accessor_name_comes_from_metadata() {
        let graph = graph();
        assert_eq!(graph.reverse_accessor_name(&"Child".into(), "parent"), Some("children"));
        assert_eq!(graph.reverse_accessor_name(&"Parent".into(), "children"), Some("parent"));
        assert_eq!(graph.reverse_accessor_name(&"Parent".into(), "missing"), None);
    }

    #[test]
    fn fetch_many_keeps_lookup_order() {
        block_on(async {
            let graph = graph();
            let accessor = &graph;
            let lookups = [Lookup::new().with("id", 99), Lookup::new().with("id", 1)];
            let outcomes = accessor.fetch_many(&"Parent".into(), &lookups).await.unwrap();

            assert_eq!(outcomes[0], FetchOutcome::NotFound);
            assert!(matches!(&outcomes[1], FetchOutcome::Found(parent) if parent.pk() == &FieldValue::Int(1)));
        });
    }

    #[test]
    fn caching_accessor_prefers_attached_views() {
        block_on(async {
            let graph = graph();
            let accessor = CachingAccessor::new(&graph);
            let mut parent = graph.get("Parent", 1).unwrap();
            parent.attach("_cached_children", Related::Many(Vec::new()));

            let reads_before = graph.relation_reads();
            let cached = accessor.read_relation(&parent, "children").await.unwrap();
            assert_eq!(cached, Related::Many(Vec::new()));
            assert_eq!(graph.relation_reads(), reads_before);

            parent.uncache("_cached_children");
            let live = accessor.read_relation(&parent, "children").await.unwrap();
            assert_eq!(live.instances().len(), 1);
            assert_eq!(graph.relation_reads(), reads_before + 1);
        });
    }

    #[test]
    fn caching_accessor_uses_custom_prefix_for_collections_only() {
        block_on(async {
            let graph = graph();
            let accessor = CachingAccessor::with_prefix(&graph, "cached_");
            let mut child = graph.get("Child", 5).unwrap();
            child.attach("parent", Related::Absent);

            assert_eq!(accessor.read_relation(&child, "parent").await.unwrap(), Related::Absent);
            assert_eq!(accessor.inner().describe(&"Child".into()).map(EntityDescriptor::primary_key), Some("id"));
        });
    }
}
