// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Cache configuration and the registry of resolved cache specs.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    time::Duration,
};

use crate::{
    accessor::{EntityAccessor, EntityDescriptor, RelationDescriptor},
    error::{ConfigError, Error},
    key::Lookup,
    paths::{InvalidationPathBuilder, InvalidationPaths},
    value::{EntityType, FieldValue, PK_ALIAS},
};

/// The relations to cache alongside an entity, nested to any finite depth.
///
/// # Examples
///
/// ```
/// use cachetree::PrefetchConfig;
///
/// // children, and every child's toys
/// let prefetch = PrefetchConfig::new().relation("children", PrefetchConfig::new().leaf("toys"));
/// assert_eq!(prefetch.depth(), 2);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize), serde(transparent))]
pub struct PrefetchConfig(BTreeMap<String, Self>);

impl PrefetchConfig {
    /// Prefetches nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefetches `relation` and, below it, `children`.
    #[must_use]
    pub fn relation(mut self, relation: impl Into<String>, children: Self) -> Self {
        self.0.insert(relation.into(), children);
        self
    }

    /// Prefetches `relation` with nothing below it.
    #[must_use]
    pub fn leaf(self, relation: impl Into<String>) -> Self {
        self.relation(relation, Self::new())
    }

    /// Iterates over `(relation, children)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Self)> {
        self.0.iter().map(|(relation, children)| (relation.as_str(), children))
    }

    /// Returns `true` if nothing is prefetched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the number of relation levels below the entity.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.0.values().map(|children| children.depth() + 1).max().unwrap_or(0)
    }
}

/// One declared lookup: a single field or a composite of fields.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize), serde(untagged))]
pub enum LookupSpec {
    /// A single field.
    Field(String),
    /// Several fields looked up together.
    Fields(Vec<String>),
}

impl LookupSpec {
    fn into_fields(self) -> LookupFields {
        match self {
            Self::Field(field) => LookupFields(BTreeSet::from([field])),
            Self::Fields(fields) => LookupFields(fields.into_iter().collect()),
        }
    }
}

impl From<&str> for LookupSpec {
    fn from(field: &str) -> Self {
        Self::Field(field.to_owned())
    }
}

impl<const N: usize> From<[&str; N]> for LookupSpec {
    fn from(fields: [&str; N]) -> Self {
        Self::Fields(fields.iter().map(|field| (*field).to_owned()).collect())
    }
}

/// How one entity type is cached.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default, deny_unknown_fields)
)]
pub struct CacheSpecConfig {
    lookups: Option<Vec<LookupSpec>>,
    prefetch: PrefetchConfig,
    #[cfg_attr(feature = "serde", serde(with = "ttl_seconds", skip_serializing_if = "Option::is_none"))]
    ttl: Option<Duration>,
}

impl CacheSpecConfig {
    /// Looks up by primary key, prefetches nothing, never expires.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a lookup. Without any, the type is looked up by `pk` or its primary-key field.
    #[must_use]
    pub fn lookup(mut self, lookup: impl Into<LookupSpec>) -> Self {
        self.lookups.get_or_insert_with(Vec::new).push(lookup.into());
        self
    }

    /// Sets the relations to cache alongside.
    #[must_use]
    pub fn prefetch(mut self, prefetch: PrefetchConfig) -> Self {
        self.prefetch = prefetch;
        self
    }

    /// Sets the time-to-live of cached entries.
    #[must_use]
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

#[cfg(feature = "serde")]
mod ttl_seconds {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    #[expect(clippy::ref_option, reason = "serde passes the field by reference")]
    pub(super) fn serialize<S: Serializer>(ttl: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match ttl {
            Some(ttl) => serializer.serialize_some(&ttl.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_secs))
    }
}

/// The cache configuration: how each cached type is cached.
///
/// # Examples
///
/// ```
/// use cachetree::{CacheSpecConfig, PrefetchConfig, RegistryConfig};
/// use std::time::Duration;
///
/// let config = RegistryConfig::new()
///     .cache("Parent", CacheSpecConfig::new().prefetch(PrefetchConfig::new().leaf("children")))
///     .cache_with("Author", |spec| spec.lookup(["first_name", "last_name"]).ttl(Duration::from_secs(600)));
/// assert_eq!(config.len(), 2);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize), serde(transparent))]
pub struct RegistryConfig(BTreeMap<String, CacheSpecConfig>);

impl RegistryConfig {
    /// Caches nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Caches `entity_type` as `spec` describes.
    #[must_use]
    pub fn cache(mut self, entity_type: impl Into<String>, spec: CacheSpecConfig) -> Self {
        self.0.insert(entity_type.into(), spec);
        self
    }

    /// Caches `entity_type` with a spec built from the defaults by `build`.
    #[must_use]
    pub fn cache_with(self, entity_type: impl Into<String>, build: impl FnOnce(CacheSpecConfig) -> CacheSpecConfig) -> Self {
        self.cache(entity_type, build(CacheSpecConfig::new()))
    }

    /// Returns the number of cached types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The field names of one declared lookup.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LookupFields(BTreeSet<String>);

impl LookupFields {
    /// Iterates over the field names in order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    fn matches(&self, lookup: &Lookup) -> bool {
        self.0.len() == lookup.len() && lookup.field_names().all(|field| self.0.contains(field))
    }
}

/// A relation to prefetch, resolved against the data source's metadata.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrefetchBranch {
    relation: RelationDescriptor,
    children: PrefetchTree,
}

impl PrefetchBranch {
    /// Returns the relation metadata.
    #[must_use]
    pub fn relation(&self) -> &RelationDescriptor {
        &self.relation
    }

    /// Returns what is prefetched below the relation.
    #[must_use]
    pub fn children(&self) -> &PrefetchTree {
        &self.children
    }
}

/// A resolved prefetch tree.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PrefetchTree(BTreeMap<String, PrefetchBranch>);

impl PrefetchTree {
    /// Iterates over `(relation, branch)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &PrefetchBranch)> {
        self.0.iter().map(|(relation, branch)| (relation.as_str(), branch))
    }

    /// Returns `true` if `relation` is prefetched at this level.
    #[must_use]
    pub fn contains(&self, relation: &str) -> bool {
        self.0.contains_key(relation)
    }

    /// Returns `true` if nothing is prefetched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the number of relation levels below the entity.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.0.values().map(|branch| branch.children.depth() + 1).max().unwrap_or(0)
    }
}

/// How one root type is cached, resolved against the data source's metadata.
///
/// Population follows the prefetch tree and nothing else, so a type that prefetches
/// itself is cached [`CacheSpec::prefetch_depth`] levels deep however deep its entity graph goes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheSpec {
    entity_type: EntityType,
    primary_key: String,
    lookups: Vec<LookupFields>,
    prefetch: PrefetchTree,
    ttl: Option<Duration>,
}

impl CacheSpec {
    /// Returns the cached type.
    #[must_use]
    pub fn entity_type(&self) -> &EntityType {
        &self.entity_type
    }

    /// Returns the primary-key field.
    #[must_use]
    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    /// Returns the declared lookups.
    #[must_use]
    pub fn lookups(&self) -> &[LookupFields] {
        &self.lookups
    }

    /// Returns the prefetch tree.
    #[must_use]
    pub fn prefetch(&self) -> &PrefetchTree {
        &self.prefetch
    }

    /// Returns the number of relation levels cached below the entity.
    #[must_use]
    pub fn prefetch_depth(&self) -> usize {
        self.prefetch.depth()
    }

    /// Returns the time-to-live of cached entries; `None` never expires.
    #[must_use]
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// Checks that `lookup` names exactly the fields of one declared lookup.
    pub fn validate_lookup(&self, lookup: &Lookup) -> Result<(), Error> {
        if self.lookups.iter().any(|fields| fields.matches(lookup)) {
            return Ok(());
        }

        Err(Error::Usage {
            entity_type: self.entity_type.clone(),
            fields: lookup.field_names().collect::<Vec<_>>().join(", "),
        })
    }

    /// Builds the lookup `fields` would be found by, reading values from `values`.
    pub(crate) fn lookup_from(&self, fields: &LookupFields, values: &BTreeMap<String, FieldValue>) -> Lookup {
        fields
            .iter()
            .map(|field| {
                let source = if field == PK_ALIAS { self.primary_key.as_str() } else { field };
                (field, values.get(source).cloned().unwrap_or_default())
            })
            .collect()
    }
}

/// Every cache spec plus the invalidation paths derived from them. Read-only once built.
#[derive(Clone, Debug)]
pub struct SpecRegistry {
    specs: HashMap<EntityType, CacheSpec>,
    paths: InvalidationPaths,
}

impl SpecRegistry {
    /// Resolves `config` against the metadata of `accessor`, validates it and derives the
    /// invalidation paths.
    pub fn build(config: &RegistryConfig, accessor: &impl EntityAccessor) -> Result<Self, ConfigError> {
        Self::resolve(config, accessor).inspect_err(|error| {
            tracing::error!(cachetree.error = %error, "cachetree.configuration");
        })
    }

    fn resolve(config: &RegistryConfig, accessor: &impl EntityAccessor) -> Result<Self, ConfigError> {
        let mut specs = HashMap::with_capacity(config.len());
        let mut builder = InvalidationPathBuilder::new();

        for (name, spec_config) in &config.0 {
            let entity_type = EntityType::from(name.as_str());
            let descriptor = describe(accessor, &entity_type)?;

            let lookups = match spec_config.lookups.clone() {
                Some(lookups) => lookups.into_iter().map(LookupSpec::into_fields).collect(),
                None => vec![
                    LookupSpec::from(PK_ALIAS).into_fields(),
                    LookupSpec::from(descriptor.primary_key()).into_fields(),
                ],
            };
            validate_lookups(descriptor, &lookups)?;

            let spec = CacheSpec {
                primary_key: descriptor.primary_key().to_owned(),
                lookups,
                prefetch: resolve_prefetch(accessor, descriptor, &spec_config.prefetch)?,
                ttl: spec_config.ttl,
                entity_type: entity_type.clone(),
            };
            builder.add_root(&spec)?;
            specs.insert(entity_type, spec);
        }

        Ok(Self {
            specs,
            paths: builder.build(),
        })
    }

    /// Returns the spec of the root type `entity_type`.
    #[must_use]
    pub fn spec(&self, entity_type: &EntityType) -> Option<&CacheSpec> {
        self.specs.get(entity_type)
    }

    /// Iterates over the root specs.
    pub fn specs(&self) -> impl Iterator<Item = &CacheSpec> {
        self.specs.values()
    }

    /// Returns the invalidation paths.
    #[must_use]
    pub fn paths(&self) -> &InvalidationPaths {
        &self.paths
    }

    /// Returns `true` if some cached tree reaches `entity_type`.
    #[must_use]
    pub fn is_cacheable(&self, entity_type: &EntityType) -> bool {
        self.paths.contains(entity_type)
    }
}

fn describe<'a>(accessor: &'a impl EntityAccessor, entity_type: &EntityType) -> Result<&'a EntityDescriptor, ConfigError> {
    accessor.describe(entity_type).ok_or_else(|| ConfigError::UnknownType {
        entity_type: entity_type.clone(),
    })
}

fn validate_lookups(descriptor: &EntityDescriptor, lookups: &[LookupFields]) -> Result<(), ConfigError> {
    for field in lookups.iter().flat_map(LookupFields::iter) {
        if field != PK_ALIAS && !descriptor.has_field(field) {
            let valid: Vec<&str> = std::iter::once(PK_ALIAS).chain(descriptor.field_names()).collect();
            return Err(ConfigError::InvalidLookup {
                entity_type: descriptor.entity_type().clone(),
                field: field.to_owned(),
                valid: valid.join(", "),
            });
        }
    }
    Ok(())
}

fn resolve_prefetch(accessor: &impl EntityAccessor, descriptor: &EntityDescriptor, config: &PrefetchConfig) -> Result<PrefetchTree, ConfigError> {
    let mut tree = BTreeMap::new();

    for (name, children) in config.iter() {
        let relation = relation(descriptor, name)?;
        let target = describe(accessor, relation.target())?;
        // The walk back reads the reverse relation on the target.
        self::relation(target, relation.reverse())?;

        let branch = PrefetchBranch {
            relation: relation.clone(),
            children: resolve_prefetch(accessor, target, children)?,
        };
        tree.insert(name.to_owned(), branch);
    }

    Ok(PrefetchTree(tree))
}

fn relation<'a>(descriptor: &'a EntityDescriptor, name: &str) -> Result<&'a RelationDescriptor, ConfigError> {
    descriptor.relation_named(name).ok_or_else(|| ConfigError::UnknownRelation {
        entity_type: descriptor.entity_type().clone(),
        relation: name.to_owned(),
    })
}
