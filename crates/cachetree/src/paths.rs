// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Invalidation paths: the reverse routes from a cached type back to the roots that cache it.

use std::collections::HashMap;

use crate::{
    error::ConfigError,
    registry::{CacheSpec, PrefetchTree},
    value::EntityType,
};

/// One step of an invalidation path: read `relation` to reach the `owner` type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Hop {
    relation: String,
    owner: EntityType,
}

impl Hop {
    /// Returns the relation to read.
    #[must_use]
    pub fn relation(&self) -> &str {
        &self.relation
    }

    /// Returns the type the relation leads to.
    #[must_use]
    pub fn owner(&self) -> &EntityType {
        &self.owner
    }
}

/// A reverse route from a type to a root type. An empty path means the type is a root.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct InvalidationPath(Vec<Hop>);

impl InvalidationPath {
    /// Returns the hops, nearest first.
    #[must_use]
    pub fn hops(&self) -> &[Hop] {
        &self.0
    }

    /// Returns the first hop, if the path has one.
    #[must_use]
    pub fn first_hop(&self) -> Option<&Hop> {
        self.0.first()
    }

    /// Returns `true` if the path ends where it starts.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the number of hops.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the path has no hop.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn prepend(&self, relation: &str, owner: &EntityType) -> Self {
        let mut hops = Vec::with_capacity(self.0.len() + 1);
        hops.push(Hop {
            relation: relation.to_owned(),
            owner: owner.clone(),
        });
        hops.extend(self.0.iter().cloned());
        Self(hops)
    }
}

/// Every invalidation path of every cached type. Read-only once built.
#[derive(Clone, Debug, Default)]
pub struct InvalidationPaths(HashMap<EntityType, Vec<InvalidationPath>>);

impl InvalidationPaths {
    /// Returns the paths of `entity_type`; empty if no cached tree reaches it.
    #[must_use]
    pub fn get(&self, entity_type: &EntityType) -> &[InvalidationPath] {
        self.0.get(entity_type).map_or(&[], Vec::as_slice)
    }

    /// Returns `true` if some cached tree reaches `entity_type`.
    #[must_use]
    pub fn contains(&self, entity_type: &EntityType) -> bool {
        self.0.contains_key(entity_type)
    }

    /// Iterates over the types some cached tree reaches.
    pub fn types(&self) -> impl Iterator<Item = &EntityType> {
        self.0.keys()
    }

    /// Returns `true` if `candidate` caches a relation to `related`, that is, if some path
    /// of `related` starts with a hop into `candidate`.
    #[must_use]
    pub fn requires_invalidation(&self, candidate: &EntityType, related: &EntityType) -> bool {
        self.get(related)
            .iter()
            .filter_map(InvalidationPath::first_hop)
            .any(|hop| hop.owner() == candidate)
    }
}

/// Derives invalidation paths from root cache specs.
///
/// Each root contributes the empty path for itself. Walking its prefetch tree depth-first,
/// every relation extends the path by a hop `(reverse relation, parent type)` at the front,
/// so a type collects one path per route by which a root's tree reaches it.
#[derive(Debug, Default)]
pub struct InvalidationPathBuilder {
    paths: HashMap<EntityType, Vec<InvalidationPath>>,
}

impl InvalidationPathBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the paths contributed by the root `spec`.
    pub fn add_root(&mut self, spec: &CacheSpec) -> Result<(), ConfigError> {
        self.add(spec.entity_type(), InvalidationPath::default(), spec.prefetch())
    }

    /// Finishes the paths.
    #[must_use]
    pub fn build(self) -> InvalidationPaths {
        InvalidationPaths(self.paths)
    }

    fn add(&mut self, entity_type: &EntityType, path: InvalidationPath, tree: &PrefetchTree) -> Result<(), ConfigError> {
        let base = path.clone();
        self.paths.entry(entity_type.clone()).or_default().push(path);

        for (name, branch) in tree.iter() {
            if let Some(linking) = branch.relation().linking()
                && !linking.is_auto_created()
                && !tree.contains(linking.owner_accessor())
            {
                return Err(ConfigError::MissingLinkingCache {
                    entity_type: entity_type.clone(),
                    relation: name.to_owned(),
                    linking_accessor: linking.owner_accessor().to_owned(),
                });
            }

            let child_path = base.prepend(branch.relation().reverse(), entity_type);
            self.add(branch.relation().target(), child_path, branch.children())?;
        }

        Ok(())
    }
}
