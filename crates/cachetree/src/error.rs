// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Error types.

use crate::{AccessError, EntityType, Lookup};

/// An invalid cache configuration.
///
/// Always fatal: a cache-dependency graph that is only partly right leaves stale trees in
/// the cache without any sign of it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// The data source does not know the type.
    #[error("entity type `{entity_type}` is not known to the data source")]
    UnknownType {
        /// The unknown type.
        entity_type: EntityType,
    },

    /// The type has no such relation.
    #[error("`{entity_type}` has no relation named `{relation}`")]
    UnknownRelation {
        /// The type the relation was looked up on.
        entity_type: EntityType,
        /// The missing relation.
        relation: String,
    },

    /// A lookup names something other than a direct field.
    #[error("cannot cache `{entity_type}` with lookup `{field}`; lookups must be one or more of: {valid}")]
    InvalidLookup {
        /// The cached type.
        entity_type: EntityType,
        /// The offending lookup field.
        field: String,
        /// The fields a lookup may use.
        valid: String,
    },

    /// A collection with an explicit linking type is cached without the linking rows.
    #[error("to reliably invalidate {entity_type}.{relation}, also cache {entity_type}.{linking_accessor}")]
    MissingLinkingCache {
        /// The type owning the collection.
        entity_type: EntityType,
        /// The cached collection.
        relation: String,
        /// The relation reaching the linking rows, which must be cached next to it.
        linking_accessor: String,
    },

    /// A cached collection would be attached under a name the instance already uses.
    #[error("cannot attach cached collection `{attribute}` to `{entity_type}`: the name is already taken")]
    CachedCollectionClash {
        /// The type of the instance.
        entity_type: EntityType,
        /// The attribute name.
        attribute: String,
    },

    /// A type is invalidated but no cached tree reaches it.
    #[error("cannot invalidate `{entity_type}`: no cached tree reaches it")]
    NoInvalidationPath {
        /// The type.
        entity_type: EntityType,
    },

    /// A lookup was made on a type that is not cached.
    #[error("caching is not enabled for `{entity_type}`")]
    NotCached {
        /// The type.
        entity_type: EntityType,
    },
}

/// An error from a cache tree operation.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The configuration is invalid.
    #[error(transparent)]
    Configuration(#[from] ConfigError),

    /// The lookup fields match none of the type's declared lookups.
    #[error("lookup ({fields}) does not match any declared lookup of `{entity_type}`")]
    Usage {
        /// The looked-up type.
        entity_type: EntityType,
        /// The fields that were given.
        fields: String,
    },

    /// A link change names a relation that is not a collection.
    #[error("`{entity_type}.{relation}` is not a collection; link changes only apply to collections")]
    NotACollection {
        /// The owner type.
        entity_type: EntityType,
        /// The relation.
        relation: String,
    },

    /// Nothing matches the lookup.
    #[error("no `{entity_type}` matches {lookup}")]
    NotFound {
        /// The looked-up type.
        entity_type: EntityType,
        /// The lookup.
        lookup: Lookup,
    },

    /// More than one entity matches the lookup.
    #[error("more than one `{entity_type}` matches {lookup}")]
    Ambiguous {
        /// The looked-up type.
        entity_type: EntityType,
        /// The lookup.
        lookup: Lookup,
    },

    /// The cache store failed.
    #[error("cache store operation failed")]
    Store(#[from] cachetree_store::Error),

    /// The data source failed.
    #[error("data source operation failed")]
    Access(#[from] AccessError),
}

impl Error {
    /// Returns `true` for [`Error::NotFound`].
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` for [`Error::Ambiguous`].
    #[must_use]
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, Self::Ambiguous { .. })
    }
}

/// A specialized [`Result`] type for cache tree operations.
pub type Result<T> = std::result::Result<T, Error>;
