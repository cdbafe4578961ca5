// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Caches whole trees of related entities and drops every stale tree when an entity changes.
//!
//! A cached type is looked up by one of its declared lookups (a field or a group of fields)
//! and cached together with its prefetch tree: the relations, and relations of relations,
//! declared for it. From those declarations the crate derives, once, the *invalidation
//! paths* of every type a tree reaches: the reverse routes back to the cached roots.
//! When an entity changes, its paths are walked from both its current and its baseline
//! state, and the keys of every root reached are dropped in one batch.
//!
//! - [`KeyCodec`] derives a readable, collision-resistant key per lookup.
//! - [`PopulationEngine`] answers lookups and fills the cache, caching misses as well.
//! - [`InvalidationPathBuilder`] derives the invalidation paths.
//! - [`InvalidationEngine`] walks them on instance and link changes.
//! - [`CacheTree`] owns the data source ([`EntityAccessor`]), the store
//!   ([`CacheStore`](cachetree_store::CacheStore)) and the settings, and exposes the event
//!   entry points.
//!
//! # Examples
//!
//! ```
//! # #[cfg(all(feature = "test-util", feature = "memory"))]
//! # futures::executor::block_on(async {
//! use cachetree::testing::MemoryGraph;
//! use cachetree::{CacheSpecConfig, CacheTree, Instance, Lookup, RegistryConfig};
//!
//! let graph = MemoryGraph::builder()
//!     .entity("Author", "id", ["first_name", "last_name"])
//!     .build();
//! graph.save(&mut Instance::new("Author", "id", [("id", "1"), ("first_name", "Joe"), ("last_name", "Blog")]));
//!
//! let config = RegistryConfig::new().cache("Author", CacheSpecConfig::new().lookup(["first_name", "last_name"]));
//! let tree = CacheTree::builder(config).accessor(graph.clone()).memory().build()?;
//!
//! let lookup = Lookup::new().with("first_name", "Joe").with("last_name", "Blog");
//! let author = tree.get_cached("Author", &lookup).await?;
//! tree.get_cached("Author", &lookup).await?;
//! assert_eq!(graph.fetch_count(), 1);
//! assert_eq!(author.get("first_name").map(ToString::to_string).as_deref(), Some("Joe"));
//! # Ok::<(), cachetree::Error>(())
//! # });
//! ```

mod accessor;
pub mod builder;
mod error;
mod instance;
mod invalidate;
mod key;
mod paths;
mod populate;
mod registry;
mod settings;
mod telemetry;
#[cfg(any(feature = "test-util", test))]
pub mod testing;
mod tree;
mod value;

#[doc(inline)]
pub use accessor::{
    AccessError, CachingAccessor, EntityAccessor, EntityDescriptor, FetchOutcome, Linking, RelationDescriptor, RelationKind,
};
#[doc(inline)]
pub use builder::CacheTreeBuilder;
#[doc(inline)]
pub use error::{ConfigError, Error, Result};
#[doc(inline)]
pub use instance::{CachedValue, Instance, Related};
#[doc(inline)]
pub use invalidate::{InvalidationEngine, InvalidationReport, LinkAction, LinkChange};
#[doc(inline)]
pub use key::{KeyCodec, Lookup};
#[doc(inline)]
pub use paths::{Hop, InvalidationPath, InvalidationPathBuilder, InvalidationPaths};
#[doc(inline)]
pub use populate::PopulationEngine;
#[doc(inline)]
pub use registry::{CacheSpec, CacheSpecConfig, LookupFields, LookupSpec, PrefetchBranch, PrefetchConfig, PrefetchTree, RegistryConfig, SpecRegistry};
#[doc(inline)]
pub use settings::{DEFAULT_COLLECTION_PREFIX, Settings};
#[doc(inline)]
pub use telemetry::CacheTreeTelemetry;
#[doc(inline)]
pub use tree::{CacheTree, InvalidationPause};
#[doc(inline)]
pub use value::{EntityType, FieldValue, PK_ALIAS, Snapshot};
