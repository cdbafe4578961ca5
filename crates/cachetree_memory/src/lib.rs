// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! In-memory [`CacheStore`](cachetree_store::CacheStore) backed by moka.
//!
//! [`MemoryStore`] honors the TTL carried by each [`CacheEntry`](cachetree_store::CacheEntry),
//! so trees cached with different time-to-live settings can share one store. Use
//! [`MemoryStoreBuilder`] to bound the store without exposing moka types.
//!
//! # Quick Start
//!
//! ```
//! use cachetree_memory::MemoryStore;
//! use cachetree_store::{CacheEntry, CacheStore};
//! use std::time::Duration;
//!
//! # futures::executor::block_on(async {
//! let store = MemoryStore::<String, i32>::builder().max_capacity(1000).build();
//!
//! store
//!     .insert(&"key".to_string(), CacheEntry::with_ttl(42, Duration::from_secs(300)))
//!     .await
//!     .unwrap();
//! let value = store.get(&"key".to_string()).await.unwrap();
//! assert_eq!(*value.unwrap().value(), 42);
//! # });
//! ```

pub mod builder;
mod expiry;
pub mod store;

#[doc(inline)]
pub use builder::MemoryStoreBuilder;
#[doc(inline)]
pub use store::MemoryStore;
