// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! The key-value store contract behind the cachetree entity cache.
//!
//! The engine never talks to a concrete cache backend. It talks to a [`CacheStore`]: a
//! key-value store with single and batched get, insert and invalidate operations, where
//! every entry may carry its own time-to-live through [`CacheEntry`]. Failures are reported
//! as an opaque [`Error`] and are propagated to the engine's caller untouched; retries and
//! backoff belong to the store implementation.
//!
//! # Implementing a store
//!
//! Only the single-key operations are required. The batched variants default to a loop over
//! them; backends with native multi-key commands should override them.
//!
//! ```
//! use cachetree_store::{CacheEntry, CacheStore, Error};
//! use std::collections::HashMap;
//! use std::sync::RwLock;
//!
//! struct SimpleStore(RwLock<HashMap<String, CacheEntry<i32>>>);
//!
//! impl CacheStore<String, i32> for SimpleStore {
//!     async fn get(&self, key: &String) -> Result<Option<CacheEntry<i32>>, Error> {
//!         Ok(self.0.read().unwrap().get(key).cloned())
//!     }
//!
//!     async fn insert(&self, key: &String, entry: CacheEntry<i32>) -> Result<(), Error> {
//!         self.0.write().unwrap().insert(key.clone(), entry);
//!         Ok(())
//!     }
//!
//!     async fn invalidate(&self, key: &String) -> Result<(), Error> {
//!         self.0.write().unwrap().remove(key);
//!         Ok(())
//!     }
//!
//!     async fn clear(&self) -> Result<(), Error> {
//!         self.0.write().unwrap().clear();
//!         Ok(())
//!     }
//! }
//! ```

mod entry;
pub mod error;
pub(crate) mod store;
#[cfg(any(feature = "test-util", test))]
pub mod testing;

#[doc(inline)]
pub use entry::CacheEntry;
#[doc(inline)]
pub use error::{Error, Result};
#[doc(inline)]
pub use store::CacheStore;
