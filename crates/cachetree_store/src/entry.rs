// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::{ops::Deref, time::Duration};

/// A value written to a [`CacheStore`](crate::CacheStore), with its time-to-live.
///
/// An entry without a TTL never expires on its own; it only disappears when it is
/// invalidated or evicted by the store.
///
/// # Examples
///
/// ```
/// use cachetree_store::CacheEntry;
/// use std::time::Duration;
///
/// let entry = CacheEntry::new(42);
/// assert_eq!(*entry.value(), 42);
/// assert!(entry.ttl().is_none());
///
/// let entry = CacheEntry::with_ttl("tree".to_string(), Duration::from_secs(60));
/// assert_eq!(entry.ttl(), Some(Duration::from_secs(60)));
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheEntry<V> {
    value: V,
    ttl: Option<Duration>,
}

impl<V> CacheEntry<V> {
    /// Creates an entry that never expires.
    pub fn new(value: V) -> Self {
        Self { value, ttl: None }
    }

    /// Creates an entry that expires `ttl` after it is written.
    pub fn with_ttl(value: V, ttl: Duration) -> Self {
        Self { value, ttl: Some(ttl) }
    }

    /// Creates an entry with an optional TTL; `None` means no expiry.
    ///
    /// # Examples
    ///
    /// ```
    /// use cachetree_store::CacheEntry;
    ///
    /// let entry = CacheEntry::with_optional_ttl(7, None);
    /// assert!(entry.ttl().is_none());
    /// ```
    pub fn with_optional_ttl(value: V, ttl: Option<Duration>) -> Self {
        Self { value, ttl }
    }

    /// Returns the entry's TTL, if any.
    #[must_use]
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// Sets the entry's TTL.
    pub fn set_ttl(&mut self, ttl: Duration) {
        self.ttl = Some(ttl);
    }

    /// Returns a reference to the stored value.
    #[must_use]
    pub fn value(&self) -> &V {
        &self.value
    }

    /// Consumes the entry and returns the stored value.
    #[must_use]
    pub fn into_value(self) -> V {
        self.value
    }
}

impl<V> Deref for CacheEntry<V> {
    type Target = V;

    fn deref(&self) -> &Self::Target {
        &self.value
    }
}

impl<V> From<V> for CacheEntry<V> {
    fn from(value: V) -> Self {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optional_ttl_round_trips_both_states() {
        assert_eq!(CacheEntry::with_optional_ttl(1, None).ttl(), None);
        assert_eq!(
            CacheEntry::with_optional_ttl(1, Some(Duration::from_secs(5))).ttl(),
            Some(Duration::from_secs(5))
        );
    }

    #[test]
    fn set_ttl_overrides_missing_ttl() {
        let mut entry = CacheEntry::from("value");
        entry.set_ttl(Duration::from_millis(250));
        assert_eq!(entry.ttl(), Some(Duration::from_millis(250)));
        assert_eq!(*entry, "value");
        assert_eq!(entry.into_value(), "value");
    }
}
