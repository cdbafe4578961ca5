// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::{Duration, Instant};

use cachetree_store::CacheEntry;
use moka::Expiry;

/// Expires each entry after the TTL it was written with.
///
/// Reads never extend an entry's life. A rewrite restarts the clock with the new entry's TTL.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct EntryTtl;

impl<K, V> Expiry<K, CacheEntry<V>> for EntryTtl {
    fn expire_after_create(&self, _key: &K, value: &CacheEntry<V>, _created_at: Instant) -> Option<Duration> {
        value.ttl()
    }

    fn expire_after_update(
        &self,
        _key: &K,
        value: &CacheEntry<V>,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        value.ttl()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_and_update_follow_entry_ttl() {
        let now = Instant::now();
        let timed = CacheEntry::with_ttl(1, Duration::from_secs(3));
        let forever = CacheEntry::new(1);

        assert_eq!(Expiry::<&str, _>::expire_after_create(&EntryTtl, &"k", &timed, now), Some(Duration::from_secs(3)));
        assert_eq!(
            Expiry::<&str, _>::expire_after_update(&EntryTtl, &"k", &forever, now, Some(Duration::from_secs(1))),
            None
        );
    }
}
