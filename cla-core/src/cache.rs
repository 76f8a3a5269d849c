//! Lookup caches that share in-flight work.
//!
//! Each cache maps a key to the outcome of one API lookup. Concurrent
//! lookups for a key with no live entry are coalesced: the first caller runs
//! the computation and every other caller waits for that same result, so at
//! most one outbound call per key is outstanding at any instant. Failures are
//! cached like successes and stand until the entry expires.
//!
//! Expiry is absolute (time to live from insertion, reads do not extend it).
//! Once capacity is reached the least recently used entry is evicted. Moka
//! applies evictions in batched maintenance, so the entry count can overshoot
//! the capacity until [`CoalescingCache::run_pending_tasks`] has run.

use std::future::Future;
use std::time::Duration;

use moka::future::Cache;
use moka::policy::EvictionPolicy;
use tracing::debug;

use crate::error::ApiError;

/// Capacity and time to live for one cache instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    pub capacity: u64,
    pub ttl: Duration,
}

impl CachePolicy {
    /// Repository collaborator lookups, keyed `owner:repo:username`.
    pub const MEMBERSHIP: CachePolicy = CachePolicy {
        capacity: 500,
        ttl: Duration::from_secs(60 * 60 * 24),
    };

    /// Agreement lookups, keyed by username.
    pub const AGREEMENT: CachePolicy = CachePolicy {
        capacity: 2000,
        ttl: Duration::from_secs(60 * 60 * 24 * 30),
    };
}

/// Join key fields in a fixed order.
pub fn cache_key(fields: &[&str]) -> String {
    fields.join(":")
}

#[derive(Clone)]
pub struct CoalescingCache<V> {
    name: &'static str,
    entries: Cache<String, Result<V, ApiError>>,
}

impl<V> CoalescingCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(name: &'static str, policy: CachePolicy) -> Self {
        let entries = Cache::builder()
            .name(name)
            .max_capacity(policy.capacity)
            .time_to_live(policy.ttl)
            .eviction_policy(EvictionPolicy::lru())
            .build();

        Self { name, entries }
    }

    /// Return the live entry for `key`, or run `compute` and cache its
    /// outcome.
    ///
    /// `compute` is only polled when this call is the one that fills the
    /// entry; callers arriving while it runs wait for its result instead.
    pub async fn get_or_compute<F>(&self, key: String, compute: F) -> Result<V, ApiError>
    where
        F: Future<Output = Result<V, ApiError>>,
    {
        let entry = self.entries.entry(key).or_insert_with(compute).await;

        if entry.is_fresh() {
            debug!(cache = self.name, key = %entry.key(), "cache miss");
        } else {
            debug!(cache = self.name, key = %entry.key(), "cache hit");
        }

        entry.into_value()
    }

    /// Drop the entry for `key` so the next lookup computes afresh.
    pub async fn invalidate(&self, key: &str) {
        self.entries.invalidate(key).await;
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Approximate number of live entries; exact after
    /// [`run_pending_tasks`](Self::run_pending_tasks).
    pub fn entry_count(&self) -> u64 {
        self.entries.entry_count()
    }

    /// Apply pending evictions and expirations now.
    pub async fn run_pending_tasks(&self) {
        self.entries.run_pending_tasks().await;
    }
}
