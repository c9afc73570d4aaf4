//! Hash-sharded client registry.

use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

use super::bucket::LimitConfig;
use super::key::ClientKey;
use super::registry::ClientEntry;
use super::store::ClientStore;

/// Client registry split into independently locked shards.
///
/// A key hashes to exactly one shard, and admission holds that shard's
/// write lock across lookup-or-create, refresh and decision. Sweeps visit
/// the shards one at a time, so requests for keys in other shards keep
/// flowing while a shard is being swept.
pub struct ShardedRegistry {
    /// Tracked clients, sharded by key hash
    clients: DashMap<ClientKey, ClientEntry>,
    /// Limit applied to newly created buckets
    limit: LimitConfig,
}

impl ShardedRegistry {
    /// Create an empty registry with at least `shards` partitions.
    ///
    /// The shard count is rounded up to a power of two, with a minimum of two.
    pub fn new(limit: LimitConfig, shards: usize) -> Self {
        let shard_amount = shards.max(2).next_power_of_two();
        debug!(shards = shard_amount, "Creating sharded client registry");
        Self {
            clients: DashMap::with_shard_amount(shard_amount),
            limit,
        }
    }
}

impl ClientStore for ShardedRegistry {
    fn admit(&self, key: &ClientKey, now: Instant) -> bool {
        let mut entry = self.clients.entry(key.clone()).or_insert_with(|| {
            debug!(client = %key, "Tracking new client");
            ClientEntry::new(&self.limit, now)
        });
        let allowed = entry.admit(now);
        trace!(client = %key, allowed, tokens = entry.tokens(), "Admission decided");
        allowed
    }

    fn sweep(&self, now: Instant, idle_ttl: Duration) -> usize {
        let before = self.clients.len();
        self.clients.retain(|_, entry| !entry.is_idle(now, idle_ttl));
        before.saturating_sub(self.clients.len())
    }

    fn tokens(&self, key: &ClientKey) -> Option<f64> {
        self.clients.get(key).map(|entry| entry.tokens())
    }

    fn len(&self) -> usize {
        self.clients.len()
    }
}
