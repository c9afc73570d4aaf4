//! Client store trait for abstracting the registry locking strategies.

use std::time::Duration;
use tokio::time::Instant;

use super::key::ClientKey;

/// A keyed collection of client buckets.
///
/// This trait abstracts over the single-lock [`ClientRegistry`](super::ClientRegistry)
/// and the [`ShardedRegistry`](super::ShardedRegistry) so the limiter and the
/// reaper work with either. Implementations must make the whole
/// lookup-or-create, refresh and decide sequence for one key atomic, and
/// must serialize structural changes against [`sweep`](ClientStore::sweep).
pub trait ClientStore: Send + Sync {
    /// Admit or deny one request from `key` at `now`, creating its entry on first sight.
    fn admit(&self, key: &ClientKey, now: Instant) -> bool;

    /// Remove every entry idle for longer than `idle_ttl` at `now`.
    ///
    /// Returns the number of entries removed.
    fn sweep(&self, now: Instant, idle_ttl: Duration) -> usize;

    /// Tokens left in `key`'s bucket as of its last request.
    fn tokens(&self, key: &ClientKey) -> Option<f64>;

    /// Number of tracked clients.
    fn len(&self) -> usize;

    /// Whether no client is tracked.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `key` is tracked.
    fn contains(&self, key: &ClientKey) -> bool {
        self.tokens(key).is_some()
    }
}
