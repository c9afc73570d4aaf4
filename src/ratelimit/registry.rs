//! Single-lock client registry.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

use super::bucket::{LimitConfig, TokenBucket};
use super::key::ClientKey;
use super::store::ClientStore;

/// A tracked client: its bucket and when it was last seen.
#[derive(Debug, Clone)]
pub(crate) struct ClientEntry {
    bucket: TokenBucket,
    last_seen: Instant,
}

impl ClientEntry {
    pub(crate) fn new(limit: &LimitConfig, now: Instant) -> Self {
        Self {
            bucket: limit.bucket(now),
            last_seen: now,
        }
    }

    /// Refresh the last-seen time and let the bucket decide.
    pub(crate) fn admit(&mut self, now: Instant) -> bool {
        if now > self.last_seen {
            self.last_seen = now;
        }
        self.bucket.allow_at(now)
    }

    /// Whether the entry has been idle for strictly longer than `idle_ttl`.
    pub(crate) fn is_idle(&self, now: Instant, idle_ttl: Duration) -> bool {
        now.saturating_duration_since(self.last_seen) > idle_ttl
    }

    pub(crate) fn tokens(&self) -> f64 {
        self.bucket.tokens()
    }
}

/// Client registry guarded by one exclusive lock.
///
/// Every admission and every sweep pass holds the lock for its whole
/// duration. The critical section is a hash lookup plus a little arithmetic,
/// so contention stays low for typical request rates.
pub struct ClientRegistry {
    /// Tracked clients indexed by key
    clients: Mutex<HashMap<ClientKey, ClientEntry>>,
    /// Limit applied to newly created buckets
    limit: LimitConfig,
}

impl ClientRegistry {
    /// Create an empty registry minting buckets from `limit`.
    pub fn new(limit: LimitConfig) -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
            limit,
        }
    }
}

impl ClientStore for ClientRegistry {
    fn admit(&self, key: &ClientKey, now: Instant) -> bool {
        let mut clients = self.clients.lock();
        let entry = clients.entry(key.clone()).or_insert_with(|| {
            debug!(client = %key, "Tracking new client");
            ClientEntry::new(&self.limit, now)
        });
        let allowed = entry.admit(now);
        trace!(client = %key, allowed, tokens = entry.tokens(), "Admission decided");
        allowed
    }

    fn sweep(&self, now: Instant, idle_ttl: Duration) -> usize {
        let mut clients = self.clients.lock();
        let before = clients.len();
        clients.retain(|_, entry| !entry.is_idle(now, idle_ttl));
        before - clients.len()
    }

    fn tokens(&self, key: &ClientKey) -> Option<f64> {
        self.clients.lock().get(key).map(ClientEntry::tokens)
    }

    fn len(&self) -> usize {
        self.clients.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn key(host: &str) -> ClientKey {
        ClientKey::new(host)
    }

    #[test]
    fn test_registry_creation() {
        let registry = ClientRegistry::new(LimitConfig::new(4, 2.0));
        assert!(registry.is_empty());
        assert_eq!(registry.tokens(&key("10.0.0.1")), None);
    }

    #[test]
    fn test_admit_creates_entry() {
        let registry = ClientRegistry::new(LimitConfig::new(4, 2.0));
        let now = Instant::now();

        assert!(registry.admit(&key("10.0.0.1"), now));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.tokens(&key("10.0.0.1")), Some(3.0));
        assert!(registry.contains(&key("10.0.0.1")));
        assert!(!registry.contains(&key("10.0.0.2")));
    }

    #[test]
    fn test_burst_and_refill_per_client() {
        let registry = ClientRegistry::new(LimitConfig::new(4, 2.0));
        let client = key("10.0.0.1");
        let t0 = Instant::now();

        let decisions: Vec<bool> = (0..6).map(|_| registry.admit(&client, t0)).collect();
        assert_eq!(decisions, vec![true, true, true, true, false, false]);

        let t1 = t0 + Duration::from_secs(1);
        let decisions: Vec<bool> = (0..3).map(|_| registry.admit(&client, t1)).collect();
        assert_eq!(decisions, vec![true, true, false]);
    }

    #[test]
    fn test_clients_are_independent() {
        let registry = ClientRegistry::new(LimitConfig::new(2, 1.0));
        let now = Instant::now();
        let a = key("10.0.0.1");
        let b = key("10.0.0.2");

        assert!(registry.admit(&a, now));
        assert!(registry.admit(&a, now));
        assert!(!registry.admit(&a, now));

        assert!(registry.admit(&b, now));
        assert_eq!(registry.tokens(&b), Some(1.0));
        assert_eq!(registry.tokens(&a), Some(0.0));
    }

    #[test]
    fn test_sweep_evicts_idle_clients() {
        let registry = ClientRegistry::new(LimitConfig::new(4, 2.0));
        let ttl = Duration::from_secs(180);
        let t0 = Instant::now();

        registry.admit(&key("10.0.0.1"), t0);
        registry.admit(&key("10.0.0.2"), t0 + Duration::from_secs(100));

        // Exactly at the TTL the entry survives.
        assert_eq!(registry.sweep(t0 + ttl, ttl), 0);
        assert_eq!(registry.len(), 2);

        let removed = registry.sweep(t0 + ttl + Duration::from_secs(1), ttl);
        assert_eq!(removed, 1);
        assert!(!registry.contains(&key("10.0.0.1")));
        assert!(registry.contains(&key("10.0.0.2")));
    }

    #[test]
    fn test_activity_postpones_eviction() {
        let registry = ClientRegistry::new(LimitConfig::new(4, 2.0));
        let ttl = Duration::from_secs(10);
        let client = key("10.0.0.1");
        let t0 = Instant::now();

        registry.admit(&client, t0);
        registry.admit(&client, t0 + Duration::from_secs(8));

        assert_eq!(registry.sweep(t0 + Duration::from_secs(15), ttl), 0);
        assert_eq!(registry.sweep(t0 + Duration::from_secs(19), ttl), 1);
    }

    #[test]
    fn test_evicted_client_starts_fresh() {
        let registry = ClientRegistry::new(LimitConfig::new(1, 0.001));
        let client = key("10.0.0.1");
        let t0 = Instant::now();

        assert!(registry.admit(&client, t0));
        assert!(!registry.admit(&client, t0));

        let later = t0 + Duration::from_secs(5);
        registry.sweep(later, Duration::from_secs(1));
        assert!(registry.is_empty());
        assert!(registry.admit(&client, later));
    }

    #[test]
    fn test_concurrent_admission_never_exceeds_burst() {
        let registry = Arc::new(ClientRegistry::new(LimitConfig::new(8, 2.0)));
        let now = Instant::now();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    (0..20)
                        .filter(|_| registry.admit(&ClientKey::new("10.0.0.1"), now))
                        .count()
                })
            })
            .collect();

        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 8);
        assert_eq!(registry.tokens(&key("10.0.0.1")), Some(0.0));
    }
}
