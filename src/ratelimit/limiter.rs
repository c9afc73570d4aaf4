//! Per-client admission limiter.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info};

use super::bucket::LimitConfig;
use super::key::ClientKey;
use super::reaper::Reaper;
use super::registry::ClientRegistry;
use super::sharded::ShardedRegistry;
use super::store::ClientStore;
use crate::config::LimiterConfig;
use crate::error::Result;

/// The per-client rate limiter.
///
/// Owns the client store and the reaper that keeps it bounded. Create it
/// with [`start`](ClientRateLimiter::start) and stop it with
/// [`shutdown`](ClientRateLimiter::shutdown); it is shared across request
/// handlers behind an `Arc`.
pub struct ClientRateLimiter {
    /// Tracked clients
    store: Arc<dyn ClientStore>,
    /// Settings the limiter was started with
    config: LimiterConfig,
    /// Background sweep task, taken on shutdown
    reaper: Mutex<Option<Reaper>>,
}

impl ClientRateLimiter {
    /// Validate `config`, build the client store and start the reaper.
    ///
    /// When limiting is enabled this must run inside a Tokio runtime.
    pub fn start(config: &LimiterConfig) -> Result<Self> {
        config.validate()?;

        let limit = LimitConfig::new(config.burst, config.requests_per_second);
        let store: Arc<dyn ClientStore> = if config.shards > 1 {
            Arc::new(ShardedRegistry::new(limit, config.shards))
        } else {
            Arc::new(ClientRegistry::new(limit))
        };

        let reaper = config.enabled.then(|| {
            Reaper::spawn(store.clone(), config.sweep_interval(), config.idle_ttl())
        });

        info!(
            enabled = config.enabled,
            requests_per_second = config.requests_per_second,
            burst = config.burst,
            shards = config.shards,
            "Client rate limiter started"
        );

        Ok(Self {
            store,
            config: config.clone(),
            reaper: Mutex::new(reaper),
        })
    }

    /// Whether requests are limited at all.
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Decide whether one request from `key` may proceed now.
    ///
    /// Always admits, without tracking the client, when limiting is disabled.
    pub fn admit(&self, key: &ClientKey) -> bool {
        if !self.config.enabled {
            return true;
        }
        let allowed = self.store.admit(key, Instant::now());
        if !allowed {
            debug!(client = %key, "Rate limit exceeded");
        }
        allowed
    }

    /// Run one sweep pass immediately. Returns the number of evicted clients.
    pub fn sweep_now(&self) -> usize {
        self.store.sweep(Instant::now(), self.config.idle_ttl())
    }

    /// Number of tracked clients.
    pub fn tracked_clients(&self) -> usize {
        self.store.len()
    }

    /// Tokens left for `key` as of its last request, if tracked.
    pub fn tokens(&self, key: &ClientKey) -> Option<f64> {
        self.store.tokens(key)
    }

    /// Whether the reaper is still sweeping.
    pub fn is_reaping(&self) -> bool {
        self.reaper.lock().as_ref().is_some_and(Reaper::is_running)
    }

    /// Stop the reaper and wait for it to exit. Safe to call more than once.
    pub async fn shutdown(&self) {
        let reaper = self.reaper.lock().take();
        if let Some(reaper) = reaper {
            reaper.shutdown().await;
        }
    }
}
