//! Background eviction of idle clients.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::store::ClientStore;

/// Periodic task that sweeps idle clients out of a [`ClientStore`].
///
/// The sweep loop stops when [`shutdown`](Reaper::shutdown) is called or the
/// reaper is dropped, at the latest one interval later.
pub struct Reaper {
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl Reaper {
    /// Spawn the sweep loop on the current Tokio runtime.
    pub fn spawn(store: Arc<dyn ClientStore>, interval: Duration, idle_ttl: Duration) -> Self {
        let token = CancellationToken::new();
        let handle = tokio::spawn(sweep_loop(store, interval, idle_ttl, token.clone()));

        info!(
            interval_secs = interval.as_secs_f64(),
            idle_ttl_secs = idle_ttl.as_secs_f64(),
            "Reaper started"
        );

        Self {
            token,
            handle: Some(handle),
        }
    }

    /// Whether the sweep loop is still running.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the sweep loop and wait for it to exit.
    pub async fn shutdown(mut self) {
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "Reaper task ended abnormally");
            }
        }
        info!("Reaper stopped");
    }
}

impl Drop for Reaper {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

async fn sweep_loop(
    store: Arc<dyn ClientStore>,
    interval: Duration,
    idle_ttl: Duration,
    token: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                let removed = store.sweep(Instant::now(), idle_ttl);
                debug!(removed, remaining = store.len(), "Swept idle clients");
            }
        }
    }
}
