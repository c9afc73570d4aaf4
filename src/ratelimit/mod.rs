//! Per-client rate limiting logic and state management.

mod bucket;
mod key;
mod limiter;
mod reaper;
mod registry;
mod sharded;
mod store;

pub use bucket::{LimitConfig, TokenBucket};
pub use key::ClientKey;
pub use limiter::ClientRateLimiter;
pub use reaper::Reaper;
pub use registry::ClientRegistry;
pub use sharded::ShardedRegistry;
pub use store::ClientStore;
