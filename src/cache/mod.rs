//! PulseFeed read cache.
//!
//! Holds precomputed read views (the first page of each user's feed) with a bounded
//! TTL. Write paths never touch entries directly; they go through the dispatcher,
//! which deletes every key a mutation invalidates.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! enabled = true
//! capacity = 10000
//! feed_ttl_seconds = 300
//! feed_page_size = 50
//! ```

mod config;
mod keys;
mod store;

pub use config::CacheConfig;
pub use keys::CacheKey;
pub use store::{CacheError, CacheStore, MemoryCacheStore, NoopCacheStore, ResilientCache};

pub(crate) use store::{
    METRIC_CACHE_ERROR, METRIC_CACHE_HIT, METRIC_CACHE_INVALIDATE, METRIC_CACHE_MISS,
};
