//! Bounded memoization caches.
//!
//! [`MemoCache`] stores computed values under a fixed capacity with strict
//! least-recently-used eviction and keeps hit/miss/eviction statistics.
//!
//! ## Configuration
//!
//! The order service sizes its caches from the `[cache]` table:
//!
//! ```toml
//! [cache]
//! users_capacity = 128
//! products_capacity = 64
//! discounts_capacity = 32
//! single_flight = false
//! ```

mod config;
mod flight;
mod store;

pub use config::CacheConfig;
pub(crate) use store::{METRIC_CACHE_EVICT, METRIC_CACHE_HIT, METRIC_CACHE_MISS};
pub use store::{CacheStats, MemoCache};
