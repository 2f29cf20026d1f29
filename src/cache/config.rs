//! Cache configuration.
//!
//! Sizes the three lookup caches owned by the order service.

use std::num::NonZeroUsize;

use serde::Deserialize;

// Default values for cache configuration
const DEFAULT_USERS_CAPACITY: usize = 128;
const DEFAULT_PRODUCTS_CAPACITY: usize = 64;
const DEFAULT_DISCOUNTS_CAPACITY: usize = 32;

/// Cache configuration from the `[cache]` table.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum user records memoized by id.
    pub users_capacity: usize,
    /// Maximum product records memoized by id.
    pub products_capacity: usize,
    /// Maximum discount rates memoized by (level, category).
    pub discounts_capacity: usize,
    /// Coalesce concurrent misses on the same key into one computation.
    ///
    /// A computation must not look up its own key in the same cache: the
    /// nested call waits on its own flight and never returns.
    pub single_flight: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            users_capacity: DEFAULT_USERS_CAPACITY,
            products_capacity: DEFAULT_PRODUCTS_CAPACITY,
            discounts_capacity: DEFAULT_DISCOUNTS_CAPACITY,
            single_flight: false,
        }
    }
}

impl CacheConfig {
    /// Returns the users capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn users_capacity_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.users_capacity).unwrap_or(NonZeroUsize::MIN)
    }

    /// Returns the products capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn products_capacity_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.products_capacity).unwrap_or(NonZeroUsize::MIN)
    }

    /// Returns the discounts capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn discounts_capacity_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.discounts_capacity).unwrap_or(NonZeroUsize::MIN)
    }
}
