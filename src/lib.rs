//! Bounded memoizing LRU caches and a bounded worker pool, composed by an
//! order-processing driver.

pub mod cache;
pub mod config;
pub mod error;
pub mod infra;
pub(crate) mod lock;
pub mod orders;
pub mod pool;
