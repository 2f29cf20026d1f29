//! Order processing over the worker pool and the lookup caches.
//!
//! Each order resolves its user, its product and the discount for the pair
//! through [`OrderService`], whose three [`MemoCache`](crate::cache::MemoCache)
//! instances absorb repeated lookups. Batches run serially, on a
//! [`WorkerPool`](crate::pool::WorkerPool), or against the bare catalog as a
//! baseline.

mod batch;
mod catalog;
mod report;
mod service;

pub use batch::{
    BatchConfig, compare, generate_orders, run_parallel, run_serial, run_uncached,
};
pub use catalog::{
    Catalog, CatalogConfig, CatalogError, Category, Level, Product, ProductId, SimulatedCatalog,
    User, UserId, discount_rate,
};
pub use report::{BatchReport, Comparison, ItemOutcome, OrderStatus};
pub use service::{OrderError, OrderLine, OrderService, Receipt, ServiceStats, price_order};
