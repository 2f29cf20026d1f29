//! Order pricing over memoized catalog lookups.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::cache::{CacheConfig, CacheStats, MemoCache};
use crate::pool::WorkId;

use super::catalog::{Catalog, CatalogError, Category, Level, Product, ProductId, User, UserId};

/// Arguments of one order: who buys what, and how many.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OrderLine {
    pub user_id: UserId,
    pub product_id: ProductId,
    pub quantity: u32,
}

/// Priced order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Receipt {
    pub order_id: WorkId,
    pub user_name: String,
    pub product_name: String,
    pub quantity: u32,
    pub original_price: f64,
    pub discount: f64,
    pub final_price: f64,
}

#[derive(Debug, Error)]
pub enum OrderError {
    #[error("user {0} does not exist")]
    UnknownUser(UserId),
    #[error("product {0} does not exist")]
    UnknownProduct(ProductId),
    #[error("catalog lookup failed")]
    Catalog(#[from] CatalogError),
}

/// Statistics of the three lookup caches.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ServiceStats {
    pub users: CacheStats,
    pub products: CacheStats,
    pub discounts: CacheStats,
}

/// Catalog front that memoizes every lookup kind in its own bounded cache.
///
/// The caches belong to the service; workers share the service through an
/// `Arc` and therefore share its caches.
pub struct OrderService {
    catalog: Arc<dyn Catalog>,
    users: MemoCache<UserId, Option<User>>,
    products: MemoCache<ProductId, Option<Product>>,
    discounts: MemoCache<(Level, Category), f64>,
    handling_delay: Duration,
}

impl OrderService {
    pub fn new(catalog: Arc<dyn Catalog>, config: &CacheConfig, handling_delay: Duration) -> Self {
        Self {
            catalog,
            users: build_cache("users", config.users_capacity_non_zero(), config.single_flight),
            products: build_cache(
                "products",
                config.products_capacity_non_zero(),
                config.single_flight,
            ),
            discounts: build_cache(
                "discounts",
                config.discounts_capacity_non_zero(),
                config.single_flight,
            ),
            handling_delay,
        }
    }

    /// Price one order, resolving user, product and discount through the caches.
    pub fn process_order(&self, order_id: &WorkId, line: &OrderLine) -> Result<Receipt, OrderError> {
        price_order(self, order_id, line, self.handling_delay)
    }

    pub fn stats(&self) -> ServiceStats {
        ServiceStats {
            users: self.users.stats(),
            products: self.products.stats(),
            discounts: self.discounts.stats(),
        }
    }

    /// Empty every cache; counters are kept.
    pub fn clear_caches(&self) {
        self.users.clear();
        self.products.clear();
        self.discounts.clear();
    }

    pub fn catalog(&self) -> &Arc<dyn Catalog> {
        &self.catalog
    }

    pub fn handling_delay(&self) -> Duration {
        self.handling_delay
    }
}

fn build_cache<K, V>(
    name: &'static str,
    capacity: std::num::NonZeroUsize,
    single_flight: bool,
) -> MemoCache<K, V>
where
    K: Eq + std::hash::Hash + Clone,
    V: Clone,
{
    if single_flight {
        MemoCache::single_flight(name, capacity)
    } else {
        MemoCache::new(name, capacity)
    }
}

impl Catalog for OrderService {
    fn user(&self, id: UserId) -> Result<Option<User>, CatalogError> {
        self.users.get_or_compute(id, || self.catalog.user(id))
    }

    fn product(&self, id: ProductId) -> Result<Option<Product>, CatalogError> {
        self.products.get_or_compute(id, || self.catalog.product(id))
    }

    fn discount(&self, level: Level, category: Category) -> Result<f64, CatalogError> {
        self.discounts
            .get_or_compute((level, category), || self.catalog.discount(level, category))
    }
}

/// Price `line` against any catalog, cached or not.
pub fn price_order(
    lookups: &dyn Catalog,
    order_id: &WorkId,
    line: &OrderLine,
    handling_delay: Duration,
) -> Result<Receipt, OrderError> {
    let user = lookups
        .user(line.user_id)?
        .ok_or(OrderError::UnknownUser(line.user_id))?;
    let product = lookups
        .product(line.product_id)?
        .ok_or(OrderError::UnknownProduct(line.product_id))?;
    let discount = lookups.discount(user.level, product.category)?;

    let original_price = f64::from(product.price) * f64::from(line.quantity);
    let final_price = round_cents(original_price * (1.0 - discount));

    thread::sleep(handling_delay);

    Ok(Receipt {
        order_id: order_id.clone(),
        user_name: user.name,
        product_name: product.name,
        quantity: line.quantity,
        original_price,
        discount,
        final_price,
    })
}

fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}
