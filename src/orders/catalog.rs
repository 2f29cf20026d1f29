//! Lookup seam for user, product and discount data, plus a simulated store.

use std::collections::HashMap;
use std::fmt;
use std::thread;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub u32);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Regular,
    Vip,
    Diamond,
}

impl Level {
    pub const ALL: [Level; 3] = [Level::Regular, Level::Vip, Level::Diamond];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Electronics,
    Apparel,
    Food,
    Books,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Electronics,
        Category::Apparel,
        Category::Food,
        Category::Books,
    ];
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub level: Level,
    pub city: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    /// Unit price in whole currency units.
    pub price: u32,
    pub category: Category,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("catalog backend unavailable: {0}")]
    Unavailable(String),
}

impl CatalogError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }
}

/// Source of the records an order needs.
///
/// `Ok(None)` means the record does not exist; `Err` means the lookup itself
/// failed. Implementations are shared across worker threads.
pub trait Catalog: Send + Sync {
    fn user(&self, id: UserId) -> Result<Option<User>, CatalogError>;

    fn product(&self, id: ProductId) -> Result<Option<Product>, CatalogError>;

    fn discount(&self, level: Level, category: Category) -> Result<f64, CatalogError>;
}

/// Discount rate for a customer level buying in a product category.
pub fn discount_rate(level: Level, category: Category) -> f64 {
    match (level, category) {
        (Level::Vip, Category::Electronics) => 0.15,
        (Level::Vip, Category::Apparel) => 0.20,
        (Level::Vip, Category::Food) => 0.10,
        (Level::Diamond, Category::Electronics) => 0.25,
        (Level::Diamond, Category::Apparel) => 0.30,
        (Level::Diamond, Category::Food) => 0.15,
        _ => 0.05,
    }
}

const DEFAULT_USERS: u32 = 20;
const DEFAULT_PRODUCTS: u32 = 10;
const DEFAULT_USER_LATENCY_MS: u64 = 50;
const DEFAULT_PRODUCT_LATENCY_MS: u64 = 30;
const DEFAULT_DISCOUNT_LATENCY_MS: u64 = 20;
const DEFAULT_ORDER_LATENCY_MS: u64 = 10;

const CITIES: [&str; 4] = ["Beijing", "Shanghai", "Guangzhou", "Shenzhen"];
const MIN_PRICE: u32 = 50;
const MAX_PRICE: u32 = 500;

/// Shape and latency of the simulated catalog, from the `[catalog]` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogConfig {
    pub users: u32,
    pub products: u32,
    pub user_latency: Duration,
    pub product_latency: Duration,
    pub discount_latency: Duration,
    /// Extra handling time spent on every priced order.
    pub order_latency: Duration,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            users: DEFAULT_USERS,
            products: DEFAULT_PRODUCTS,
            user_latency: Duration::from_millis(DEFAULT_USER_LATENCY_MS),
            product_latency: Duration::from_millis(DEFAULT_PRODUCT_LATENCY_MS),
            discount_latency: Duration::from_millis(DEFAULT_DISCOUNT_LATENCY_MS),
            order_latency: Duration::from_millis(DEFAULT_ORDER_LATENCY_MS),
        }
    }
}

/// In-memory catalog that sleeps on every lookup to stand in for a real store.
pub struct SimulatedCatalog {
    users: HashMap<UserId, User>,
    products: HashMap<ProductId, Product>,
    user_latency: Duration,
    product_latency: Duration,
    discount_latency: Duration,
}

impl SimulatedCatalog {
    /// Generate users `1..=config.users` and products `1..=config.products`.
    pub fn generate(config: &CatalogConfig, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);

        let users = (1..=config.users)
            .map(|id| {
                let user = User {
                    id: UserId(id),
                    name: format!("user-{id}"),
                    level: *Level::ALL.choose(&mut rng).unwrap_or(&Level::Regular),
                    city: CITIES.choose(&mut rng).unwrap_or(&CITIES[0]).to_string(),
                };
                (user.id, user)
            })
            .collect();

        let products = (1..=config.products)
            .map(|id| {
                let product = Product {
                    id: ProductId(id),
                    name: format!("product-{id}"),
                    price: rng.random_range(MIN_PRICE..=MAX_PRICE),
                    category: *Category::ALL
                        .choose(&mut rng)
                        .unwrap_or(&Category::Electronics),
                };
                (product.id, product)
            })
            .collect();

        Self {
            users,
            products,
            user_latency: config.user_latency,
            product_latency: config.product_latency,
            discount_latency: config.discount_latency,
        }
    }

    /// Build a catalog from explicit records with no artificial latency.
    pub fn from_records(
        users: impl IntoIterator<Item = User>,
        products: impl IntoIterator<Item = Product>,
    ) -> Self {
        Self {
            users: users.into_iter().map(|user| (user.id, user)).collect(),
            products: products
                .into_iter()
                .map(|product| (product.id, product))
                .collect(),
            user_latency: Duration::ZERO,
            product_latency: Duration::ZERO,
            discount_latency: Duration::ZERO,
        }
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn product_count(&self) -> usize {
        self.products.len()
    }
}

impl Catalog for SimulatedCatalog {
    fn user(&self, id: UserId) -> Result<Option<User>, CatalogError> {
        info!(user_id = id.0, "Querying user store");
        thread::sleep(self.user_latency);
        Ok(self.users.get(&id).cloned())
    }

    fn product(&self, id: ProductId) -> Result<Option<Product>, CatalogError> {
        info!(product_id = id.0, "Querying product store");
        thread::sleep(self.product_latency);
        Ok(self.products.get(&id).cloned())
    }

    fn discount(&self, level: Level, category: Category) -> Result<f64, CatalogError> {
        info!(?level, ?category, "Computing discount");
        thread::sleep(self.discount_latency);
        Ok(discount_rate(level, category))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instant_config() -> CatalogConfig {
        CatalogConfig {
            user_latency: Duration::ZERO,
            product_latency: Duration::ZERO,
            discount_latency: Duration::ZERO,
            ..CatalogConfig::default()
        }
    }

    #[test]
    fn discount_table_matches_rules() {
        assert_eq!(discount_rate(Level::Vip, Category::Electronics), 0.15);
        assert_eq!(discount_rate(Level::Vip, Category::Apparel), 0.20);
        assert_eq!(discount_rate(Level::Diamond, Category::Apparel), 0.30);
        assert_eq!(discount_rate(Level::Diamond, Category::Food), 0.15);
        assert_eq!(discount_rate(Level::Regular, Category::Electronics), 0.05);
        assert_eq!(discount_rate(Level::Vip, Category::Books), 0.05);
    }

    #[test]
    fn generated_catalog_is_deterministic_per_seed() {
        let first = SimulatedCatalog::generate(&instant_config(), 7);
        let second = SimulatedCatalog::generate(&instant_config(), 7);

        assert_eq!(first.user_count(), 20);
        assert_eq!(first.product_count(), 10);
        for id in 1..=20 {
            assert_eq!(
                first.user(UserId(id)).expect("lookup"),
                second.user(UserId(id)).expect("lookup")
            );
        }
        for id in 1..=10 {
            let product = first
                .product(ProductId(id))
                .expect("lookup")
                .expect("product exists");
            assert!((MIN_PRICE..=MAX_PRICE).contains(&product.price));
        }
    }

    #[test]
    fn unknown_records_are_none() {
        let catalog = SimulatedCatalog::generate(&instant_config(), 1);
        assert_eq!(catalog.user(UserId(999)).expect("lookup"), None);
        assert_eq!(catalog.product(ProductId(0)).expect("lookup"), None);
    }
}
