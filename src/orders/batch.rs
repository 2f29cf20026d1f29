//! Batch runners: serial, pooled, and an uncached baseline.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{info, instrument};

use crate::pool::{PoolError, WorkFailure, WorkItem, WorkResult, WorkerPool};

use super::catalog::{Catalog, ProductId, UserId};
use super::report::{BatchReport, Comparison, ItemOutcome};
use super::service::{OrderError, OrderLine, OrderService, Receipt, price_order};

const DEFAULT_ORDERS: usize = 20;
const DEFAULT_USER_SPAN: u32 = 5;
const DEFAULT_PRODUCT_SPAN: u32 = 3;
const DEFAULT_MAX_QUANTITY: u32 = 3;
const DEFAULT_SEED: u64 = 42;

/// Shape of a generated order batch, from the `[batch]` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchConfig {
    pub orders: usize,
    /// Orders draw user ids from `1..=user_span`; small spans make keys repeat.
    pub user_span: u32,
    pub product_span: u32,
    pub max_quantity: u32,
    pub seed: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            orders: DEFAULT_ORDERS,
            user_span: DEFAULT_USER_SPAN,
            product_span: DEFAULT_PRODUCT_SPAN,
            max_quantity: DEFAULT_MAX_QUANTITY,
            seed: DEFAULT_SEED,
        }
    }
}

/// Generate `config.orders` orders with ids `ORD-001`, `ORD-002`, ...
pub fn generate_orders(config: &BatchConfig) -> Vec<WorkItem<OrderLine>> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    (1..=config.orders)
        .map(|n| {
            let line = OrderLine {
                user_id: UserId(rng.random_range(1..=config.user_span.max(1))),
                product_id: ProductId(rng.random_range(1..=config.product_span.max(1))),
                quantity: rng.random_range(1..=config.max_quantity.max(1)),
            };
            WorkItem::new(format!("ORD-{n:03}"), line)
        })
        .collect()
}

/// Price every order on the calling thread, in order.
#[instrument(skip_all, fields(orders = orders.len()))]
pub fn run_serial(service: &OrderService, orders: Vec<WorkItem<OrderLine>>) -> BatchReport {
    let started_at = Instant::now();
    let outcomes = orders
        .into_iter()
        .map(|item| {
            let item_started_at = Instant::now();
            let outcome = service.process_order(&item.id, &item.payload);
            log_outcome(local_result(item, outcome, item_started_at))
        })
        .collect();

    BatchReport::new("serial", outcomes, started_at.elapsed(), Some(service.stats()))
}

/// Price every order on the pool, collecting outcomes in completion order.
#[instrument(skip_all, fields(orders = orders.len(), workers = pool.size().get()))]
pub fn run_parallel(
    pool: &WorkerPool,
    service: &Arc<OrderService>,
    orders: Vec<WorkItem<OrderLine>>,
) -> Result<BatchReport, PoolError> {
    let started_at = Instant::now();

    let handles = orders
        .into_iter()
        .map(|item| {
            let service = Arc::clone(service);
            let order_id = item.id.clone();
            pool.submit_item(item, move |line| service.process_order(&order_id, &line))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let outcomes = pool
        .await_as_completed(handles)
        .map(|result| log_outcome(ItemOutcome::from_result(result)))
        .collect();

    Ok(BatchReport::new(
        "parallel",
        outcomes,
        started_at.elapsed(),
        Some(service.stats()),
    ))
}

/// Price every order serially straight against the catalog, bypassing caches.
#[instrument(skip_all, fields(orders = orders.len()))]
pub fn run_uncached(
    catalog: &dyn Catalog,
    handling_delay: Duration,
    orders: Vec<WorkItem<OrderLine>>,
) -> BatchReport {
    let started_at = Instant::now();
    let outcomes = orders
        .into_iter()
        .map(|item| {
            let item_started_at = Instant::now();
            let outcome = price_order(catalog, &item.id, &item.payload, handling_delay);
            log_outcome(local_result(item, outcome, item_started_at))
        })
        .collect();

    BatchReport::new("uncached", outcomes, started_at.elapsed(), None)
}

/// Run the same orders serially, in parallel, uncached and cached.
///
/// Each cached run gets a fresh service so no run benefits from another's
/// warm caches.
pub fn compare(
    pool: &WorkerPool,
    make_service: impl Fn() -> OrderService,
    orders: &[WorkItem<OrderLine>],
) -> Result<Comparison, PoolError> {
    let serial = run_serial(&make_service(), orders.to_vec());
    let parallel = run_parallel(pool, &Arc::new(make_service()), orders.to_vec())?;

    let cached_service = make_service();
    let uncached = run_uncached(
        cached_service.catalog().as_ref(),
        cached_service.handling_delay(),
        orders.to_vec(),
    );
    let mut cached = run_serial(&cached_service, orders.to_vec());
    cached.mode = "cached";

    let comparison = Comparison::new(serial, parallel, uncached, cached);
    info!(
        parallel_speedup = comparison.parallel_speedup,
        cache_speedup = comparison.cache_speedup,
        "Comparison complete"
    );
    Ok(comparison)
}

fn local_result(
    item: WorkItem<OrderLine>,
    outcome: Result<Receipt, OrderError>,
    started_at: Instant,
) -> ItemOutcome {
    ItemOutcome::from_result(WorkResult {
        id: item.id,
        outcome: outcome.map_err(|err| WorkFailure::from_error(&err)),
        worker: thread::current().name().map(str::to_string),
        elapsed: started_at.elapsed(),
    })
}

fn log_outcome(outcome: ItemOutcome) -> ItemOutcome {
    info!(
        order_id = %outcome.order_id,
        success = outcome.is_success(),
        worker = outcome.worker.as_deref().unwrap_or("-"),
        elapsed_ms = outcome.elapsed_ms,
        "Order processed"
    );
    outcome
}
