//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

use std::{num::NonZeroUsize, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::cache::CacheConfig;
use crate::orders::{BatchConfig, CatalogConfig};
use crate::pool::PoolConfig;

pub use cli::{CliArgs, Command, RunArgs, RunOverrides};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "memopool";
const ENV_PREFIX: &str = "MEMOPOOL";

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub pool: PoolConfig,
    pub cache: CacheConfig,
    pub catalog: CatalogConfig,
    pub batch: BatchConfig,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    pub(crate) fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_run_overrides(&cli.command_or_default().run_args().overrides);

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    pool: RawPoolSettings,
    cache: RawCacheSettings,
    catalog: RawCatalogSettings,
    batch: RawBatchSettings,
}

impl RawSettings {
    fn apply_run_overrides(&mut self, overrides: &RunOverrides) {
        if let Some(orders) = overrides.orders {
            self.batch.orders = Some(orders);
        }
        if let Some(workers) = overrides.workers {
            self.pool.workers = Some(workers);
        }
        if let Some(seed) = overrides.seed {
            self.batch.seed = Some(seed);
        }
        if let Some(single_flight) = overrides.single_flight {
            self.cache.single_flight = Some(single_flight);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        Ok(Self {
            logging: build_logging_settings(raw.logging)?,
            pool: build_pool_settings(raw.pool)?,
            cache: build_cache_settings(raw.cache)?,
            catalog: build_catalog_settings(raw.catalog)?,
            batch: build_batch_settings(raw.batch)?,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_pool_settings(pool: RawPoolSettings) -> Result<PoolConfig, LoadError> {
    let defaults = PoolConfig::default();

    let workers = match pool.workers {
        Some(value) => non_zero_usize(value, "pool.workers")?,
        None => defaults.workers,
    };

    let thread_name_prefix = match pool.thread_name_prefix {
        Some(prefix) => {
            let trimmed = prefix.trim();
            if trimmed.is_empty() {
                return Err(LoadError::invalid(
                    "pool.thread_name_prefix",
                    "must not be empty",
                ));
            }
            trimmed.to_string()
        }
        None => defaults.thread_name_prefix,
    };

    Ok(PoolConfig {
        workers,
        thread_name_prefix,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheConfig, LoadError> {
    let defaults = CacheConfig::default();

    let users_capacity = positive_or(
        cache.users_capacity,
        defaults.users_capacity,
        "cache.users_capacity",
    )?;
    let products_capacity = positive_or(
        cache.products_capacity,
        defaults.products_capacity,
        "cache.products_capacity",
    )?;
    let discounts_capacity = positive_or(
        cache.discounts_capacity,
        defaults.discounts_capacity,
        "cache.discounts_capacity",
    )?;

    Ok(CacheConfig {
        users_capacity,
        products_capacity,
        discounts_capacity,
        single_flight: cache.single_flight.unwrap_or(defaults.single_flight),
    })
}

fn build_catalog_settings(catalog: RawCatalogSettings) -> Result<CatalogConfig, LoadError> {
    let defaults = CatalogConfig::default();

    let users = catalog.users.unwrap_or(defaults.users);
    if users == 0 {
        return Err(LoadError::invalid(
            "catalog.users",
            "must be greater than zero",
        ));
    }
    let products = catalog.products.unwrap_or(defaults.products);
    if products == 0 {
        return Err(LoadError::invalid(
            "catalog.products",
            "must be greater than zero",
        ));
    }

    Ok(CatalogConfig {
        users,
        products,
        user_latency: millis_or(catalog.user_latency_ms, defaults.user_latency),
        product_latency: millis_or(catalog.product_latency_ms, defaults.product_latency),
        discount_latency: millis_or(catalog.discount_latency_ms, defaults.discount_latency),
        order_latency: millis_or(catalog.order_latency_ms, defaults.order_latency),
    })
}

fn build_batch_settings(batch: RawBatchSettings) -> Result<BatchConfig, LoadError> {
    let defaults = BatchConfig::default();

    let orders = positive_or(batch.orders, defaults.orders, "batch.orders")?;
    let user_span = batch.user_span.unwrap_or(defaults.user_span);
    let product_span = batch.product_span.unwrap_or(defaults.product_span);
    let max_quantity = batch.max_quantity.unwrap_or(defaults.max_quantity);

    for (key, value) in [
        ("batch.user_span", user_span),
        ("batch.product_span", product_span),
        ("batch.max_quantity", max_quantity),
    ] {
        if value == 0 {
            return Err(LoadError::invalid(key, "must be greater than zero"));
        }
    }

    Ok(BatchConfig {
        orders,
        user_span,
        product_span,
        max_quantity,
        seed: batch.seed.unwrap_or(defaults.seed),
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawPoolSettings {
    workers: Option<usize>,
    thread_name_prefix: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    users_capacity: Option<usize>,
    products_capacity: Option<usize>,
    discounts_capacity: Option<usize>,
    single_flight: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCatalogSettings {
    users: Option<u32>,
    products: Option<u32>,
    user_latency_ms: Option<u64>,
    product_latency_ms: Option<u64>,
    discount_latency_ms: Option<u64>,
    order_latency_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawBatchSettings {
    orders: Option<usize>,
    user_span: Option<u32>,
    product_span: Option<u32>,
    max_quantity: Option<u32>,
    seed: Option<u64>,
}

fn non_zero_usize(value: usize, key: &'static str) -> Result<NonZeroUsize, LoadError> {
    NonZeroUsize::new(value).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

fn positive_or(
    value: Option<usize>,
    default: usize,
    key: &'static str,
) -> Result<usize, LoadError> {
    non_zero_usize(value.unwrap_or(default), key).map(NonZeroUsize::get)
}

fn millis_or(value: Option<u64>, default: Duration) -> Duration {
    value.map(Duration::from_millis).unwrap_or(default)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}
