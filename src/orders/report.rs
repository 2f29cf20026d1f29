//! Batch outcomes and their text/JSON presentation.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::cache::CacheStats;
use crate::pool::{WorkFailure, WorkId, WorkResult};

use super::service::{Receipt, ServiceStats};

/// Final state of one order in a batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OrderStatus {
    Succeeded { receipt: Receipt },
    Failed { failure: WorkFailure },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemOutcome {
    pub order_id: WorkId,
    #[serde(flatten)]
    pub status: OrderStatus,
    pub worker: Option<String>,
    pub elapsed_ms: f64,
}

impl ItemOutcome {
    pub fn from_result(result: WorkResult<Receipt>) -> Self {
        let status = match result.outcome {
            Ok(receipt) => OrderStatus::Succeeded { receipt },
            Err(failure) => OrderStatus::Failed { failure },
        };
        Self {
            order_id: result.id,
            status,
            worker: result.worker,
            elapsed_ms: millis(result.elapsed),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, OrderStatus::Succeeded { .. })
    }
}

/// Everything one batch run produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    pub mode: &'static str,
    /// Outcomes in the order the run observed them.
    pub outcomes: Vec<ItemOutcome>,
    pub succeeded: usize,
    pub failed: usize,
    pub elapsed_ms: f64,
    /// Cache statistics; absent for uncached runs.
    pub caches: Option<ServiceStats>,
}

impl BatchReport {
    pub fn new(
        mode: &'static str,
        outcomes: Vec<ItemOutcome>,
        elapsed: Duration,
        caches: Option<ServiceStats>,
    ) -> Self {
        let succeeded = outcomes.iter().filter(|outcome| outcome.is_success()).count();
        let failed = outcomes.len() - succeeded;
        Self {
            mode,
            outcomes,
            succeeded,
            failed,
            elapsed_ms: millis(elapsed),
            caches,
        }
    }

    pub fn total(&self) -> usize {
        self.outcomes.len()
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "== {} run ==", self.mode)?;
        for outcome in &self.outcomes {
            let worker = outcome.worker.as_deref().unwrap_or("-");
            match &outcome.status {
                OrderStatus::Succeeded { receipt } => writeln!(
                    f,
                    "  {} ok     {:>9.2} ({:.1}% off) [{worker}, {:.1} ms]",
                    outcome.order_id,
                    receipt.final_price,
                    receipt.discount * 100.0,
                    outcome.elapsed_ms
                )?,
                OrderStatus::Failed { failure } => writeln!(
                    f,
                    "  {} failed {failure} [{worker}, {:.1} ms]",
                    outcome.order_id, outcome.elapsed_ms
                )?,
            }
        }
        writeln!(
            f,
            "  succeeded {}/{} in {:.2} s",
            self.succeeded,
            self.total(),
            self.elapsed_ms / 1000.0
        )?;
        if let Some(caches) = &self.caches {
            write_cache_line(f, "users", &caches.users)?;
            write_cache_line(f, "products", &caches.products)?;
            write_cache_line(f, "discounts", &caches.discounts)?;
        }
        Ok(())
    }
}

fn write_cache_line(f: &mut fmt::Formatter<'_>, name: &str, stats: &CacheStats) -> fmt::Result {
    writeln!(
        f,
        "  cache {name:<9} hits={} misses={} evictions={} size={}/{} hit_ratio={:.1}%",
        stats.hits,
        stats.misses,
        stats.evictions,
        stats.len,
        stats.capacity,
        stats.hit_ratio() * 100.0
    )
}

/// Serial vs parallel and uncached vs cached timings of the same workload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comparison {
    pub serial: BatchReport,
    pub parallel: BatchReport,
    pub uncached: BatchReport,
    pub cached: BatchReport,
    pub parallel_speedup: f64,
    pub cache_speedup: f64,
}

impl Comparison {
    pub fn new(
        serial: BatchReport,
        parallel: BatchReport,
        uncached: BatchReport,
        cached: BatchReport,
    ) -> Self {
        let parallel_speedup = ratio(serial.elapsed_ms, parallel.elapsed_ms);
        let cache_speedup = ratio(uncached.elapsed_ms, cached.elapsed_ms);
        Self {
            serial,
            parallel,
            uncached,
            cached,
            parallel_speedup,
            cache_speedup,
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.serial)?;
        write!(f, "{}", self.parallel)?;
        write!(f, "{}", self.uncached)?;
        write!(f, "{}", self.cached)?;
        writeln!(f, "== summary ==")?;
        writeln!(
            f,
            "  serial {:.2} s, parallel {:.2} s, speedup {:.1}x",
            self.serial.elapsed_ms / 1000.0,
            self.parallel.elapsed_ms / 1000.0,
            self.parallel_speedup
        )?;
        writeln!(
            f,
            "  uncached {:.2} s, cached {:.2} s, speedup {:.1}x",
            self.uncached.elapsed_ms / 1000.0,
            self.cached.elapsed_ms / 1000.0,
            self.cache_speedup
        )
    }
}

fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

fn ratio(baseline_ms: f64, improved_ms: f64) -> f64 {
    if improved_ms > 0.0 {
        baseline_ms / improved_ms
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(id: &str, ok: bool) -> ItemOutcome {
        let status = if ok {
            OrderStatus::Succeeded {
                receipt: Receipt {
                    order_id: WorkId::new(id),
                    user_name: "ada".to_string(),
                    product_name: "lamp".to_string(),
                    quantity: 1,
                    original_price: 100.0,
                    discount: 0.05,
                    final_price: 95.0,
                },
            }
        } else {
            OrderStatus::Failed {
                failure: WorkFailure::Failed {
                    messages: vec!["user 9 does not exist".to_string()],
                },
            }
        };
        ItemOutcome {
            order_id: WorkId::new(id),
            status,
            worker: Some("memopool-worker-0".to_string()),
            elapsed_ms: 1.0,
        }
    }

    #[test]
    fn report_counts_outcomes() {
        let report = BatchReport::new(
            "parallel",
            vec![outcome("a", true), outcome("b", false), outcome("c", true)],
            Duration::from_millis(250),
            None,
        );

        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.total(), 3);
        assert_eq!(report.elapsed_ms, 250.0);

        let text = report.to_string();
        assert!(text.contains("b failed user 9 does not exist"));
        assert!(text.contains("succeeded 2/3"));
    }

    #[test]
    fn report_serializes_status_inline() {
        let report = BatchReport::new("serial", vec![outcome("a", false)], Duration::ZERO, None);
        let json = serde_json::to_value(&report).expect("report serializes");

        assert_eq!(json["outcomes"][0]["status"], "failed");
        assert_eq!(json["outcomes"][0]["failure"]["kind"], "failed");
        assert_eq!(json["outcomes"][0]["order_id"], "a");
    }

    #[test]
    fn speedup_guards_zero_duration() {
        assert_eq!(ratio(100.0, 0.0), 0.0);
        assert_eq!(ratio(100.0, 25.0), 4.0);
    }
}
