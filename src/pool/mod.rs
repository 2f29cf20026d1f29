//! Bounded worker pool.
//!
//! A fixed set of named OS threads pulls jobs from a shared queue. Every job
//! reports back through its own [`WorkHandle`]; a job that fails or panics is
//! captured as a [`WorkFailure`] on its result and never takes a worker down.
//!
//! ```toml
//! [pool]
//! workers = 4
//! thread_name_prefix = "memopool-worker"
//! ```

mod handle;
mod work;

use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender};
use metrics::{gauge, histogram};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::lock::mutex_lock;

pub use handle::{AsCompleted, WorkHandle, await_all, await_as_completed};
pub use work::{WorkFailure, WorkId, WorkItem, WorkResult};

const SOURCE: &str = "pool";

pub(crate) const METRIC_POOL_PENDING: &str = "memopool_pool_pending";
pub(crate) const METRIC_WORK_ITEM_MS: &str = "memopool_work_item_ms";

const DEFAULT_WORKERS: usize = 4;
const DEFAULT_THREAD_NAME_PREFIX: &str = "memopool-worker";

type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("worker pool has been shut down")]
    Shutdown,
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Pool configuration from the `[pool]` table.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PoolConfig {
    /// Number of worker threads, fixed for the pool's lifetime.
    pub workers: NonZeroUsize,
    /// Worker threads are named `{prefix}-{index}`.
    pub thread_name_prefix: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: NonZeroUsize::new(DEFAULT_WORKERS).unwrap_or(NonZeroUsize::MIN),
            thread_name_prefix: DEFAULT_THREAD_NAME_PREFIX.to_string(),
        }
    }
}

/// Fixed-size pool of worker threads.
///
/// Workers are spawned by [`WorkerPool::new`] and joined by
/// [`WorkerPool::shutdown`], which also runs on drop, so the threads are
/// released on every exit path of the owning scope.
pub struct WorkerPool {
    sender: Mutex<Option<Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    pending: Arc<AtomicUsize>,
    size: NonZeroUsize,
}

impl WorkerPool {
    pub fn new(config: &PoolConfig) -> Result<Self, PoolError> {
        let (sender, receiver) = crossbeam_channel::unbounded::<Job>();

        let mut workers = Vec::with_capacity(config.workers.get());
        for index in 0..config.workers.get() {
            let receiver = receiver.clone();
            let spawned = thread::Builder::new()
                .name(format!("{}-{index}", config.thread_name_prefix))
                .spawn(move || run_worker(receiver));
            match spawned {
                Ok(worker) => workers.push(worker),
                Err(err) => {
                    drop(sender);
                    join_workers(workers);
                    return Err(PoolError::Spawn(err));
                }
            }
        }

        info!(workers = config.workers.get(), "Worker pool started");

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
            pending: Arc::new(AtomicUsize::new(0)),
            size: config.workers,
        })
    }

    /// Start a pool of `workers` threads with the default naming.
    pub fn with_workers(workers: NonZeroUsize) -> Result<Self, PoolError> {
        Self::new(&PoolConfig {
            workers,
            ..PoolConfig::default()
        })
    }

    /// Queue `job` for execution and return a handle to its result.
    ///
    /// Never waits for the job itself; fails only after [`shutdown`](Self::shutdown).
    pub fn submit<T, E, F>(
        &self,
        id: impl Into<WorkId>,
        job: F,
    ) -> Result<WorkHandle<T>, PoolError>
    where
        T: Send + 'static,
        E: Into<Box<dyn std::error::Error + Send + Sync>> + 'static,
        F: FnOnce() -> Result<T, E> + Send + 'static,
    {
        let id = id.into();
        let (result_tx, result_rx) = crossbeam_channel::bounded(1);
        let pending = Arc::clone(&self.pending);
        let job_id = id.clone();

        let task: Job = Box::new(move || {
            let started_at = Instant::now();
            let outcome = match panic::catch_unwind(AssertUnwindSafe(job)) {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(err)) => {
                    let err: Box<dyn std::error::Error + Send + Sync> = err.into();
                    Err(WorkFailure::from_error(&*err))
                }
                Err(payload) => Err(WorkFailure::from_panic(payload)),
            };
            let elapsed = started_at.elapsed();
            histogram!(METRIC_WORK_ITEM_MS).record(elapsed.as_secs_f64() * 1000.0);

            if let Err(failure) = &outcome {
                debug!(work_id = %job_id, error = %failure, "Work item failed");
            }

            let remaining = pending.fetch_sub(1, Ordering::AcqRel) - 1;
            gauge!(METRIC_POOL_PENDING).set(remaining as f64);

            let result = WorkResult {
                id: job_id,
                outcome,
                worker: thread::current().name().map(str::to_string),
                elapsed,
            };
            // The caller may have dropped its handle; the result is then discarded.
            let _ = result_tx.send(result);
        });

        {
            let sender = mutex_lock(&self.sender, SOURCE, "submit");
            let Some(sender) = sender.as_ref() else {
                return Err(PoolError::Shutdown);
            };
            let queued = self.pending.fetch_add(1, Ordering::AcqRel) + 1;
            if sender.send(task).is_err() {
                self.pending.fetch_sub(1, Ordering::AcqRel);
                return Err(PoolError::Shutdown);
            }
            gauge!(METRIC_POOL_PENDING).set(queued as f64);
        }

        Ok(WorkHandle::new(id, result_rx))
    }

    /// Submit a [`WorkItem`], handing its payload to `job` on a worker.
    pub fn submit_item<P, T, E, F>(
        &self,
        item: WorkItem<P>,
        job: F,
    ) -> Result<WorkHandle<T>, PoolError>
    where
        P: Send + 'static,
        T: Send + 'static,
        E: Into<Box<dyn std::error::Error + Send + Sync>> + 'static,
        F: FnOnce(P) -> Result<T, E> + Send + 'static,
    {
        let WorkItem { id, payload } = item;
        self.submit(id, move || job(payload))
    }

    /// Run `job` over every item and wait for all of them, in item order.
    pub fn map<P, T, E, F, I>(&self, items: I, job: F) -> Result<Vec<WorkResult<T>>, PoolError>
    where
        I: IntoIterator<Item = WorkItem<P>>,
        P: Send + 'static,
        T: Send + 'static,
        E: Into<Box<dyn std::error::Error + Send + Sync>> + 'static,
        F: Fn(P) -> Result<T, E> + Send + Sync + 'static,
    {
        let job = Arc::new(job);
        let handles = items
            .into_iter()
            .map(|item| {
                let job = Arc::clone(&job);
                self.submit_item(item, move |payload| job(payload))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.await_all(handles))
    }

    /// Wait for every handle, returning results in the order the handles were given.
    pub fn await_all<T>(
        &self,
        handles: impl IntoIterator<Item = WorkHandle<T>>,
    ) -> Vec<WorkResult<T>> {
        await_all(handles)
    }

    /// Yield results as their work items finish.
    pub fn await_as_completed<T>(
        &self,
        handles: impl IntoIterator<Item = WorkHandle<T>>,
    ) -> AsCompleted<T> {
        await_as_completed(handles)
    }

    /// Stop accepting work, let queued and running jobs finish, and join the workers.
    ///
    /// Calling it again, including concurrently, returns only once the
    /// workers have been joined.
    pub fn shutdown(&self) {
        // Held across the join so concurrent callers wait for it to finish.
        let mut workers = mutex_lock(&self.workers, SOURCE, "shutdown");
        let Some(sender) = mutex_lock(&self.sender, SOURCE, "shutdown").take() else {
            return;
        };
        drop(sender);

        let handles = std::mem::take(&mut *workers);
        let joined = handles.len();
        join_workers(handles);

        info!(workers = joined, "Worker pool shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        mutex_lock(&self.sender, SOURCE, "is_shut_down").is_none()
    }

    /// Jobs accepted but not yet finished.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    pub fn size(&self) -> NonZeroUsize {
        self.size
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(receiver: Receiver<Job>) {
    // `recv` keeps returning queued jobs after the sender is dropped and fails
    // only once the queue is empty, so shutdown drains outstanding work.
    while let Ok(job) = receiver.recv() {
        job();
    }
}

fn join_workers(workers: Vec<JoinHandle<()>>) {
    for worker in workers {
        let name = worker.thread().name().map(str::to_string);
        if worker.join().is_err() {
            warn!(worker = ?name, "Worker thread exited with a panic");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;
    use std::time::Duration;

    use super::*;

    fn pool(workers: usize) -> WorkerPool {
        WorkerPool::with_workers(NonZeroUsize::new(workers).expect("non-zero"))
            .expect("pool should start")
    }

    #[test]
    fn default_config() {
        let config = PoolConfig::default();
        assert_eq!(config.workers.get(), 4);
        assert_eq!(config.thread_name_prefix, "memopool-worker");
    }

    #[test]
    fn submit_after_shutdown_is_rejected() {
        let pool = pool(2);
        pool.shutdown();
        assert!(pool.is_shut_down());

        let err = pool
            .submit("late", || Ok::<_, Infallible>(1))
            .expect_err("submission should be rejected");
        assert!(matches!(err, PoolError::Shutdown));
    }

    #[test]
    fn shutdown_drains_queued_work() {
        let pool = pool(1);
        let handles: Vec<_> = (0..5)
            .map(|i| {
                pool.submit(format!("job-{i}"), move || {
                    thread::sleep(Duration::from_millis(5));
                    Ok::<_, Infallible>(i)
                })
                .expect("submit")
            })
            .collect();

        pool.shutdown();
        pool.shutdown();

        let values: Vec<_> = pool
            .await_all(handles)
            .into_iter()
            .map(|result| result.outcome.expect("job succeeded"))
            .collect();
        assert_eq!(values, vec![0, 1, 2, 3, 4]);
        assert_eq!(pool.pending(), 0);
    }

    #[test]
    fn concurrent_shutdown_waits_for_running_work() {
        let pool = pool(1);
        let (started_tx, started_rx) = crossbeam_channel::bounded(1);
        let handle = pool
            .submit("slow", move || {
                let _ = started_tx.send(());
                thread::sleep(Duration::from_millis(300));
                Ok::<_, Infallible>("done")
            })
            .expect("submit");
        started_rx.recv().expect("job started");

        thread::scope(|scope| {
            scope.spawn(|| pool.shutdown());
            thread::sleep(Duration::from_millis(20));
            pool.shutdown();
            assert_eq!(pool.pending(), 0);
        });

        assert_eq!(handle.wait().outcome, Ok("done"));
    }

    #[test]
    fn results_name_their_worker() {
        let pool = WorkerPool::new(&PoolConfig {
            workers: NonZeroUsize::MIN,
            thread_name_prefix: "orders".to_string(),
        })
        .expect("pool should start");

        let result = pool
            .submit("named", || Ok::<_, Infallible>(()))
            .expect("submit")
            .wait();
        assert_eq!(result.worker.as_deref(), Some("orders-0"));
    }

    #[test]
    fn panicking_job_does_not_kill_worker() {
        let pool = pool(1);

        let panicked = pool
            .submit("boom", || -> Result<(), Infallible> { panic!("exploded") })
            .expect("submit")
            .wait();
        assert_eq!(
            panicked.outcome.expect_err("job should fail"),
            WorkFailure::Panicked {
                message: "exploded".to_string()
            }
        );

        let after = pool
            .submit("after", || Ok::<_, Infallible>(7))
            .expect("submit")
            .wait();
        assert_eq!(after.outcome, Ok(7));
    }

    #[test]
    fn map_preserves_item_order() {
        let pool = pool(3);
        let items = (0..6u64).map(|i| WorkItem::new(format!("item-{i}"), i));

        let results = pool
            .map(items, |n| {
                thread::sleep(Duration::from_millis(30 - n * 5));
                if n == 4 {
                    Err("four is rejected")
                } else {
                    Ok(n * n)
                }
            })
            .expect("map");

        let ids: Vec<_> = results.iter().map(|r| r.id.as_str().to_string()).collect();
        assert_eq!(
            ids,
            vec!["item-0", "item-1", "item-2", "item-3", "item-4", "item-5"]
        );
        assert_eq!(results[3].outcome, Ok(9));
        assert_eq!(
            results[4].outcome,
            Err(WorkFailure::Failed {
                messages: vec!["four is rejected".to_string()]
            })
        );
    }
}
