use std::collections::HashSet;
use std::convert::Infallible;
use std::num::NonZeroUsize;
use std::thread;
use std::time::Duration;

use memopool::pool::{PoolConfig, PoolError, WorkFailure, WorkItem, WorkerPool};

fn pool(workers: usize) -> WorkerPool {
    WorkerPool::with_workers(NonZeroUsize::new(workers).expect("non-zero workers"))
        .expect("pool starts")
}

fn sleepy(label: &'static str, millis: u64) -> impl FnOnce() -> Result<String, Infallible> {
    move || {
        thread::sleep(Duration::from_millis(millis));
        Ok(label.to_string())
    }
}

#[test]
fn await_all_keeps_submission_order() {
    let pool = pool(3);
    let handles = vec![
        pool.submit("A", sleepy("A", 120)).expect("submit A"),
        pool.submit("B", sleepy("B", 60)).expect("submit B"),
        pool.submit("C", sleepy("C", 5)).expect("submit C"),
    ];

    let results = pool.await_all(handles);
    let ids: Vec<_> = results.iter().map(|r| r.id.as_str().to_string()).collect();
    let values: Vec<_> = results
        .into_iter()
        .map(|r| r.outcome.expect("success"))
        .collect();

    assert_eq!(ids, ["A", "B", "C"]);
    assert_eq!(values, ["A", "B", "C"]);
}

#[test]
fn as_completed_yields_every_result_once() {
    let pool = pool(3);
    let handles = vec![
        pool.submit("A", sleepy("A", 150)).expect("submit A"),
        pool.submit("B", sleepy("B", 80)).expect("submit B"),
        pool.submit("C", sleepy("C", 5)).expect("submit C"),
    ];

    let completed = pool.await_as_completed(handles);
    assert_eq!(completed.len(), 3);
    let ids: Vec<_> = completed.map(|r| r.id.as_str().to_string()).collect();

    assert_eq!(ids.len(), 3);
    assert_eq!(ids[0], "C");
    let unique: HashSet<_> = ids.iter().cloned().collect();
    assert_eq!(unique, HashSet::from(["A".to_string(), "B".to_string(), "C".to_string()]));
}

#[test]
fn failing_item_does_not_affect_siblings() {
    let pool = pool(2);
    let items = (1..=5).map(|n| WorkItem::new(format!("item-{n}"), n));

    let results = pool
        .map(items, |n: u32| {
            if n == 3 {
                Err(std::io::Error::other("item three is cursed"))
            } else {
                Ok(n * 2)
            }
        })
        .expect("all submitted");

    assert_eq!(results.len(), 5);
    for result in &results {
        if result.id.as_str() == "item-3" {
            assert_eq!(
                result.outcome,
                Err(WorkFailure::Failed {
                    messages: vec!["item three is cursed".to_string()]
                })
            );
        } else {
            assert!(result.is_success(), "{} should succeed", result.id);
        }
    }
}

#[test]
fn twenty_items_on_four_workers_all_complete() {
    let pool = WorkerPool::new(&PoolConfig::default()).expect("pool starts");
    assert_eq!(pool.size().get(), 4);

    let handles = (0..20u64)
        .map(|n| {
            pool.submit(format!("job-{n:02}"), move || {
                thread::sleep(Duration::from_millis(n % 5));
                Ok::<_, Infallible>(n)
            })
        })
        .collect::<Result<Vec<_>, _>>()
        .expect("all submitted");

    let results = pool.await_all(handles);
    assert_eq!(results.len(), 20);

    let ids: HashSet<_> = results.iter().map(|r| r.id.as_str().to_string()).collect();
    assert_eq!(ids.len(), 20);
    for (n, result) in results.into_iter().enumerate() {
        assert_eq!(result.id.as_str(), format!("job-{n:02}"));
        assert_eq!(result.outcome, Ok(n as u64));
        let worker = result.worker.expect("worker recorded");
        assert!(worker.starts_with("memopool-worker-"), "{worker}");
    }
    assert_eq!(pool.pending(), 0);
}

#[test]
fn shutdown_is_idempotent_and_rejects_new_work() {
    let pool = pool(2);
    let handle = pool.submit("last", sleepy("last", 20)).expect("submit");

    pool.shutdown();
    pool.shutdown();

    assert!(pool.is_shut_down());
    assert_eq!(handle.wait().outcome, Ok("last".to_string()));
    assert!(matches!(
        pool.submit("late", sleepy("late", 0)),
        Err(PoolError::Shutdown)
    ));
}
