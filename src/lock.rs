use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use tracing::warn;

/// Acquire `lock`, recovering the guard if a previous holder panicked.
///
/// Every structure guarded this way is only mutated by crate code that cannot
/// panic midway through an update, so the recovered state is still coherent.
pub(crate) fn mutex_lock<'a, T>(
    lock: &'a Mutex<T>,
    target: &'static str,
    op: &'static str,
) -> MutexGuard<'a, T> {
    match lock.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!(
                op,
                target_module = target,
                lock_kind = "mutex.lock",
                result = "poisoned_recovered",
                hint = "a thread panicked while holding this lock",
                "Recovered from poisoned lock"
            );
            poisoned.into_inner()
        }
    }
}

/// Block on `condvar` until `done` returns true, with the same poison policy
/// as [`mutex_lock`].
pub(crate) fn condvar_wait_until<'a, T>(
    condvar: &Condvar,
    guard: MutexGuard<'a, T>,
    target: &'static str,
    op: &'static str,
    mut done: impl FnMut(&mut T) -> bool,
) -> MutexGuard<'a, T> {
    let mut guard = guard;
    while !done(&mut guard) {
        guard = match condvar.wait(guard) {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!(
                    op,
                    target_module = target,
                    lock_kind = "condvar.wait",
                    result = "poisoned_recovered",
                    hint = "a thread panicked while holding this lock",
                    "Recovered from poisoned lock"
                );
                PoisonError::into_inner(poisoned)
            }
        };
    }
    guard
}
