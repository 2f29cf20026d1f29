//! Caller-side handles for submitted work.

use crossbeam_channel::{Receiver, Select};

use super::work::{WorkId, WorkResult};

/// Reference to one submitted work item, redeemed exactly once for its result.
#[derive(Debug)]
pub struct WorkHandle<T> {
    id: WorkId,
    receiver: Receiver<WorkResult<T>>,
}

impl<T> WorkHandle<T> {
    pub(crate) fn new(id: WorkId, receiver: Receiver<WorkResult<T>>) -> Self {
        Self { id, receiver }
    }

    pub fn id(&self) -> &WorkId {
        &self.id
    }

    /// Block until the work item finishes.
    ///
    /// A job dropped without running (its worker died or the queue was torn
    /// down) resolves to [`WorkFailure::Abandoned`](super::WorkFailure::Abandoned).
    pub fn wait(self) -> WorkResult<T> {
        match self.receiver.recv() {
            Ok(result) => result,
            Err(_) => WorkResult::abandoned(self.id),
        }
    }
}

/// Results of a set of handles, yielded in completion order.
///
/// Each handle's result is produced exactly once; the iterator ends when every
/// handle has been redeemed.
#[derive(Debug)]
pub struct AsCompleted<T> {
    pending: Vec<WorkHandle<T>>,
}

impl<T> AsCompleted<T> {
    pub(crate) fn new(handles: impl IntoIterator<Item = WorkHandle<T>>) -> Self {
        Self {
            pending: handles.into_iter().collect(),
        }
    }
}

impl<T> Iterator for AsCompleted<T> {
    type Item = WorkResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pending.is_empty() {
            return None;
        }

        let ready = {
            let mut select = Select::new();
            for handle in &self.pending {
                select.recv(&handle.receiver);
            }
            select.ready()
        };

        Some(self.pending.swap_remove(ready).wait())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.pending.len(), Some(self.pending.len()))
    }
}

impl<T> ExactSizeIterator for AsCompleted<T> {}

/// Wait for every handle, returning results in the order the handles were given.
pub fn await_all<T>(handles: impl IntoIterator<Item = WorkHandle<T>>) -> Vec<WorkResult<T>> {
    handles.into_iter().map(WorkHandle::wait).collect()
}

/// Yield results as their work items finish, regardless of submission order.
pub fn await_as_completed<T>(handles: impl IntoIterator<Item = WorkHandle<T>>) -> AsCompleted<T> {
    AsCompleted::new(handles)
}
