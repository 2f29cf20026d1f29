//! Work items, results and failure descriptors.

use std::any::Any;
use std::fmt;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::error::error_chain;

/// Caller-assigned identifier correlating submitted work with its result.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct WorkId(String);

impl WorkId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorkId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for WorkId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A unit of work: an identifier plus the arguments its job consumes.
#[derive(Debug, Clone)]
pub struct WorkItem<P> {
    pub id: WorkId,
    pub payload: P,
}

impl<P> WorkItem<P> {
    pub fn new(id: impl Into<WorkId>, payload: P) -> Self {
        Self {
            id: id.into(),
            payload,
        }
    }
}

/// Why a work item did not produce a value.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkFailure {
    /// The job returned an error; `messages` holds its source chain, outermost first.
    #[error("{}", .messages.join(": "))]
    Failed { messages: Vec<String> },
    /// The job panicked; the worker thread survived.
    #[error("job panicked: {message}")]
    Panicked { message: String },
    /// The job was dropped before it could run.
    #[error("job was abandoned before completion")]
    Abandoned,
}

impl WorkFailure {
    pub(crate) fn from_error(error: &(dyn std::error::Error + 'static)) -> Self {
        Self::Failed {
            messages: error_chain(error),
        }
    }

    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(message) = payload.downcast_ref::<&'static str>() {
            (*message).to_string()
        } else if let Some(message) = payload.downcast_ref::<String>() {
            message.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::Panicked { message }
    }
}

/// Outcome of one work item, produced once by the worker that ran it.
#[derive(Debug)]
pub struct WorkResult<T> {
    pub id: WorkId,
    pub outcome: Result<T, WorkFailure>,
    /// Name of the worker thread that ran the job.
    pub worker: Option<String>,
    /// Time spent executing the job, excluding queueing.
    pub elapsed: Duration,
}

impl<T> WorkResult<T> {
    pub(crate) fn abandoned(id: WorkId) -> Self {
        Self {
            id,
            outcome: Err(WorkFailure::Abandoned),
            worker: None,
            elapsed: Duration::ZERO,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}
