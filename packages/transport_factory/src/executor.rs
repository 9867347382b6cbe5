//! The executors that supply execution contexts to bosses and workers.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use derive_more::derive::Display;
use thiserror::Error;
use tracing::{debug, warn};

#[cfg(test)]
mod mocks;

#[cfg(test)]
pub(crate) use mocks::MockExecutor;

/// A unit of work submitted to an [`Executor`].
pub type Work = Box<dyn FnOnce() + Send + 'static>;

/// Shared handle to a caller-supplied [`Executor`].
///
/// The caller retains ownership of the executor. A factory only shuts it down as part of
/// releasing its external resources.
pub type ExecutorHandle = Arc<dyn Executor>;

/// How long each wait for an executor to terminate lasts before it is retried.
const TERMINATION_SLICE: Duration = Duration::from_millis(100);

/// Indicates that an executor refused a unit of work because it is shutting down.
#[derive(Debug, Eq, Error, PartialEq)]
#[error("the executor is shutting down and no longer accepts work")]
#[expect(clippy::exhaustive_structs, reason = "intentionally an empty struct")]
pub struct Rejected;

/// Identifies which of a factory's executors an event relates to.
#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum ExecutorRole {
    /// The executor that runs the boss, which handles outbound connection attempts.
    #[display("boss")]
    Boss,

    /// The executor that runs the workers, which drive I/O of registered endpoints.
    #[display("worker")]
    Worker,
}

/// A source of execution contexts.
///
/// A boss or worker submits exactly one long-running unit of work to its executor, so the
/// executor must be able to run at least as many units concurrently as there are workers (plus
/// one boss if the executor is shared). [`ThreadExecutor`][crate::ThreadExecutor] runs each unit
/// on its own thread and satisfies this.
pub trait Executor: Debug + Send + Sync + 'static {
    /// Submits a unit of work for execution.
    ///
    /// # Errors
    ///
    /// Returns [`Rejected`] if the executor has started shutting down.
    fn execute(&self, work: Work) -> Result<(), Rejected>;

    /// Starts an orderly shutdown. Work already accepted continues to run, new work is rejected.
    ///
    /// Calling this more than once has no additional effect.
    fn shutdown(&self);

    /// Whether the executor has shut down and all accepted work has completed.
    fn is_terminated(&self) -> bool;

    /// Blocks until the executor terminates or the timeout elapses.
    ///
    /// Returns `true` if the executor terminated.
    fn await_termination(&self, timeout: Duration) -> bool;

    /// Whether the calling thread is one of the threads this executor runs work on.
    fn is_executor_thread(&self) -> bool;
}

/// Shuts down every distinct executor and blocks until all of them have terminated.
///
/// If the calling thread belongs to one of the executors, waiting would never finish, so the
/// executors are only shut down.
pub(crate) fn terminate(executors: &[&ExecutorHandle]) {
    let mut distinct: Vec<&ExecutorHandle> = Vec::with_capacity(executors.len());

    for executor in executors {
        if !distinct.iter().any(|seen| Arc::ptr_eq(seen, executor)) {
            distinct.push(*executor);
        }
    }

    for executor in &distinct {
        executor.shutdown();
    }

    if distinct.iter().any(|executor| executor.is_executor_thread()) {
        warn!(
            "external resources released from an executor thread; not waiting for executors to terminate"
        );
        return;
    }

    for executor in distinct {
        while !executor.await_termination(TERMINATION_SLICE) {
            debug!(?executor, "waiting for executor to terminate");
        }
    }
}
