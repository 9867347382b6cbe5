//! An executor that runs every unit of work on a dedicated thread.

use std::any::{Any, type_name};
use std::fmt::{self, Debug};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use foldhash::{HashSet, HashSetExt};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, error};

use crate::{Executor, Rejected, Work};

/// Runs each unit of work on a new named thread.
///
/// This matches the way bosses and workers use executors: each submits one long-running unit
/// of work that lives until the factory releases its external resources. Threads are named
/// `{name_prefix}-{index}` where the index counts submitted units.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use std::sync::mpsc;
/// use std::time::Duration;
///
/// use transport_factory::{Executor, ThreadExecutor};
///
/// let executor = Arc::new(ThreadExecutor::new("example"));
///
/// let (tx, rx) = mpsc::channel();
/// executor
///     .execute(Box::new(move || tx.send(42).unwrap()))
///     .unwrap();
/// assert_eq!(rx.recv().unwrap(), 42);
///
/// executor.shutdown();
/// assert!(executor.await_termination(Duration::from_secs(10)));
/// ```
pub struct ThreadExecutor {
    inner: Arc<Inner>,
}

struct Inner {
    name_prefix: String,
    next_index: AtomicUsize,
    state: Mutex<State>,
    // Notified whenever the executor may have become terminated.
    terminated: Condvar,
}

struct State {
    shutdown: bool,
    active: usize,
    threads: HashSet<ThreadId>,
}

impl State {
    fn is_terminated(&self) -> bool {
        self.shutdown && self.active == 0
    }
}

impl Inner {
    fn reserve_unit(&self) -> Result<(), Rejected> {
        let mut state = self.state.lock();

        if state.shutdown {
            return Err(Rejected);
        }

        state.active = state
            .active
            .checked_add(1)
            .expect("unrealistic to have more than usize::MAX active threads");

        Ok(())
    }

    fn release_unit(&self) {
        let mut state = self.state.lock();
        state.active = state.active.saturating_sub(1);

        if state.is_terminated() {
            self.terminated.notify_all();
        }
    }
}

impl ThreadExecutor {
    /// Creates an executor whose threads are named with the given prefix.
    #[must_use]
    pub fn new(name_prefix: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                name_prefix: name_prefix.into(),
                next_index: AtomicUsize::new(0),
                state: Mutex::new(State {
                    shutdown: false,
                    active: 0,
                    threads: HashSet::new(),
                }),
                terminated: Condvar::new(),
            }),
        }
    }

    /// Number of units of work that have been accepted and not yet completed.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.inner.state.lock().active
    }
}

impl Default for ThreadExecutor {
    fn default() -> Self {
        Self::new("transport")
    }
}

impl Executor for ThreadExecutor {
    fn execute(&self, work: Work) -> Result<(), Rejected> {
        self.inner.reserve_unit()?;

        // Relaxed is sufficient, the index is only used for naming.
        let index = self.inner.next_index.fetch_add(1, Ordering::Relaxed);
        let name = format!("{}-{index}", self.inner.name_prefix);
        let inner = Arc::clone(&self.inner);

        let spawned = thread::Builder::new().name(name).spawn(move || {
            let _unit = ActiveUnit::enter(inner);

            debug!("executor thread started");

            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(work)) {
                error!(
                    panic_message = %format_panic_payload(payload.as_ref()),
                    "unit of work panicked"
                );
            }

            debug!("executor thread exiting");
        });

        if let Err(e) = spawned {
            // The unit never started, so it must not hold up termination.
            self.inner.release_unit();
            panic!(
                "failed to spawn executor thread: thread spawning failure is not supported: {e}"
            );
        }

        Ok(())
    }

    fn shutdown(&self) {
        let mut state = self.inner.state.lock();
        state.shutdown = true;

        if state.is_terminated() {
            self.inner.terminated.notify_all();
        }
    }

    fn is_terminated(&self) -> bool {
        self.inner.state.lock().is_terminated()
    }

    fn await_termination(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut state = self.inner.state.lock();

        while !state.is_terminated() {
            match deadline {
                Some(deadline) => {
                    if self
                        .inner
                        .terminated
                        .wait_until(&mut state, deadline)
                        .timed_out()
                    {
                        return state.is_terminated();
                    }
                }
                None => self.inner.terminated.wait(&mut state),
            }
        }

        true
    }

    fn is_executor_thread(&self) -> bool {
        self.inner
            .state
            .lock()
            .threads
            .contains(&thread::current().id())
    }
}

impl Debug for ThreadExecutor {
    #[cfg_attr(test, mutants::skip)] // Debug output is not part of the contract.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();

        f.debug_struct(type_name::<Self>())
            .field("name_prefix", &self.inner.name_prefix)
            .field("shutdown", &state.shutdown)
            .field("active", &state.active)
            .finish_non_exhaustive()
    }
}

/// Marks the current thread as an executor thread for as long as it is alive.
struct ActiveUnit {
    inner: Arc<Inner>,
}

impl ActiveUnit {
    fn enter(inner: Arc<Inner>) -> Self {
        inner.state.lock().threads.insert(thread::current().id());
        Self { inner }
    }
}

impl Drop for ActiveUnit {
    fn drop(&mut self) {
        self.inner
            .state
            .lock()
            .threads
            .remove(&thread::current().id());

        self.inner.release_unit();
    }
}

fn format_panic_payload(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}
