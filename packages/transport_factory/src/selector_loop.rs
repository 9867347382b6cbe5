//! The loop that owns a multiplexer and runs on an executor, shared by bosses and workers.

use std::any::type_name;
use std::collections::VecDeque;
use std::fmt::{self, Debug};
use std::mem;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::{
    ConstraintLevel, Error, ExecutorHandle, ExecutorRole, Multiplexer, Provider, Rejected,
    Result, Work,
};

/// How long the loop waits on its multiplexer before checking for tasks and shutdown again.
const WAIT_TIMEOUT: Duration = Duration::from_millis(500);

/// How long the loop pauses after the multiplexer reports an error.
const ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// A lazily started loop that owns one multiplexer and processes tasks submitted to it.
///
/// The loop is started on the first call to [`ensure_started()`][Self::ensure_started] or
/// [`submit()`][Self::submit]. Nothing is opened and nothing is submitted to the executor
/// before that.
pub(crate) struct SelectorLoop {
    shared: Arc<Shared>,
    executor: ExecutorHandle,
    role: ExecutorRole,
    label: String,

    // Set once the loop has been submitted to the executor. Guarded by a lock so that
    // concurrent first users open exactly one multiplexer.
    multiplexer: Mutex<Option<Arc<dyn Multiplexer>>>,
}

struct Shared {
    provider: Provider,
    level: ConstraintLevel,

    started: AtomicBool,
    shutdown: AtomicBool,
    exited: AtomicBool,

    tasks: Mutex<VecDeque<Work>>,

    // At constraint levels above 0, held while queueing a task and waking the multiplexer, and
    // while the loop runs queued tasks. Never held across a wait on the multiplexer.
    registration: Mutex<()>,
}

impl SelectorLoop {
    pub(crate) fn new(
        provider: Provider,
        level: ConstraintLevel,
        executor: ExecutorHandle,
        role: ExecutorRole,
        label: String,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                provider,
                level,
                started: AtomicBool::new(false),
                shutdown: AtomicBool::new(false),
                exited: AtomicBool::new(false),
                tasks: Mutex::new(VecDeque::new()),
                registration: Mutex::new(()),
            }),
            executor,
            role,
            label,
            multiplexer: Mutex::new(None),
        }
    }

    pub(crate) fn provider(&self) -> &Provider {
        &self.shared.provider
    }

    pub(crate) fn constraint_level(&self) -> ConstraintLevel {
        self.shared.level
    }

    /// Whether the loop has been started and has not yet exited.
    pub(crate) fn is_running(&self) -> bool {
        self.shared.started.load(Ordering::Acquire) && !self.shared.exited.load(Ordering::Acquire)
    }

    /// Opens the multiplexer and submits the loop to the executor, unless already done.
    ///
    /// A failed start leaves the loop unstarted, so a later call tries again. Once the loop has
    /// been signalled to shut down this fails with [`Error::Released`], even if it was started.
    pub(crate) fn ensure_started(&self) -> Result<()> {
        if self.shared.shutdown.load(Ordering::Acquire) {
            return Err(Error::Released);
        }

        // Acquire synchronizes with the Release below, so a started loop is fully set up.
        if self.shared.started.load(Ordering::Acquire) {
            return Ok(());
        }

        let mut slot = self.multiplexer.lock();

        if self.shared.shutdown.load(Ordering::Acquire) {
            return Err(Error::Released);
        }

        if self.shared.started.load(Ordering::Acquire) {
            return Ok(());
        }

        let multiplexer: Arc<dyn Multiplexer> = match slot.as_ref() {
            // A previous start opened the multiplexer but the executor rejected the loop.
            Some(existing) => Arc::clone(existing),
            None => {
                let opened = self.shared.provider.open().map_err(|source| {
                    Error::Multiplexer {
                        provider: self.shared.provider.identity().clone(),
                        source,
                    }
                })?;

                let opened: Arc<dyn Multiplexer> = Arc::from(opened);
                *slot = Some(Arc::clone(&opened));
                opened
            }
        };

        let shared = Arc::clone(&self.shared);
        let label = self.label.clone();

        self.executor
            .execute(Box::new(move || run(&shared, multiplexer.as_ref(), &label)))
            .map_err(|Rejected| Error::RejectedWork {
                executor: self.role,
            })?;

        self.shared.started.store(true, Ordering::Release);

        debug!(
            label = %self.label,
            provider = %self.shared.provider.identity(),
            level = %self.shared.level,
            "selector loop submitted to executor"
        );

        Ok(())
    }

    /// Queues a task for the loop and wakes the loop so it runs the task promptly.
    ///
    /// Starts the loop if it is not running yet.
    pub(crate) fn submit(&self, task: Work) -> Result<()> {
        self.ensure_started()?;

        if self.shared.shutdown.load(Ordering::Acquire) {
            return Err(Error::Released);
        }

        let multiplexer = self.multiplexer.lock().clone();

        let _registration = self
            .shared
            .level
            .requires_serialized_registration()
            .then(|| self.shared.registration.lock());

        self.shared.tasks.lock().push_back(task);

        if let Some(multiplexer) = multiplexer {
            wake(multiplexer.as_ref(), &self.label);
        }

        Ok(())
    }

    /// Signals the loop to exit. Queued tasks that have not run yet are dropped without running.
    ///
    /// Calling this more than once has no additional effect.
    pub(crate) fn shutdown(&self) {
        // Release ensures queued tasks are visible to the loop before it observes the flag.
        if self.shared.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }

        if let Some(multiplexer) = self.multiplexer.lock().as_ref() {
            wake(multiplexer.as_ref(), &self.label);
        }

        debug!(label = %self.label, "selector loop signalled to shut down");
    }
}

impl Debug for SelectorLoop {
    #[cfg_attr(test, mutants::skip)] // Debug output is not part of the contract.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("label", &self.label)
            .field("provider", &self.shared.provider)
            .field("level", &self.shared.level)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl Shared {
    fn run_queued_tasks(&self) -> usize {
        let _registration = self
            .level
            .requires_serialized_registration()
            .then(|| self.registration.lock());

        let tasks = mem::take(&mut *self.tasks.lock());
        let count = tasks.len();

        for task in tasks {
            task();
        }

        count
    }
}

#[cfg_attr(test, mutants::skip)] // Mutations cause the loop to never exit.
fn run(shared: &Shared, multiplexer: &dyn Multiplexer, label: &str) {
    debug!(label, "selector loop started");

    loop {
        let executed = shared.run_queued_tasks();

        if executed > 0 {
            trace!(label, executed, "ran queued tasks");
        }

        // Acquire synchronizes with the Release in shutdown().
        if shared.shutdown.load(Ordering::Acquire) {
            break;
        }

        match multiplexer.wait(Some(WAIT_TIMEOUT)) {
            Ok(ready) => {
                if ready > 0 {
                    trace!(label, ready, "multiplexer reported readiness");
                }
            }
            Err(e) => {
                warn!(label, error = %e, "waiting on multiplexer failed");
                thread::sleep(ERROR_BACKOFF);
            }
        }
    }

    let abandoned = mem::take(&mut *shared.tasks.lock());
    let dropped = abandoned.len();
    drop(abandoned);

    shared.exited.store(true, Ordering::Release);

    debug!(label, dropped, "selector loop exiting");
}

fn wake(multiplexer: &dyn Multiplexer, label: &str) {
    if let Err(e) = multiplexer.wake() {
        warn!(label, error = %e, "failed to wake multiplexer");
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;

    use super::*;
    use crate::fake::FakeProvider;
    use crate::{Executor, MockExecutor, ThreadExecutor};

    fn selector_loop(
        provider: &FakeProvider,
        level: u32,
        executor: ExecutorHandle,
    ) -> SelectorLoop {
        SelectorLoop::new(
            Provider::new(provider.clone()),
            ConstraintLevel::new(level),
            executor,
            ExecutorRole::Worker,
            "worker-0".to_string(),
        )
    }

    #[test]
    fn nothing_happens_before_first_use() {
        let fake = FakeProvider::new("fake");
        let mut executor = MockExecutor::new();
        executor.expect_execute().never();

        let selector = selector_loop(&fake, 0, Arc::new(executor));

        assert!(!selector.is_running());
        assert_eq!(fake.open_count(), 0);
    }

    #[test]
    fn starts_once() {
        let fake = FakeProvider::new("fake");
        let mut executor = MockExecutor::new();
        executor.expect_execute().times(1).returning(|_| Ok(()));

        let selector = selector_loop(&fake, 0, Arc::new(executor));

        selector.ensure_started().unwrap();
        selector.ensure_started().unwrap();

        assert_eq!(fake.open_count(), 1);
    }

    #[test]
    fn open_failure_is_reported() {
        let fake = FakeProvider::failing("epoll");
        let mut executor = MockExecutor::new();
        executor.expect_execute().never();

        let selector = selector_loop(&fake, 0, Arc::new(executor));

        let result = selector.ensure_started();
        assert!(matches!(
            result,
            Err(Error::Multiplexer { ref provider, .. }) if provider.name() == "epoll"
        ));
    }

    #[test]
    fn rejection_is_reported_and_retried_without_reopening() {
        let fake = FakeProvider::new("fake");
        let mut executor = MockExecutor::new();
        let mut seq = mockall::Sequence::new();
        executor
            .expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(Rejected));
        executor
            .expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let selector = selector_loop(&fake, 0, Arc::new(executor));

        assert!(matches!(
            selector.ensure_started(),
            Err(Error::RejectedWork {
                executor: ExecutorRole::Worker
            })
        ));
        assert!(!selector.is_running());

        selector.ensure_started().unwrap();
        assert_eq!(fake.open_count(), 1);
    }

    #[test]
    fn submit_after_shutdown_is_released() {
        let fake = FakeProvider::new("fake");
        let mut executor = MockExecutor::new();
        executor.expect_execute().returning(|_| Ok(()));

        let selector = selector_loop(&fake, 0, Arc::new(executor));
        selector.ensure_started().unwrap();
        selector.shutdown();

        assert!(matches!(
            selector.submit(Box::new(|| {})),
            Err(Error::Released)
        ));
    }

    #[test]
    fn started_loop_refuses_to_start_after_shutdown() {
        let fake = FakeProvider::new("fake");
        let mut executor = MockExecutor::new();
        executor.expect_execute().times(1).returning(|_| Ok(()));

        let selector = selector_loop(&fake, 0, Arc::new(executor));
        selector.ensure_started().unwrap();
        selector.shutdown();

        assert!(matches!(selector.ensure_started(), Err(Error::Released)));
    }

    #[test]
    fn unstarted_loop_never_starts_after_shutdown() {
        let fake = FakeProvider::new("fake");
        let mut executor = MockExecutor::new();
        executor.expect_execute().never();

        let selector = selector_loop(&fake, 0, Arc::new(executor));
        selector.shutdown();

        assert!(matches!(selector.ensure_started(), Err(Error::Released)));
        assert_eq!(fake.open_count(), 0);
    }

    #[test]
    fn submit_wakes_multiplexer() {
        let fake = FakeProvider::new("fake");
        let mut executor = MockExecutor::new();
        executor.expect_execute().returning(|_| Ok(()));

        let selector = selector_loop(&fake, 1, Arc::new(executor));
        selector.submit(Box::new(|| {})).unwrap();
        selector.submit(Box::new(|| {})).unwrap();

        assert_eq!(fake.wake_count(), 2);
    }

    #[test]
    #[cfg_attr(miri, ignore)] // Spawns threads, slow under Miri.
    fn runs_submitted_tasks_in_order() {
        for level in [0, 1] {
            let fake = FakeProvider::new("fake");
            let executor = Arc::new(ThreadExecutor::new("loop-test"));
            let handle: ExecutorHandle = Arc::<ThreadExecutor>::clone(&executor);
            let selector = selector_loop(&fake, level, handle);

            let (tx, rx) = mpsc::channel();

            for i in 0..3 {
                let tx = tx.clone();
                selector
                    .submit(Box::new(move || tx.send(i).unwrap()))
                    .unwrap();
            }

            let received: Vec<_> = (0..3).map(|_| rx.recv().unwrap()).collect();
            assert_eq!(received, [0, 1, 2]);

            selector.shutdown();
            executor.shutdown();
            assert!(executor.await_termination(Duration::from_secs(30)));
            assert!(!selector.is_running());
        }
    }

    #[test]
    #[cfg_attr(miri, ignore)] // Spawns threads, slow under Miri.
    fn tasks_run_on_loop_thread() {
        let fake = FakeProvider::new("fake");
        let executor = Arc::new(ThreadExecutor::new("loop-thread"));
        let handle: ExecutorHandle = Arc::<ThreadExecutor>::clone(&executor);
        let selector = selector_loop(&fake, 0, handle);

        let runs = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::channel();

        selector
            .submit(Box::new({
                let runs = Arc::clone(&runs);
                move || {
                    runs.fetch_add(1, Ordering::Relaxed);
                    tx.send(thread::current().name().map(str::to_owned))
                        .unwrap();
                }
            }))
            .unwrap();

        assert_eq!(rx.recv().unwrap().as_deref(), Some("loop-thread-0"));
        assert_eq!(runs.load(Ordering::Relaxed), 1);

        selector.shutdown();
        executor.shutdown();
        assert!(executor.await_termination(Duration::from_secs(30)));
    }
}
