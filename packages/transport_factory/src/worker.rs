use std::any::type_name;
use std::fmt::{self, Debug};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::trace;

use crate::endpoint::{EndpointCore, PendingRegistration};
use crate::{
    ConstraintLevel, ExecutorHandle, ExecutorRole, MultiplexerEntity, Provider, Result,
    SelectorLoop,
};

/// An execution context that owns one multiplexer and drives the I/O of the endpoints assigned
/// to it.
///
/// Each endpoint is permanently bound to the worker it was assigned to when it was created.
/// A worker is started on its executor the first time an endpoint is assigned to it.
///
/// Clones refer to the same worker.
#[derive(Clone)]
pub struct Worker {
    inner: Arc<WorkerInner>,
}

struct WorkerInner {
    index: usize,
    selector: SelectorLoop,
    assigned: AtomicUsize,

    // Shared with registration tasks running on the loop.
    registered: Arc<AtomicUsize>,
}

impl Worker {
    pub(crate) fn new(
        index: usize,
        provider: Provider,
        level: ConstraintLevel,
        executor: ExecutorHandle,
    ) -> Self {
        Self {
            inner: Arc::new(WorkerInner {
                index,
                selector: SelectorLoop::new(
                    provider,
                    level,
                    executor,
                    ExecutorRole::Worker,
                    format!("worker-{index}"),
                ),
                assigned: AtomicUsize::new(0),
                registered: Arc::new(AtomicUsize::new(0)),
            }),
        }
    }

    /// The position of this worker in its factory, starting from 0.
    #[must_use]
    pub fn index(&self) -> usize {
        self.inner.index
    }

    /// Whether the worker has been started and has not yet exited.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.selector.is_running()
    }

    /// Number of endpoints assigned to this worker so far.
    #[must_use]
    pub fn assigned_endpoints(&self) -> usize {
        self.inner.assigned.load(Ordering::Relaxed)
    }

    /// Number of endpoints this worker has registered with its multiplexer so far.
    #[must_use]
    pub fn registered_endpoints(&self) -> usize {
        self.inner.registered.load(Ordering::Relaxed)
    }

    /// Binds a new endpoint to this worker, starting the worker if this is the first one.
    pub(crate) fn assign(&self, endpoint: &EndpointCore) -> Result<()> {
        self.inner.selector.ensure_started()?;
        self.inner.assigned.fetch_add(1, Ordering::Relaxed);

        trace!(worker = self.inner.index, endpoint = %endpoint.id(), "endpoint assigned");

        Ok(())
    }

    /// Queues the registration of an endpoint with the multiplexer of this worker.
    pub(crate) fn register(&self, endpoint: Arc<EndpointCore>) -> Result<()> {
        let registered = Arc::clone(&self.inner.registered);
        let worker = self.inner.index;

        let pending = PendingRegistration::new(endpoint);

        self.inner.selector.submit(Box::new(move || {
            let endpoint = pending.endpoint();

            if endpoint.mark_registered() {
                registered.fetch_add(1, Ordering::Relaxed);
                trace!(worker, endpoint = %endpoint.id(), "endpoint registered");
            }

            pending.complete();
        }))
    }

    pub(crate) fn shutdown(&self) {
        self.inner.selector.shutdown();
    }
}

impl MultiplexerEntity for Worker {
    fn provider(&self) -> &Provider {
        self.inner.selector.provider()
    }

    fn constraint_level(&self) -> ConstraintLevel {
        self.inner.selector.constraint_level()
    }
}

impl Debug for Worker {
    #[cfg_attr(test, mutants::skip)] // Debug output is not part of the contract.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("index", &self.inner.index)
            .field("selector", &self.inner.selector)
            .field("assigned", &self.assigned_endpoints())
            .field("registered", &self.registered_endpoints())
            .finish_non_exhaustive()
    }
}
