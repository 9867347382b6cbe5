use std::num::NonZero;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::debug;

use crate::{ConstraintLevel, ExecutorHandle, Provider, Worker};

/// The fixed set of workers of a factory and the round-robin cursor that assigns new endpoints
/// to them.
#[derive(Debug)]
pub(crate) struct WorkerSink {
    workers: Box<[Worker]>,
    count: NonZero<usize>,
    next: AtomicUsize,
}

impl WorkerSink {
    /// Creates the workers. None of them is started until an endpoint is assigned to it.
    pub(crate) fn new(
        count: NonZero<usize>,
        provider: &Provider,
        level: ConstraintLevel,
        executor: &ExecutorHandle,
    ) -> Self {
        let workers = (0..count.get())
            .map(|index| Worker::new(index, provider.clone(), level, Arc::clone(executor)))
            .collect();

        Self {
            workers,
            count,
            next: AtomicUsize::new(0),
        }
    }

    /// Returns the worker the next endpoint is assigned to.
    ///
    /// The `i`-th call (counting from 0) returns worker `i mod count`, also when called
    /// concurrently from multiple threads.
    pub(crate) fn next_worker(&self) -> &Worker {
        // Relaxed is sufficient, only the uniqueness of each ticket matters.
        let ticket = self.next.fetch_add(1, Ordering::Relaxed);
        let index = ticket % self.count;

        self.workers
            .get(index)
            .expect("index is reduced modulo the worker count so is always in bounds")
    }

    pub(crate) fn workers(&self) -> &[Worker] {
        &self.workers
    }

    pub(crate) fn count(&self) -> NonZero<usize> {
        self.count
    }

    pub(crate) fn shutdown(&self) {
        for worker in &self.workers {
            worker.shutdown();
        }

        debug!(workers = self.count.get(), "workers signalled to shut down");
    }
}
