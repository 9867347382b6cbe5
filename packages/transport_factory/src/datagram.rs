//! The connectionless factory, which has workers but no boss.

use std::any::type_name;
use std::fmt::{self, Debug};
use std::num::NonZero;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tracing::{debug, trace};

use crate::config::{FactoryConfig, ResolvedConfig};
use crate::endpoint::EndpointCore;
use crate::executor::terminate;
use crate::sink::WorkerSink;
use crate::{
    ConstraintLevel, ConstraintSpec, DatagramEndpoint, EndpointId, Error, ExecutorHandle,
    MultiplexerEntity, Provider, Result, SystemPlatform, Worker,
};

/// Creates connectionless endpoints and assigns them to workers.
///
/// Unlike [`ClientSocketFactory`][crate::ClientSocketFactory] there is no connection step, so
/// there is no boss: each new endpoint is assigned to the next worker in round-robin order and
/// immediately queued for registration with that worker.
///
/// Clones refer to the same factory.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
///
/// use transport_factory::{DatagramFactory, ExecutorHandle, MultiplexerEntity, ThreadExecutor};
///
/// let workers: ExecutorHandle = Arc::new(ThreadExecutor::new("datagram"));
///
/// let factory = DatagramFactory::builder()
///     .worker_executor(workers)
///     .worker_count(1)
///     .build()
///     .unwrap();
///
/// let endpoint = factory.new_channel(()).unwrap();
/// assert!(endpoint.shares_context_with(&factory));
///
/// factory.release_external_resources();
/// ```
#[derive(Clone)]
pub struct DatagramFactory {
    inner: Arc<DatagramInner>,
}

struct DatagramInner {
    provider: Provider,
    level: ConstraintLevel,
    sink: WorkerSink,
    worker_executor: ExecutorHandle,
    next_endpoint_id: AtomicU64,
    released: AtomicBool,
}

impl DatagramFactory {
    /// Creates a factory with platform defaults: the default provider, twice as many workers as
    /// there are logical processors and an auto-detected constraint level.
    #[must_use]
    pub fn new(worker_executor: ExecutorHandle) -> Self {
        let platform = SystemPlatform::current();

        Self::from_parts(
            worker_executor,
            ResolvedConfig::defaults(platform, platform.default_worker_count()),
        )
    }

    /// Creates a factory with platform defaults and the given number of workers.
    #[must_use]
    pub fn with_worker_count(
        worker_executor: ExecutorHandle,
        worker_count: NonZero<usize>,
    ) -> Self {
        Self::from_parts(
            worker_executor,
            ResolvedConfig::defaults(SystemPlatform::current(), worker_count),
        )
    }

    /// Starts building a factory.
    #[must_use]
    pub fn builder() -> DatagramFactoryBuilder {
        DatagramFactoryBuilder::new()
    }

    fn from_parts(worker_executor: ExecutorHandle, config: ResolvedConfig) -> Self {
        let ResolvedConfig {
            worker_count,
            provider,
            level,
        } = config;

        let sink = WorkerSink::new(worker_count, &provider, level, &worker_executor);

        debug!(
            workers = worker_count.get(),
            provider = %provider.identity(),
            %level,
            "datagram factory built"
        );

        Self {
            inner: Arc::new(DatagramInner {
                provider,
                level,
                sink,
                worker_executor,
                next_endpoint_id: AtomicU64::new(0),
                released: AtomicBool::new(false),
            }),
        }
    }

    /// Creates a new endpoint carrying `pipeline`, assigns it to the next worker and queues its
    /// registration with that worker.
    ///
    /// The worker is started on the worker executor if this is the first endpoint assigned to
    /// it. This never waits for network activity.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Released`] if the factory has released its external resources,
    /// [`Error::RejectedWork`] if the worker executor refused to start the worker and
    /// [`Error::Multiplexer`] if the worker could not open its multiplexer.
    pub fn new_channel<P>(&self, pipeline: P) -> Result<DatagramEndpoint<P>> {
        if self.is_released() {
            return Err(Error::Released);
        }

        let worker = self.inner.sink.next_worker();
        let id = EndpointId::new(self.inner.next_endpoint_id.fetch_add(1, Ordering::Relaxed));
        let core = Arc::new(EndpointCore::new(id));

        worker.assign(&core)?;
        worker.register(Arc::clone(&core))?;

        trace!(endpoint = %id, worker = worker.index(), "datagram endpoint created");

        Ok(DatagramEndpoint::new(core, pipeline, worker.clone()))
    }

    /// Stops the workers, then shuts down the worker executor and waits for it to terminate.
    ///
    /// Only the first call has any effect. Endpoints that are still open are not closed. If
    /// called from a thread of the worker executor, the executor is shut down but not waited
    /// for.
    ///
    /// The wait has no time limit. If the worker executor also runs loops of another factory
    /// that has not released its external resources, this call blocks until that factory
    /// releases them too.
    pub fn release_external_resources(&self) {
        if self.inner.released.swap(true, Ordering::AcqRel) {
            return;
        }

        debug!("releasing datagram factory resources");

        self.inner.sink.shutdown();

        terminate(&[&self.inner.worker_executor]);

        debug!("datagram factory resources released");
    }

    /// Whether [`release_external_resources()`][Self::release_external_resources] has been
    /// called.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.inner.released.load(Ordering::Acquire)
    }

    /// The number of workers of the factory.
    #[must_use]
    pub fn worker_count(&self) -> NonZero<usize> {
        self.inner.sink.count()
    }

    /// The workers of the factory, in assignment order.
    #[must_use]
    pub fn workers(&self) -> &[Worker] {
        self.inner.sink.workers()
    }
}

impl MultiplexerEntity for DatagramFactory {
    fn provider(&self) -> &Provider {
        &self.inner.provider
    }

    fn constraint_level(&self) -> ConstraintLevel {
        self.inner.level
    }
}

impl Debug for DatagramFactory {
    #[cfg_attr(test, mutants::skip)] // Debug output is not part of the contract.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("provider", &self.inner.provider)
            .field("level", &self.inner.level)
            .field("workers", &self.worker_count())
            .field("released", &self.is_released())
            .finish_non_exhaustive()
    }
}

/// Builds a [`DatagramFactory`].
///
/// The worker executor is mandatory. Everything else defaults to what the platform suggests.
/// The builder can be reused: every call to [`build()`][Self::build] creates a new independent
/// factory.
#[derive(Clone, Debug, Default)]
pub struct DatagramFactoryBuilder {
    worker_executor: Option<ExecutorHandle>,
    config: FactoryConfig,
}

impl DatagramFactoryBuilder {
    fn new() -> Self {
        Self::default()
    }

    /// Sets the executor that runs the workers. Mandatory.
    #[must_use]
    pub fn worker_executor(mut self, executor: ExecutorHandle) -> Self {
        self.worker_executor = Some(executor);
        self
    }

    /// Sets the number of workers. Defaults to twice the number of logical processors.
    ///
    /// Zero is rejected by [`build()`][Self::build].
    #[must_use]
    pub fn worker_count(mut self, count: usize) -> Self {
        self.config.worker_count = Some(count);
        self
    }

    /// Sets the multiplexer provider. Defaults to the provider of the platform.
    #[must_use]
    pub fn provider(mut self, provider: Provider) -> Self {
        self.config.provider = Some(provider);
        self
    }

    /// Sets how the constraint level is determined. Defaults to
    /// [`ConstraintSpec::AutoDetect`].
    #[must_use]
    pub fn constraint_spec(mut self, spec: ConstraintSpec) -> Self {
        self.config.constraint_spec = spec;
        self
    }

    /// Sets the platform that supplies defaults. Defaults to [`SystemPlatform::current()`].
    #[must_use]
    pub fn platform(mut self, platform: SystemPlatform) -> Self {
        self.config.platform = Some(platform);
        self
    }

    /// Builds a new factory from the current configuration.
    ///
    /// No threads are started and no multiplexer is opened.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingArgument`] naming `workerExecutor` if the worker executor was not
    /// set and [`Error::InvalidConfiguration`] if the worker count is zero or the constraint spec
    /// forces an out-of-range level.
    pub fn build(&self) -> Result<DatagramFactory> {
        let worker_executor = self.worker_executor.clone().ok_or(Error::MissingArgument {
            argument: "workerExecutor",
        })?;

        let config = self.config.resolve()?;

        Ok(DatagramFactory::from_parts(worker_executor, config))
    }
}
