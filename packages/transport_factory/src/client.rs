//! The connection-oriented factory with a boss and a set of workers.

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
    Boss, ConstraintLevel, ConstraintSpec, EndpointId, Error, ExecutorHandle, MultiplexerEntity,
    Provider, Result, StreamEndpoint, SystemPlatform, Worker,
};

/// Creates connection-oriented client endpoints and assigns them to workers.
///
/// A factory has one boss, which handles connection attempts, and a fixed number of workers,
/// which drive the I/O of connected endpoints. Each new endpoint is assigned to the next worker
/// in round-robin order. Neither the boss nor any worker is started before it is first needed.
///
/// The multiplexer provider and constraint level are resolved once when the factory is built and
/// every endpoint, worker and the boss report the same pair as the factory.
///
/// The executors are owned by the caller. The factory only shuts them down in
/// [`release_external_resources()`][Self::release_external_resources], which must be called
/// explicitly.
///
/// Clones refer to the same factory.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
///
/// use transport_factory::{ClientSocketFactory, ExecutorHandle, ThreadExecutor};
///
/// let boss: ExecutorHandle = Arc::new(ThreadExecutor::new("boss"));
/// let workers: ExecutorHandle = Arc::new(ThreadExecutor::new("worker"));
///
/// let factory = ClientSocketFactory::builder()
///     .boss_executor(boss)
///     .worker_executor(workers)
///     .worker_count(2)
///     .build()
///     .unwrap();
///
/// let first = factory.new_channel("first pipeline").unwrap();
/// let second = factory.new_channel("second pipeline").unwrap();
///
/// assert_eq!(first.worker().index(), 0);
/// assert_eq!(second.worker().index(), 1);
///
/// factory.release_external_resources();
/// ```
#[derive(Clone)]
pub struct ClientSocketFactory {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    provider: Provider,
    level: ConstraintLevel,
    sink: WorkerSink,
    boss: Arc<Boss>,
    boss_executor: ExecutorHandle,
    worker_executor: ExecutorHandle,
    next_endpoint_id: AtomicU64,
    released: AtomicBool,
}

impl ClientSocketFactory {
    /// Creates a factory with platform defaults: the default provider, twice as many workers as
    /// there are logical processors and an auto-detected constraint level.
    #[must_use]
    pub fn new(boss_executor: ExecutorHandle, worker_executor: ExecutorHandle) -> Self {
        let platform = SystemPlatform::current();

        Self::from_parts(
            boss_executor,
            worker_executor,
            ResolvedConfig::defaults(platform, platform.default_worker_count()),
        )
    }

    /// Creates a factory with platform defaults and the given number of workers.
    #[must_use]
    pub fn with_worker_count(
        boss_executor: ExecutorHandle,
        worker_executor: ExecutorHandle,
        worker_count: NonZero<usize>,
    ) -> Self {
        Self::from_parts(
            boss_executor,
            worker_executor,
            ResolvedConfig::defaults(SystemPlatform::current(), worker_count),
        )
    }

    /// Starts building a factory.
    #[must_use]
    pub fn builder() -> ClientSocketFactoryBuilder {
        ClientSocketFactoryBuilder::new()
    }

    fn from_parts(
        boss_executor: ExecutorHandle,
        worker_executor: ExecutorHandle,
        config: ResolvedConfig,
    ) -> Self {
        let ResolvedConfig {
            worker_count,
            provider,
            level,
        } = config;

        let sink = WorkerSink::new(worker_count, &provider, level, &worker_executor);
        let boss = Arc::new(Boss::new(
            provider.clone(),
            level,
            Arc::clone(&boss_executor),
        ));

        debug!(
            workers = worker_count.get(),
            provider = %provider.identity(),
            %level,
            "client socket factory built"
        );

        Self {
            inner: Arc::new(ClientInner {
                provider,
                level,
                sink,
                boss,
                boss_executor,
                worker_executor,
                next_endpoint_id: AtomicU64::new(0),
                released: AtomicBool::new(false),
            }),
        }
    }

    /// Creates a new endpoint carrying `pipeline` and assigns it to the next worker.
    ///
    /// The worker is started on the worker executor if this is the first endpoint assigned to
    /// it. This never waits for network activity.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Released`] if the factory has released its external resources,
    /// [`Error::RejectedWork`] if the worker executor refused to start the worker and
    /// [`Error::Multiplexer`] if the worker could not open its multiplexer.
    pub fn new_channel<P>(&self, pipeline: P) -> Result<StreamEndpoint<P>> {
        if self.is_released() {
            return Err(Error::Released);
        }

        let worker = self.inner.sink.next_worker();
        let id = EndpointId::new(self.inner.next_endpoint_id.fetch_add(1, Ordering::Relaxed));
        let core = Arc::new(EndpointCore::new(id));

        worker.assign(&core)?;

        trace!(endpoint = %id, worker = worker.index(), "client endpoint created");

        Ok(StreamEndpoint::new(
            core,
            pipeline,
            worker.clone(),
            Arc::clone(&self.inner.boss),
        ))
    }

    /// Stops the boss and the workers, then shuts down both executors and waits for them to
    /// terminate.
    ///
    /// Only the first call has any effect. Endpoints that are still open are not closed. If
    /// called from a thread of one of the executors, the executors are shut down but not
    /// waited for.
    ///
    /// The wait has no time limit. If either executor also runs loops of another factory that
    /// has not released its external resources, this call blocks until that factory releases
    /// them too.
    pub fn release_external_resources(&self) {
        if self.inner.released.swap(true, Ordering::AcqRel) {
            return;
        }

        debug!("releasing client socket factory resources");

        self.inner.boss.shutdown();
        self.inner.sink.shutdown();

        terminate(&[&self.inner.boss_executor, &self.inner.worker_executor]);

        debug!("client socket factory resources released");
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

    /// The boss of the factory.
    #[must_use]
    pub fn boss(&self) -> &Boss {
        &self.inner.boss
    }
}

impl MultiplexerEntity for ClientSocketFactory {
    fn provider(&self) -> &Provider {
        &self.inner.provider
    }

    fn constraint_level(&self) -> ConstraintLevel {
        self.inner.level
    }
}

impl Debug for ClientSocketFactory {
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

/// Builds a [`ClientSocketFactory`].
///
/// The boss executor and the worker executor are mandatory. Everything else defaults to what
/// the platform suggests. The builder can be reused: every call to [`build()`][Self::build]
/// creates a new independent factory.
#[derive(Clone, Debug, Default)]
pub struct ClientSocketFactoryBuilder {
    boss_executor: Option<ExecutorHandle>,
    worker_executor: Option<ExecutorHandle>,
    config: FactoryConfig,
}

impl ClientSocketFactoryBuilder {
    fn new() -> Self {
        Self::default()
    }

    /// Sets the executor that runs the boss. Mandatory.
    #[must_use]
    pub fn boss_executor(mut self, executor: ExecutorHandle) -> Self {
        self.boss_executor = Some(executor);
        self
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
    /// Returns [`Error::MissingArgument`] naming `bossExecutor` or `workerExecutor` if either
    /// executor was not set (the boss executor is checked first) and
    /// [`Error::InvalidConfiguration`] if the worker count is zero or the constraint spec forces
    /// an out-of-range level.
    pub fn build(&self) -> Result<ClientSocketFactory> {
        let boss_executor = self.boss_executor.clone().ok_or(Error::MissingArgument {
            argument: "bossExecutor",
        })?;

        let worker_executor = self.worker_executor.clone().ok_or(Error::MissingArgument {
            argument: "workerExecutor",
        })?;

        let config = self.config.resolve()?;

        Ok(ClientSocketFactory::from_parts(
            boss_executor,
            worker_executor,
            config,
        ))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use new_zealand::nz;
    use static_assertions::assert_impl_all;

    use super::*;
    use crate::fake::{FakePlatformBuilder, FakeProvider};
    use crate::{DefectTable, ExecutorRole, MockExecutor, Rejected};

    assert_impl_all!(ClientSocketFactory: Send, Sync, Clone, Debug);
    assert_impl_all!(ClientSocketFactoryBuilder: Send, Sync, Clone, Debug);

    fn accepting_executor() -> ExecutorHandle {
        let mut executor = MockExecutor::new();
        executor.expect_execute().returning(|_| Ok(()));
        Arc::new(executor)
    }

    fn fake_platform(processors: NonZero<usize>) -> SystemPlatform {
        SystemPlatform::fake(FakePlatformBuilder::new().processor_count(processors))
    }

    fn builder() -> ClientSocketFactoryBuilder {
        ClientSocketFactory::builder()
            .boss_executor(accepting_executor())
            .worker_executor(accepting_executor())
            .platform(fake_platform(nz!(2)))
    }

    #[test]
    fn missing_boss_executor_is_reported_first() {
        let result = ClientSocketFactory::builder().build();

        assert!(matches!(
            result,
            Err(Error::MissingArgument {
                argument: "bossExecutor"
            })
        ));
    }

    #[test]
    fn missing_worker_executor_is_reported() {
        let result = ClientSocketFactory::builder()
            .boss_executor(accepting_executor())
            .build();

        let error = result.unwrap_err();
        assert!(matches!(
            error,
            Error::MissingArgument {
                argument: "workerExecutor"
            }
        ));
        assert!(error.to_string().contains("workerExecutor"));
    }

    #[test]
    fn zero_workers_is_invalid() {
        let result = builder().worker_count(0).build();

        assert!(matches!(result, Err(Error::InvalidConfiguration { .. })));
    }

    #[test]
    fn default_worker_count_is_twice_processors() {
        let factory = builder().build().unwrap();

        assert_eq!(factory.worker_count().get(), 4);
        assert_eq!(factory.workers().len(), 4);
    }

    #[test]
    fn build_starts_nothing() {
        let fake = FakeProvider::new("fake");

        let mut boss = MockExecutor::new();
        boss.expect_execute().never();
        let mut worker = MockExecutor::new();
        worker.expect_execute().never();

        let factory = ClientSocketFactory::builder()
            .boss_executor(Arc::new(boss))
            .worker_executor(Arc::new(worker))
            .provider(Provider::new(fake.clone()))
            .platform(fake_platform(nz!(1)))
            .build()
            .unwrap();

        assert_eq!(fake.open_count(), 0);
        assert!(!factory.boss().is_running());
        assert!(factory.workers().iter().all(|w| !w.is_running()));
    }

    #[test]
    fn endpoints_are_assigned_round_robin() {
        let factory = builder().worker_count(4).build().unwrap();

        let indexes: Vec<_> = (0..8)
            .map(|i| factory.new_channel(i).unwrap().worker().index())
            .collect();

        assert_eq!(indexes, [0, 1, 2, 3, 0, 1, 2, 3]);
        assert!(factory.workers().iter().all(|w| w.assigned_endpoints() == 2));
    }

    #[test]
    fn endpoint_ids_are_sequential() {
        let factory = builder().build().unwrap();

        let first = factory.new_channel(()).unwrap();
        let second = factory.new_channel(()).unwrap();

        assert_eq!(first.id().get(), 0);
        assert_eq!(second.id().get(), 1);
    }

    #[test]
    fn everything_shares_factory_context() {
        let platform = SystemPlatform::fake(
            FakePlatformBuilder::new()
                .provider(Provider::new(FakeProvider::new("epoll")))
                .defect_table(
                    DefectTable::builder()
                        .rule("epoll", ConstraintLevel::new(1))
                        .build(),
                ),
        );

        let factory = builder().platform(platform.clone()).build().unwrap();
        let endpoint = factory.new_channel("pipeline").unwrap();

        assert_eq!(factory.constraint_level(), ConstraintLevel::new(1));
        assert_eq!(factory.provider(), &platform.default_provider());
        assert!(endpoint.shares_context_with(&factory));
        assert!(endpoint.worker().shares_context_with(&factory));
        assert!(factory.boss().shares_context_with(&factory));
        assert_eq!(endpoint.pipeline(), &"pipeline");
    }

    #[test]
    fn forced_level_applies_to_any_provider() {
        for name in ["epoll", "kqueue", "poll"] {
            let factory = builder()
                .provider(Provider::new(FakeProvider::new(name)))
                .constraint_spec(ConstraintSpec::Force(3))
                .build()
                .unwrap();

            assert_eq!(factory.constraint_level(), ConstraintLevel::new(3));
        }
    }

    #[test]
    fn builder_is_reusable() {
        let builder = builder().worker_count(1);

        let first = builder.build().unwrap();
        let second = builder.clone().worker_count(3).build().unwrap();

        assert_eq!(first.worker_count().get(), 1);
        assert_eq!(second.worker_count().get(), 3);
        assert_eq!(first.provider(), second.provider());
    }

    #[test]
    fn worker_rejection_surfaces() {
        let mut worker = MockExecutor::new();
        worker.expect_execute().returning(|_| Err(Rejected));

        let factory = builder().worker_executor(Arc::new(worker)).build().unwrap();

        assert!(matches!(
            factory.new_channel(()),
            Err(Error::RejectedWork {
                executor: ExecutorRole::Worker
            })
        ));
    }

    #[test]
    fn release_is_idempotent() {
        let mut boss = MockExecutor::new();
        boss.expect_shutdown().times(1).return_const(());
        boss.expect_is_executor_thread().return_const(false);
        boss.expect_await_termination().times(1).return_const(true);

        let mut worker = MockExecutor::new();
        worker.expect_execute().returning(|_| Ok(()));
        worker.expect_shutdown().times(1).return_const(());
        worker.expect_is_executor_thread().return_const(false);
        worker.expect_await_termination().times(1).return_const(true);

        let factory = builder()
            .boss_executor(Arc::new(boss))
            .worker_executor(Arc::new(worker))
            .build()
            .unwrap();

        factory.new_channel(()).unwrap();

        factory.release_external_resources();
        factory.release_external_resources();

        assert!(factory.is_released());
        assert!(matches!(factory.new_channel(()), Err(Error::Released)));
    }

    #[test]
    fn new_uses_platform_defaults() {
        let factory = ClientSocketFactory::new(accepting_executor(), accepting_executor());

        assert_eq!(
            factory.worker_count(),
            SystemPlatform::current().default_worker_count()
        );
        assert_eq!(
            factory.provider(),
            &SystemPlatform::current().default_provider()
        );
    }

    #[test]
    fn with_worker_count_uses_given_count() {
        let factory = ClientSocketFactory::with_worker_count(
            accepting_executor(),
            accepting_executor(),
            nz!(5),
        );

        assert_eq!(factory.worker_count().get(), 5);
    }
}
