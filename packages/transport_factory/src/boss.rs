use std::any::type_name;
use std::fmt::{self, Debug};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::{trace, warn};

use crate::endpoint::{EndpointCore, PendingRegistration};
use crate::{
    ConstraintLevel, ExecutorHandle, ExecutorRole, MultiplexerEntity, Provider, Result,
    SelectorLoop, Worker,
};

/// The execution context of a [`ClientSocketFactory`][crate::ClientSocketFactory] that handles
/// outbound connection attempts and hands connecting endpoints over to their workers.
///
/// There is at most one boss per factory. It is started on its executor the first time an
/// endpoint of the factory connects.
pub struct Boss {
    selector: SelectorLoop,
    connect_attempts: AtomicUsize,
}

impl Boss {
    pub(crate) fn new(
        provider: Provider,
        level: ConstraintLevel,
        executor: ExecutorHandle,
    ) -> Self {
        Self {
            selector: SelectorLoop::new(
                provider,
                level,
                executor,
                ExecutorRole::Boss,
                "boss".to_string(),
            ),
            connect_attempts: AtomicUsize::new(0),
        }
    }

    /// Whether the boss has been started and has not yet exited.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.selector.is_running()
    }

    /// Number of connection attempts accepted by the boss so far.
    #[must_use]
    pub fn connect_attempts(&self) -> usize {
        self.connect_attempts.load(Ordering::Relaxed)
    }

    /// Starts a connection attempt for an endpoint owned by `worker`.
    ///
    /// The endpoint moves to [`Connecting`][crate::EndpointState::Connecting] immediately. Once
    /// the boss has processed the attempt it hands the endpoint to its worker for registration.
    /// If the boss cannot accept the attempt, or the attempt is dropped because the boss or the
    /// worker shut down first, the endpoint returns to [`Open`][crate::EndpointState::Open].
    pub(crate) fn connect(
        &self,
        endpoint: &Arc<EndpointCore>,
        worker: &Worker,
        remote: SocketAddr,
    ) -> Result<()> {
        endpoint.begin_connect(remote)?;

        let pending = PendingRegistration::new(Arc::clone(endpoint));
        let worker = worker.clone();

        // A task that is rejected or never runs drops `pending`, returning the endpoint to `Open`.
        self.selector.submit(Box::new(move || {
            let endpoint = pending.endpoint();

            trace!(
                endpoint = %endpoint.id(),
                worker = worker.index(),
                %remote,
                "handing connecting endpoint to worker"
            );

            match worker.register(Arc::clone(endpoint)) {
                Ok(()) => pending.complete(),
                Err(e) => warn!(
                    endpoint = %endpoint.id(),
                    worker = worker.index(),
                    error = %e,
                    "worker did not accept connecting endpoint"
                ),
            }
        }))?;

        self.connect_attempts.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub(crate) fn shutdown(&self) {
        self.selector.shutdown();
    }
}

impl MultiplexerEntity for Boss {
    fn provider(&self) -> &Provider {
        self.selector.provider()
    }

    fn constraint_level(&self) -> ConstraintLevel {
        self.selector.constraint_level()
    }
}

impl Debug for Boss {
    #[cfg_attr(test, mutants::skip)] // Debug output is not part of the contract.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("selector", &self.selector)
            .field("connect_attempts", &self.connect_attempts())
            .finish()
    }
}
