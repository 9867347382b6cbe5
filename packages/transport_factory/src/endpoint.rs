//! Endpoints created by the factories and the state they share with bosses and workers.

use std::any::type_name;
use std::fmt::{self, Debug};
use std::net::SocketAddr;
use std::sync::Arc;

use derive_more::derive::Display;
use parking_lot::Mutex;

use crate::{Boss, ConstraintLevel, Error, MultiplexerEntity, Provider, Result, Worker};

/// Identifies an endpoint within the factory that created it.
///
/// Identifiers are assigned sequentially starting from 0 in the order endpoints are created.
#[derive(Clone, Copy, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[display("endpoint-{_0}")]
pub struct EndpointId(u64);

impl EndpointId {
    pub(crate) const fn new(value: u64) -> Self {
        Self(value)
    }

    /// The numeric value of the identifier.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

/// The lifecycle state of an endpoint.
#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum EndpointState {
    /// Created and bound to a worker, but not yet registered with its multiplexer.
    Open,

    /// A connection attempt has been started and the boss has not yet handed the endpoint to
    /// its worker.
    Connecting,

    /// Registered with the multiplexer of its worker.
    Registered,

    /// Closed by the owner. Closed endpoints are never registered.
    Closed,
}

/// State of an endpoint shared between the endpoint handle, the boss and the worker.
#[derive(Debug)]
pub(crate) struct EndpointCore {
    id: EndpointId,
    status: Mutex<Status>,
}

#[derive(Debug)]
struct Status {
    state: EndpointState,
    remote: Option<SocketAddr>,
}

impl EndpointCore {
    pub(crate) fn new(id: EndpointId) -> Self {
        Self {
            id,
            status: Mutex::new(Status {
                state: EndpointState::Open,
                remote: None,
            }),
        }
    }

    pub(crate) fn id(&self) -> EndpointId {
        self.id
    }

    pub(crate) fn state(&self) -> EndpointState {
        self.status.lock().state
    }

    pub(crate) fn remote_addr(&self) -> Option<SocketAddr> {
        self.status.lock().remote
    }

    /// `Open` -> `Connecting`. Any other starting state is an error.
    pub(crate) fn begin_connect(&self, remote: SocketAddr) -> Result<()> {
        let mut status = self.status.lock();

        if status.state != EndpointState::Open {
            return Err(Error::InvalidEndpointState {
                endpoint: self.id,
                state: status.state,
            });
        }

        status.state = EndpointState::Connecting;
        status.remote = Some(remote);
        Ok(())
    }

    /// `Connecting` -> `Open`, for connection attempts that never reached a worker.
    pub(crate) fn revert_connect(&self) {
        let mut status = self.status.lock();

        if status.state == EndpointState::Connecting {
            status.state = EndpointState::Open;
            status.remote = None;
        }
    }

    /// Returns `false` if the endpoint was closed before its registration ran.
    pub(crate) fn mark_registered(&self) -> bool {
        let mut status = self.status.lock();

        match status.state {
            EndpointState::Open | EndpointState::Connecting => {
                status.state = EndpointState::Registered;
                true
            }
            EndpointState::Registered => true,
            EndpointState::Closed => false,
        }
    }

    /// Returns `false` if the endpoint was already closed.
    pub(crate) fn close(&self) -> bool {
        let mut status = self.status.lock();

        if status.state == EndpointState::Closed {
            return false;
        }

        status.state = EndpointState::Closed;
        true
    }
}

/// An endpoint travelling inside a task queued on a boss or worker.
///
/// If the task is dropped without running, e.g. because the loop shut down first, a connection
/// attempt in progress is reverted so the endpoint does not stay `Connecting` forever.
pub(crate) struct PendingRegistration {
    endpoint: Arc<EndpointCore>,
    armed: bool,
}

impl PendingRegistration {
    pub(crate) fn new(endpoint: Arc<EndpointCore>) -> Self {
        Self {
            endpoint,
            armed: true,
        }
    }

    pub(crate) fn endpoint(&self) -> &Arc<EndpointCore> {
        &self.endpoint
    }

    /// The task has run, so dropping the endpoint no longer reverts it.
    pub(crate) fn complete(mut self) {
        self.armed = false;
    }
}

impl Drop for PendingRegistration {
    fn drop(&mut self) {
        if self.armed {
            self.endpoint.revert_connect();
        }
    }
}

/// A connection-oriented endpoint created by a [`ClientSocketFactory`][crate::ClientSocketFactory].
///
/// The endpoint is permanently bound to the worker it was assigned to on creation. It carries
/// the pipeline supplied by the caller, which the package treats as opaque.
pub struct StreamEndpoint<P> {
    core: Arc<EndpointCore>,
    pipeline: P,
    worker: Worker,
    boss: Arc<Boss>,
}

impl<P> StreamEndpoint<P> {
    pub(crate) fn new(
        core: Arc<EndpointCore>,
        pipeline: P,
        worker: Worker,
        boss: Arc<Boss>,
    ) -> Self {
        Self {
            core,
            pipeline,
            worker,
            boss,
        }
    }

    /// The identifier of the endpoint within its factory.
    #[must_use]
    pub fn id(&self) -> EndpointId {
        self.core.id()
    }

    /// The current lifecycle state of the endpoint.
    #[must_use]
    pub fn state(&self) -> EndpointState {
        self.core.state()
    }

    /// The address of the current or last accepted connection attempt.
    #[must_use]
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.core.remote_addr()
    }

    /// The worker this endpoint is bound to.
    #[must_use]
    pub fn worker(&self) -> &Worker {
        &self.worker
    }

    /// The pipeline supplied when the endpoint was created.
    #[must_use]
    pub fn pipeline(&self) -> &P {
        &self.pipeline
    }

    /// Mutable access to the pipeline supplied when the endpoint was created.
    #[must_use]
    pub fn pipeline_mut(&mut self) -> &mut P {
        &mut self.pipeline
    }

    /// Starts a connection attempt to `remote`.
    ///
    /// This does not wait for the attempt to complete. The boss of the factory is started on
    /// its executor if this is the first connection attempt of the factory. Once the boss has
    /// processed the attempt, the endpoint is registered with its worker.
    ///
    /// If the factory releases its external resources before the attempt reaches the worker,
    /// the endpoint returns to [`EndpointState::Open`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEndpointState`] if the endpoint is not [`EndpointState::Open`],
    /// [`Error::RejectedWork`] if the boss executor refused to start the boss,
    /// [`Error::Multiplexer`] if the boss could not open its multiplexer and [`Error::Released`]
    /// if the factory has released its external resources.
    pub fn connect(&self, remote: SocketAddr) -> Result<()> {
        self.boss.connect(&self.core, &self.worker, remote)
    }

    /// Closes the endpoint. Returns `false` if it was already closed.
    pub fn close(&self) -> bool {
        self.core.close()
    }
}

impl<P> MultiplexerEntity for StreamEndpoint<P> {
    fn provider(&self) -> &Provider {
        self.worker.provider()
    }

    fn constraint_level(&self) -> ConstraintLevel {
        self.worker.constraint_level()
    }
}

impl<P> Debug for StreamEndpoint<P> {
    #[cfg_attr(test, mutants::skip)] // Debug output is not part of the contract.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("core", &self.core)
            .field("worker", &self.worker.index())
            .finish_non_exhaustive()
    }
}

/// A connectionless endpoint created by a [`DatagramFactory`][crate::DatagramFactory].
///
/// The endpoint is permanently bound to the worker it was assigned to on creation and is
/// registered with that worker without any connection step.
pub struct DatagramEndpoint<P> {
    core: Arc<EndpointCore>,
    pipeline: P,
    worker: Worker,
}

impl<P> DatagramEndpoint<P> {
    pub(crate) fn new(core: Arc<EndpointCore>, pipeline: P, worker: Worker) -> Self {
        Self {
            core,
            pipeline,
            worker,
        }
    }

    /// The identifier of the endpoint within its factory.
    #[must_use]
    pub fn id(&self) -> EndpointId {
        self.core.id()
    }

    /// The current lifecycle state of the endpoint.
    #[must_use]
    pub fn state(&self) -> EndpointState {
        self.core.state()
    }

    /// The worker this endpoint is bound to.
    #[must_use]
    pub fn worker(&self) -> &Worker {
        &self.worker
    }

    /// The pipeline supplied when the endpoint was created.
    #[must_use]
    pub fn pipeline(&self) -> &P {
        &self.pipeline
    }

    /// Mutable access to the pipeline supplied when the endpoint was created.
    #[must_use]
    pub fn pipeline_mut(&mut self) -> &mut P {
        &mut self.pipeline
    }

    /// Closes the endpoint. Returns `false` if it was already closed.
    pub fn close(&self) -> bool {
        self.core.close()
    }
}

impl<P> MultiplexerEntity for DatagramEndpoint<P> {
    fn provider(&self) -> &Provider {
        self.worker.provider()
    }

    fn constraint_level(&self) -> ConstraintLevel {
        self.worker.constraint_level()
    }
}

impl<P> Debug for DatagramEndpoint<P> {
    #[cfg_attr(test, mutants::skip)] // Debug output is not part of the contract.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("core", &self.core)
            .field("worker", &self.worker.index())
            .finish_non_exhaustive()
    }
}
