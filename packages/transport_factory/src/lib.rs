//! Builds non-blocking socket transport factories and assigns the endpoints they create to
//! multiplexer-driven workers.
//!
//! A factory decides, for every endpoint created under it, which event-multiplexing primitive
//! drives it, how many workers service it and which worker it is assigned to. Two flavors
//! exist:
//!
//! * [`ClientSocketFactory`] creates connection-oriented endpoints. It has one [`Boss`] that
//!   handles connection attempts and hands connecting endpoints over to [`Worker`]s.
//! * [`DatagramFactory`] creates connectionless endpoints, which go straight to their workers.
//!
//! Endpoints are assigned to workers in round-robin order. Workers and the boss are started
//! lazily on executors supplied by the caller, so building a factory is cheap.
//!
//! # Constraint levels
//!
//! Some platform multiplexers have defects that require registrations to be serialized
//! against the loop that waits on the multiplexer. When a factory is built, a
//! [`ConstraintLevel`] is resolved for its provider according to a [`ConstraintSpec`]:
//!
//! * [`ConstraintSpec::AutoDetect`] (the default) looks the provider up in the process-wide
//!   [`DefectTable`]. Providers without an entry are unconstrained.
//! * [`ConstraintSpec::Force`] uses the given level as-is.
//! * [`ConstraintSpec::None`] assumes no defects.
//!
//! The resolved level is fixed for the lifetime of the factory and reported identically by
//! everything the factory creates (see [`MultiplexerEntity`]).
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use transport_factory::{
//!     ClientSocketFactory, ConstraintLevel, ExecutorHandle, MultiplexerEntity, ThreadExecutor,
//! };
//!
//! let boss: ExecutorHandle = Arc::new(ThreadExecutor::new("boss"));
//! let workers: ExecutorHandle = Arc::new(ThreadExecutor::new("worker"));
//!
//! let factory = ClientSocketFactory::builder()
//!     .boss_executor(boss)
//!     .worker_executor(workers)
//!     .worker_count(4)
//!     .build()?;
//!
//! for expected_worker in [0, 1, 2, 3] {
//!     let endpoint = factory.new_channel(())?;
//!
//!     assert_eq!(endpoint.worker().index(), expected_worker);
//!     assert!(endpoint.shares_context_with(&factory));
//! }
//!
//! // Nothing is installed in the defect table, so the default provider is unconstrained.
//! assert_eq!(factory.constraint_level(), ConstraintLevel::UNCONSTRAINED);
//!
//! factory.release_external_resources();
//! # Ok::<(), transport_factory::Error>(())
//! ```
//!
//! # Logging
//!
//! The package emits `tracing` events for factory and worker lifecycle at debug level and for
//! individual endpoints at trace level. It does not install a subscriber.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

mod boss;
mod client;
mod config;
mod constraint;
mod datagram;
mod defect_table;
mod endpoint;
mod entity;
mod error;
mod executor;
mod pal;
mod platform;
mod provider;
mod selector_loop;
mod sink;
mod thread_executor;
mod worker;

#[cfg(any(test, feature = "test-util"))]
pub mod fake;

pub use boss::*;
pub use client::*;
pub use constraint::*;
pub use datagram::*;
pub use defect_table::*;
pub use endpoint::{DatagramEndpoint, EndpointId, EndpointState, StreamEndpoint};
pub use entity::*;
pub use error::*;
pub use executor::*;
pub use platform::*;
pub use provider::*;
pub(crate) use selector_loop::*;
pub use thread_executor::*;
pub use worker::*;
