use std::io;

use thiserror::Error;

use crate::{EndpointId, EndpointState, ExecutorRole, ProviderIdentity};

/// Errors that can occur when building transport factories or creating endpoints with them.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A mandatory argument was not supplied to a builder.
    #[error("missing mandatory argument: {argument}")]
    MissingArgument {
        /// The name of the missing argument, e.g. `workerExecutor`.
        argument: &'static str,
    },

    /// A builder was given a value that cannot be used to construct a factory.
    #[error("invalid configuration: {problem}")]
    InvalidConfiguration {
        /// A human-readable description of the problem.
        problem: String,
    },

    /// An executor refused a unit of work because it has already started shutting down.
    ///
    /// This indicates that the executor was shut down before all endpoints of the factory
    /// were closed. The factory does not attempt to recover from this.
    #[error("the {executor} executor rejected work because it is shutting down")]
    RejectedWork {
        /// Which of the factory's executors rejected the work.
        executor: ExecutorRole,
    },

    /// The factory has released its external resources and can no longer create endpoints.
    #[error("the factory has already released its external resources")]
    Released,

    /// The operation is not valid for the current state of the endpoint.
    #[error("{endpoint} cannot perform this operation while in state {state:?}")]
    InvalidEndpointState {
        /// The endpoint the operation was attempted on.
        endpoint: EndpointId,

        /// The state the endpoint was in at the time of the attempt.
        state: EndpointState,
    },

    /// The multiplexer provider failed to open a multiplexer for a worker or boss.
    #[error("provider {provider} failed to open a multiplexer")]
    Multiplexer {
        /// The provider that failed.
        provider: ProviderIdentity,

        /// The underlying operating system error.
        #[source]
        source: io::Error,
    },
}

/// A specialized `Result` type for transport factory operations, returning the crate's
/// [`Error`] type as the error value.
pub(crate) type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::error::Error as _;
    use std::fmt::Debug;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(Error: Send, Sync, Debug);

    #[test]
    fn missing_argument_names_argument() {
        let error = Error::MissingArgument {
            argument: "workerExecutor",
        };

        assert!(error.to_string().contains("workerExecutor"));
    }

    #[test]
    fn rejected_work_names_executor_role() {
        let error = Error::RejectedWork {
            executor: ExecutorRole::Boss,
        };

        assert!(error.to_string().contains("boss"));
    }

    #[test]
    fn multiplexer_error_exposes_source() {
        let error = Error::Multiplexer {
            provider: ProviderIdentity::new("epoll"),
            source: io::Error::other("out of descriptors"),
        };

        assert!(error.to_string().contains("epoll"));
        assert!(error.source().is_some());
    }
}
