//! Fake platform and multiplexer provider for testing.
//!
//! Fake platforms let tests control the processor count (and therefore the default worker
//! count), the default multiplexer provider and the defect table consulted by
//! [`ConstraintSpec::AutoDetect`][crate::ConstraintSpec], without touching process-wide state.
//!
//! Only available when the `test-util` feature is enabled.
//!
//! # Example
//!
//! ```
//! use transport_factory::fake::{FakePlatformBuilder, FakeProvider};
//! use transport_factory::{ConstraintLevel, DefectTable, Provider, SystemPlatform};
//! use new_zealand::nz;
//!
//! let provider = FakeProvider::new("epoll").with_version("2.6.32");
//!
//! let platform = SystemPlatform::fake(
//!     FakePlatformBuilder::new()
//!         .processor_count(nz!(3))
//!         .provider(Provider::new(provider.clone()))
//!         .defect_table(
//!             DefectTable::builder()
//!                 .versioned_rule("epoll", "2.6.", ConstraintLevel::new(1))
//!                 .build(),
//!         ),
//! );
//!
//! assert_eq!(platform.processor_count().get(), 3);
//! assert_eq!(platform.default_worker_count().get(), 6);
//! assert_eq!(provider.open_count(), 0);
//! ```
//!
//! # Isolation
//!
//! Each fake platform is independent, so multiple fake platforms can coexist in parallel tests.

mod builder;
mod platform;
mod provider;

pub use builder::FakePlatformBuilder;
pub(crate) use platform::FakePlatform;
pub use provider::FakeProvider;
