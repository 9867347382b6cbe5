//! Platform Abstraction Layer (PAL). This is private API.
//!
//! The PAL supplies everything the factories need to know about the platform they run on: the
//! default multiplexer provider, the number of logical processors and the table of known
//! multiplexer defects. The target platform is used in production; tests can substitute a fake.

mod abstractions;
pub(crate) use abstractions::*;

mod facade;
pub(crate) use facade::*;

mod poll;
pub(crate) use poll::*;

mod target;
pub(crate) use target::*;
