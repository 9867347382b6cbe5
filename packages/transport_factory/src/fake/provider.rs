use std::any::type_name;
use std::borrow::Cow;
use std::fmt::{self, Debug};
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::{Multiplexer, MultiplexerProvider, ProviderIdentity};

/// A multiplexer provider that involves no operating system resources.
///
/// Multiplexers opened from a fake provider never report readiness. They only return from
/// waiting when woken or when the timeout elapses.
///
/// Clones share state, so a test can keep one clone to inspect how the provider was used after
/// handing another to a factory.
///
/// # Example
///
/// ```
/// use std::time::Duration;
///
/// use transport_factory::Provider;
/// use transport_factory::fake::FakeProvider;
///
/// let fake = FakeProvider::new("epoll");
/// let provider = Provider::new(fake.clone());
///
/// let multiplexer = provider.open().unwrap();
/// multiplexer.wake().unwrap();
/// assert_eq!(multiplexer.wait(Some(Duration::from_secs(5))).unwrap(), 0);
///
/// assert_eq!(fake.open_count(), 1);
/// assert_eq!(fake.wake_count(), 1);
/// ```
#[derive(Clone)]
pub struct FakeProvider {
    inner: Arc<FakeProviderInner>,
}

#[derive(Debug)]
struct FakeProviderInner {
    identity: ProviderIdentity,
    fail_open: bool,
    opens: AtomicUsize,
    wakes: Arc<AtomicUsize>,
}

impl FakeProvider {
    /// Creates a fake provider with the given identity name.
    #[must_use]
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self::with_identity(ProviderIdentity::new(name), false)
    }

    /// Creates a fake provider that fails every attempt to open a multiplexer.
    #[must_use]
    pub fn failing(name: impl Into<Cow<'static, str>>) -> Self {
        Self::with_identity(ProviderIdentity::new(name), true)
    }

    /// Attaches a version to the identity of the provider.
    ///
    /// The returned provider does not share state with `self`.
    #[must_use]
    pub fn with_version(self, version: impl Into<Cow<'static, str>>) -> Self {
        Self::with_identity(
            self.inner.identity.clone().with_version(version),
            self.inner.fail_open,
        )
    }

    /// Number of multiplexers opened so far, including failed attempts.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.inner.opens.load(Ordering::Relaxed)
    }

    /// Number of wake-ups delivered to multiplexers of this provider so far.
    #[must_use]
    pub fn wake_count(&self) -> usize {
        self.inner.wakes.load(Ordering::Relaxed)
    }

    fn with_identity(identity: ProviderIdentity, fail_open: bool) -> Self {
        Self {
            inner: Arc::new(FakeProviderInner {
                identity,
                fail_open,
                opens: AtomicUsize::new(0),
                wakes: Arc::new(AtomicUsize::new(0)),
            }),
        }
    }
}

impl MultiplexerProvider for FakeProvider {
    fn identity(&self) -> &ProviderIdentity {
        &self.inner.identity
    }

    fn open(&self) -> io::Result<Box<dyn Multiplexer>> {
        self.inner.opens.fetch_add(1, Ordering::Relaxed);

        if self.inner.fail_open {
            return Err(io::Error::other(format!(
                "{} is configured to fail",
                self.inner.identity
            )));
        }

        Ok(Box::new(FakeMultiplexer {
            woken: Mutex::new(false),
            condvar: Condvar::new(),
            wakes: Arc::clone(&self.inner.wakes),
        }))
    }
}

impl Debug for FakeProvider {
    #[cfg_attr(test, mutants::skip)] // Debug output is not part of the contract.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("inner", &self.inner)
            .finish()
    }
}

/// Multiplexer whose only source of events is [`Multiplexer::wake()`].
struct FakeMultiplexer {
    // A wake-up stays pending until the next wait consumes it.
    woken: Mutex<bool>,
    condvar: Condvar,
    wakes: Arc<AtomicUsize>,
}

impl Multiplexer for FakeMultiplexer {
    fn wait(&self, timeout: Option<Duration>) -> io::Result<usize> {
        let mut woken = self.woken.lock();

        match timeout {
            Some(timeout) => {
                if !*woken {
                    self.condvar.wait_for(&mut woken, timeout);
                }
            }
            None => {
                while !*woken {
                    self.condvar.wait(&mut woken);
                }
            }
        }

        *woken = false;
        Ok(0)
    }

    fn wake(&self) -> io::Result<()> {
        *self.woken.lock() = true;
        self.condvar.notify_all();
        self.wakes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

impl Debug for FakeMultiplexer {
    #[cfg_attr(test, mutants::skip)] // Debug output is not part of the contract.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("woken", &*self.woken.lock())
            .finish_non_exhaustive()
    }
}
