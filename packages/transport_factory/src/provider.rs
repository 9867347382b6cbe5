//! Multiplexer providers and the identity used to look them up in the defect table.

use std::any::type_name;
use std::borrow::Cow;
use std::fmt::{self, Debug, Display};
use std::io;
use std::sync::Arc;
use std::time::Duration;

/// Identifies a concrete event-multiplexing implementation, e.g. `epoll` on Linux.
///
/// The identity is the key used by the [`DefectTable`][crate::DefectTable] to find known defects
/// of the implementation. Where defects depend on the version of the platform, the provider can
/// report a version string to narrow the lookup.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct ProviderIdentity {
    name: Cow<'static, str>,
    version: Option<Cow<'static, str>>,
}

impl ProviderIdentity {
    /// Creates an identity with the given name and no version.
    #[must_use]
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            name: name.into(),
            version: None,
        }
    }

    /// Attaches a version to the identity.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<Cow<'static, str>>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// The name of the multiplexing implementation.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The version of the multiplexing implementation, if known.
    #[must_use]
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }
}

impl Display for ProviderIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{}/{version}", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// An instance of a platform multiplexing primitive, owned by one worker or boss.
///
/// Exactly one thread calls [`wait()`][Multiplexer::wait] at a time (the loop that owns the
/// multiplexer). Any thread may call [`wake()`][Multiplexer::wake].
pub trait Multiplexer: Debug + Send + Sync {
    /// Blocks until readiness is reported, the multiplexer is woken or the timeout elapses.
    ///
    /// Returns the number of readiness events observed. A wake-up issued before the call
    /// starts waiting must cause the call to return promptly.
    ///
    /// # Errors
    ///
    /// Returns the operating system error if waiting failed.
    fn wait(&self, timeout: Option<Duration>) -> io::Result<usize>;

    /// Interrupts a current or upcoming [`wait()`][Multiplexer::wait].
    ///
    /// # Errors
    ///
    /// Returns the operating system error if the wake-up could not be delivered.
    fn wake(&self) -> io::Result<()>;
}

/// A source of [`Multiplexer`] instances of one specific implementation.
pub trait MultiplexerProvider: Debug + Send + Sync + 'static {
    /// The identity of the multiplexing implementation.
    fn identity(&self) -> &ProviderIdentity;

    /// Opens a new multiplexer.
    ///
    /// # Errors
    ///
    /// Returns the operating system error if the multiplexer could not be created, e.g. due to
    /// descriptor exhaustion.
    fn open(&self) -> io::Result<Box<dyn Multiplexer>>;
}

/// Shared handle to a [`MultiplexerProvider`].
///
/// One provider is chosen per factory and the same handle is shared by reference with every
/// worker, boss and endpoint that factory creates. Two handles are equal if they refer to the
/// same provider instance.
///
/// # Example
///
/// ```
/// use transport_factory::SystemPlatform;
///
/// let provider = SystemPlatform::current().default_provider();
/// let same = provider.clone();
///
/// assert_eq!(provider, same);
/// println!("Default multiplexer: {}", provider.identity());
/// ```
#[derive(Clone)]
pub struct Provider {
    inner: Arc<dyn MultiplexerProvider>,
}

impl Provider {
    /// Wraps a provider implementation in a shareable handle.
    #[must_use]
    pub fn new(provider: impl MultiplexerProvider) -> Self {
        Self {
            inner: Arc::new(provider),
        }
    }

    /// The identity of the multiplexing implementation.
    #[must_use]
    pub fn identity(&self) -> &ProviderIdentity {
        self.inner.identity()
    }

    /// Opens a new multiplexer from the provider.
    ///
    /// # Errors
    ///
    /// Returns the operating system error reported by the provider.
    pub fn open(&self) -> io::Result<Box<dyn Multiplexer>> {
        self.inner.open()
    }
}

impl PartialEq for Provider {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Provider {}

impl Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("identity", self.identity())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use static_assertions::assert_impl_all;

    use super::*;
    use crate::fake::FakeProvider;

    assert_impl_all!(Provider: Send, Sync, Clone, Debug);
    assert_impl_all!(ProviderIdentity: Send, Sync, Clone, Debug, Display);

    #[test]
    fn identity_display_includes_version() {
        let plain = ProviderIdentity::new("kqueue");
        let versioned = ProviderIdentity::new("epoll").with_version("2.6.32");

        assert_eq!(plain.to_string(), "kqueue");
        assert_eq!(versioned.to_string(), "epoll/2.6.32");
    }

    #[test]
    fn handles_compare_by_reference() {
        let a = Provider::new(FakeProvider::new("fake"));
        let b = Provider::new(FakeProvider::new("fake"));

        assert_eq!(a, a.clone());
        assert_ne!(a, b);
        assert_eq!(a.identity(), b.identity());
    }

    #[test]
    fn open_delegates_to_implementation() {
        let fake = FakeProvider::new("fake");
        let provider = Provider::new(fake.clone());

        provider.open().unwrap();
        provider.open().unwrap();

        assert_eq!(fake.open_count(), 2);
    }
}
