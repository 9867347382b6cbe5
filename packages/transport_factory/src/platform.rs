//! Public handle to the platform a factory runs on, supporting both real and fake platforms.

#[cfg(any(test, feature = "test-util"))]
use std::borrow::Borrow;
use std::num::NonZero;
use std::sync::OnceLock;

use new_zealand::nz;

#[cfg(any(test, feature = "test-util"))]
use crate::fake::{FakePlatform, FakePlatformBuilder};
use crate::pal::{Platform, PlatformFacade};
use crate::{DefectTable, Provider};

/// The real platform singleton, initialized on first access.
static CURRENT_PLATFORM: OnceLock<SystemPlatform> = OnceLock::new();

/// Handle to the platform, supplying the default multiplexer provider, the logical processor
/// count and the defect table used for constraint auto-detection.
///
/// Factories use [`SystemPlatform::current()`] unless a builder is given a different platform.
/// Tests can substitute a fake platform via `SystemPlatform::fake()` (requires the `test-util`
/// feature) to control defaults without affecting process-wide state.
#[derive(Clone, Debug)]
pub struct SystemPlatform {
    facade: PlatformFacade,
}

impl SystemPlatform {
    /// Returns a handle to the platform the process is running on.
    ///
    /// # Example
    ///
    /// ```
    /// use transport_factory::SystemPlatform;
    ///
    /// let platform = SystemPlatform::current();
    /// println!(
    ///     "{} logical processors, default multiplexer is {}",
    ///     platform.processor_count(),
    ///     platform.default_provider().identity()
    /// );
    /// ```
    #[must_use]
    pub fn current() -> &'static Self {
        CURRENT_PLATFORM.get_or_init(|| Self {
            facade: PlatformFacade::target(),
        })
    }

    /// Creates a fake platform for testing purposes.
    ///
    /// Each fake platform is independent. Clones are equivalent and share the same default
    /// provider.
    #[cfg(any(test, feature = "test-util"))]
    #[must_use]
    pub fn fake(builder: impl Borrow<FakePlatformBuilder>) -> Self {
        Self {
            facade: PlatformFacade::from_fake(FakePlatform::from_builder(builder.borrow())),
        }
    }

    /// The provider used by factories that are not given an explicit one.
    ///
    /// Every call returns a handle to the same provider instance.
    #[must_use]
    pub fn default_provider(&self) -> Provider {
        self.facade.default_provider()
    }

    /// The number of logical processors available to the process.
    #[must_use]
    pub fn processor_count(&self) -> NonZero<usize> {
        self.facade.processor_count()
    }

    /// The number of workers a factory uses if not told otherwise: twice the number of logical
    /// processors.
    #[must_use]
    pub fn default_worker_count(&self) -> NonZero<usize> {
        self.processor_count().saturating_mul(nz!(2))
    }

    pub(crate) fn defect_table(&self) -> &DefectTable {
        self.facade.defect_table()
    }
}
