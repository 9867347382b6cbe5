use std::fmt::{self, Debug};
use std::num::NonZero;
#[cfg(any(test, feature = "test-util"))]
use std::sync::Arc;

#[cfg(any(test, feature = "test-util"))]
use crate::fake::FakePlatform;
use crate::pal::{Platform, TARGET_PLATFORM, TargetPlatform};
use crate::{DefectTable, Provider};

/// Enables abstraction over different kinds of PAL (typically real versus fake).
#[derive(Clone)]
pub(crate) enum PlatformFacade {
    Target(&'static TargetPlatform),

    #[cfg(any(test, feature = "test-util"))]
    Fake(Arc<FakePlatform>),
}

impl PlatformFacade {
    pub(crate) fn target() -> Self {
        Self::Target(&TARGET_PLATFORM)
    }

    #[cfg(any(test, feature = "test-util"))]
    pub(crate) fn from_fake(platform: FakePlatform) -> Self {
        Self::Fake(Arc::new(platform))
    }
}

impl Platform for PlatformFacade {
    fn default_provider(&self) -> Provider {
        match self {
            Self::Target(p) => p.default_provider(),
            #[cfg(any(test, feature = "test-util"))]
            Self::Fake(p) => p.default_provider(),
        }
    }

    fn processor_count(&self) -> NonZero<usize> {
        match self {
            Self::Target(p) => p.processor_count(),
            #[cfg(any(test, feature = "test-util"))]
            Self::Fake(p) => p.processor_count(),
        }
    }

    fn defect_table(&self) -> &DefectTable {
        match self {
            Self::Target(p) => p.defect_table(),
            #[cfg(any(test, feature = "test-util"))]
            Self::Fake(p) => p.defect_table(),
        }
    }
}

impl Debug for PlatformFacade {
    #[cfg_attr(test, mutants::skip)] // Debug output is not part of the contract.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Target(inner) => inner.fmt(f),
            #[cfg(any(test, feature = "test-util"))]
            Self::Fake(inner) => inner.fmt(f),
        }
    }
}
