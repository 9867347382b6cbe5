use std::num::NonZero;
use std::sync::OnceLock;
use std::thread;

use crate::pal::{Platform, PollProvider};
use crate::{DefectTable, Provider};

/// The platform the package was built for.
pub(crate) static TARGET_PLATFORM: TargetPlatform = TargetPlatform::new();

#[derive(Debug)]
pub(crate) struct TargetPlatform {
    /// Every factory that uses the default provider shares this one instance.
    default_provider: OnceLock<Provider>,
}

impl TargetPlatform {
    const fn new() -> Self {
        Self {
            default_provider: OnceLock::new(),
        }
    }
}

impl Platform for TargetPlatform {
    fn default_provider(&self) -> Provider {
        self.default_provider
            .get_or_init(|| Provider::new(PollProvider::new()))
            .clone()
    }

    fn processor_count(&self) -> NonZero<usize> {
        // If the platform cannot tell us, we know there is at least the one we are running on.
        thread::available_parallelism().unwrap_or(NonZero::<usize>::MIN)
    }

    fn defect_table(&self) -> &DefectTable {
        DefectTable::global()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn default_provider_is_shared() {
        let a = TARGET_PLATFORM.default_provider();
        let b = TARGET_PLATFORM.default_provider();

        assert_eq!(a, b);
    }

    #[test]
    fn processor_count_is_positive() {
        assert!(TARGET_PLATFORM.processor_count().get() >= 1);
    }
}
