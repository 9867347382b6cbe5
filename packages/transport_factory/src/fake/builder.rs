use std::num::NonZero;

use new_zealand::nz;

use crate::{DefectTable, Provider};

/// Configures a fake platform.
///
/// Anything not configured falls back to a single processor, a fresh [`FakeProvider`][1]
/// named `fake` and an empty defect table.
///
/// # Example
///
/// ```
/// use transport_factory::SystemPlatform;
/// use transport_factory::fake::FakePlatformBuilder;
/// use new_zealand::nz;
///
/// let platform = SystemPlatform::fake(FakePlatformBuilder::new().processor_count(nz!(2)));
///
/// assert_eq!(platform.default_provider().identity().name(), "fake");
/// ```
///
/// [1]: crate::fake::FakeProvider
#[derive(Clone, Debug)]
pub struct FakePlatformBuilder {
    pub(crate) processor_count: NonZero<usize>,
    pub(crate) provider: Option<Provider>,
    pub(crate) defect_table: DefectTable,
}

impl Default for FakePlatformBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FakePlatformBuilder {
    /// Creates a builder for a single-processor fake platform.
    #[must_use]
    pub fn new() -> Self {
        Self {
            processor_count: nz!(1),
            provider: None,
            defect_table: DefectTable::empty(),
        }
    }

    /// Sets the number of logical processors the fake platform reports.
    #[must_use]
    pub fn processor_count(mut self, count: NonZero<usize>) -> Self {
        self.processor_count = count;
        self
    }

    /// Sets the provider the fake platform reports as its default.
    #[must_use]
    pub fn provider(mut self, provider: Provider) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Sets the defect table used for auto-detection on the fake platform.
    #[must_use]
    pub fn defect_table(mut self, table: DefectTable) -> Self {
        self.defect_table = table;
        self
    }
}
