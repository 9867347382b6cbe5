use std::num::NonZero;

use crate::fake::{FakePlatformBuilder, FakeProvider};
use crate::pal::Platform;
use crate::{DefectTable, Provider};

/// Fake platform that reports whatever the builder was configured with.
#[derive(Debug)]
pub(crate) struct FakePlatform {
    processor_count: NonZero<usize>,
    default_provider: Provider,
    defect_table: DefectTable,
}

impl FakePlatform {
    pub(crate) fn from_builder(builder: &FakePlatformBuilder) -> Self {
        Self {
            processor_count: builder.processor_count,
            default_provider: builder
                .provider
                .clone()
                .unwrap_or_else(|| Provider::new(FakeProvider::new("fake"))),
            defect_table: builder.defect_table.clone(),
        }
    }
}

impl Platform for FakePlatform {
    fn default_provider(&self) -> Provider {
        self.default_provider.clone()
    }

    fn processor_count(&self) -> NonZero<usize> {
        self.processor_count
    }

    fn defect_table(&self) -> &DefectTable {
        &self.defect_table
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use new_zealand::nz;

    use super::*;
    use crate::ConstraintLevel;

    #[test]
    fn reports_configured_values() {
        let provider = Provider::new(FakeProvider::new("kqueue"));
        let builder = FakePlatformBuilder::new()
            .processor_count(nz!(7))
            .provider(provider.clone())
            .defect_table(
                DefectTable::builder()
                    .rule("kqueue", ConstraintLevel::new(1))
                    .build(),
            );

        let platform = FakePlatform::from_builder(&builder);

        assert_eq!(platform.processor_count().get(), 7);
        assert_eq!(platform.default_provider(), provider);
        assert_eq!(platform.defect_table().len(), 1);
    }

    #[test]
    fn default_provider_is_stable() {
        let platform = FakePlatform::from_builder(&FakePlatformBuilder::new());

        assert_eq!(platform.default_provider(), platform.default_provider());
        assert_eq!(platform.default_provider().identity().name(), "fake");
        assert!(platform.defect_table().is_empty());
    }
}
