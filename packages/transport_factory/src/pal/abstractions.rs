use std::fmt::Debug;
use std::num::NonZero;

use crate::{DefectTable, Provider};

pub(crate) trait Platform: Debug + Send + Sync + 'static {
    /// The provider used by factories that do not have one explicitly configured.
    fn default_provider(&self) -> Provider;

    /// The number of logical processors available to the process.
    fn processor_count(&self) -> NonZero<usize>;

    /// The table consulted when the constraint level is auto-detected.
    fn defect_table(&self) -> &DefectTable;
}
