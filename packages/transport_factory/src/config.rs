use std::num::NonZero;

use crate::constraint::{auto_detect, resolve_with};
use crate::{ConstraintLevel, ConstraintSpec, Error, Provider, Result, SystemPlatform};

/// The optional parameters shared by all factory builders.
#[derive(Clone, Debug, Default)]
pub(crate) struct FactoryConfig {
    pub(crate) worker_count: Option<usize>,
    pub(crate) provider: Option<Provider>,
    pub(crate) constraint_spec: ConstraintSpec,
    pub(crate) platform: Option<SystemPlatform>,
}

/// The configuration of a factory after defaults have been applied and the constraint level
/// has been resolved.
#[derive(Debug)]
pub(crate) struct ResolvedConfig {
    pub(crate) worker_count: NonZero<usize>,
    pub(crate) provider: Provider,
    pub(crate) level: ConstraintLevel,
}

impl FactoryConfig {
    /// Validates the configuration, applies platform defaults and resolves the constraint level.
    pub(crate) fn resolve(&self) -> Result<ResolvedConfig> {
        let platform = self.platform.as_ref().unwrap_or_else(|| SystemPlatform::current());

        let worker_count = match self.worker_count {
            Some(count) => NonZero::new(count).ok_or_else(|| Error::InvalidConfiguration {
                problem: format!("workerCount ({count}) must be a positive integer"),
            })?,
            None => platform.default_worker_count(),
        };

        let provider = self
            .provider
            .clone()
            .unwrap_or_else(|| platform.default_provider());

        let level = resolve_with(
            platform.defect_table(),
            provider.identity(),
            self.constraint_spec,
        )?;

        Ok(ResolvedConfig {
            worker_count,
            provider,
            level,
        })
    }
}

impl ResolvedConfig {
    /// Platform defaults with an explicit worker count and auto-detected constraint level.
    pub(crate) fn defaults(platform: &SystemPlatform, worker_count: NonZero<usize>) -> Self {
        let provider = platform.default_provider();
        let level = auto_detect(platform.defect_table(), provider.identity());

        Self {
            worker_count,
            provider,
            level,
        }
    }
}
