//! Resolution of the constraint level that governs how a multiplexer may be driven.

use std::env::{self, VarError};
use std::result;
use std::str::FromStr;

use derive_more::derive::Display;

use crate::{DefectTable, Error, ProviderIdentity, Result};

/// Name of the environment variable read by [`ConstraintSpec::from_env()`].
pub const CONSTRAINT_SPEC_ENV_VAR: &str = "TRANSPORT_FACTORY_CONSTRAINT_SPEC";

/// Describes how strictly concurrent access to a multiplexer must be serialized due to known
/// defects of the platform's multiplexing primitive.
///
/// Level 0 means there is no known restriction on driving the multiplexer from multiple threads
/// concurrently. Positive values require that registration of new interest is serialized against
/// the worker that drains registrations, so that wake-up calls cannot race with it.
///
/// A factory computes its constraint level once and every object it creates reports the same
/// value for the lifetime of the factory.
#[derive(Clone, Copy, Debug, Default, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[display("{_0}")]
pub struct ConstraintLevel(u32);

impl ConstraintLevel {
    /// No known restrictions on how the multiplexer may be driven.
    pub const UNCONSTRAINED: Self = Self(0);

    /// Creates a constraint level with the given numeric value.
    #[must_use]
    pub const fn new(level: u32) -> Self {
        Self(level)
    }

    /// Returns the numeric value of the constraint level.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Whether registrations must be serialized against the multiplexer's owning loop.
    #[must_use]
    pub const fn requires_serialized_registration(self) -> bool {
        self.0 > 0
    }
}

/// The strategy used to determine the constraint level of a factory.
///
/// The default is [`ConstraintSpec::AutoDetect`].
///
/// # Example
///
/// ```
/// use transport_factory::{ConstraintLevel, ConstraintSpec, ProviderIdentity, resolve};
///
/// let identity = ProviderIdentity::new("epoll");
///
/// let forced = resolve(&identity, ConstraintSpec::Force(3)).unwrap();
/// assert_eq!(forced, ConstraintLevel::new(3));
///
/// let none = resolve(&identity, ConstraintSpec::None).unwrap();
/// assert_eq!(none, ConstraintLevel::UNCONSTRAINED);
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum ConstraintSpec {
    /// Look up the provider in the process-wide [`DefectTable`]. Providers without an entry
    /// resolve to level 0.
    #[default]
    AutoDetect,

    /// Use the given level as-is, bypassing the defect table. Negative values are rejected
    /// when the factory is built.
    Force(i64),

    /// Assume the provider has no defects that require a workaround (level 0).
    None,
}

impl ConstraintSpec {
    /// Reads the constraint specification from the `TRANSPORT_FACTORY_CONSTRAINT_SPEC`
    /// environment variable.
    ///
    /// Accepted values are `auto`, `none` or a non-negative integer that forces that level.
    /// If the variable is not set, [`ConstraintSpec::AutoDetect`] is returned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if the variable is set to anything else.
    pub fn from_env() -> Result<Self> {
        Self::from_env_value(env::var(CONSTRAINT_SPEC_ENV_VAR))
    }

    fn from_env_value(value: result::Result<String, VarError>) -> Result<Self> {
        match value {
            Ok(value) => value.parse(),
            Err(VarError::NotPresent) => Ok(Self::AutoDetect),
            Err(VarError::NotUnicode(value)) => Err(Error::InvalidConfiguration {
                problem: format!(
                    "{CONSTRAINT_SPEC_ENV_VAR} is not valid Unicode: {}",
                    value.to_string_lossy()
                ),
            }),
        }
    }
}

impl FromStr for ConstraintSpec {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        let trimmed = value.trim();

        if trimmed.eq_ignore_ascii_case("auto") {
            return Ok(Self::AutoDetect);
        }

        if trimmed.eq_ignore_ascii_case("none") {
            return Ok(Self::None);
        }

        match trimmed.parse::<i64>() {
            Ok(level) if level >= 0 => Ok(Self::Force(level)),
            _ => Err(Error::InvalidConfiguration {
                problem: format!(
                    "constraint spec '{value}' must be 'auto', 'none' or a non-negative integer"
                ),
            }),
        }
    }
}

/// Resolves the constraint level for a provider using the process-wide [`DefectTable`].
///
/// This is deterministic and has no side effects beyond lazily initializing the process-wide
/// table to an empty one if nothing was installed.
///
/// # Errors
///
/// Returns [`Error::InvalidConfiguration`] if the spec forces a level that is negative or
/// does not fit in a `u32`.
pub fn resolve(identity: &ProviderIdentity, spec: ConstraintSpec) -> Result<ConstraintLevel> {
    resolve_with(DefectTable::global(), identity, spec)
}

/// Resolves the constraint level for a provider using the given defect table.
///
/// # Errors
///
/// Returns [`Error::InvalidConfiguration`] if the spec forces a level that is negative or
/// does not fit in a `u32`.
pub fn resolve_with(
    table: &DefectTable,
    identity: &ProviderIdentity,
    spec: ConstraintSpec,
) -> Result<ConstraintLevel> {
    match spec {
        ConstraintSpec::None => Ok(ConstraintLevel::UNCONSTRAINED),
        ConstraintSpec::Force(level) => match u32::try_from(level) {
            Ok(level) => Ok(ConstraintLevel::new(level)),
            Err(_overflow) => Err(Error::InvalidConfiguration {
                problem: format!(
                    "forced constraint level ({level}) must be between 0 and {}",
                    u32::MAX
                ),
            }),
        },
        ConstraintSpec::AutoDetect => Ok(auto_detect(table, identity)),
    }
}

/// The level required by the first matching rule of the table. Providers without a matching
/// rule are unconstrained.
pub(crate) fn auto_detect(table: &DefectTable, identity: &ProviderIdentity) -> ConstraintLevel {
    table
        .lookup(identity)
        .unwrap_or(ConstraintLevel::UNCONSTRAINED)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn table_with_epoll_defect() -> DefectTable {
        DefectTable::builder()
            .rule("epoll", ConstraintLevel::new(2))
            .build()
    }

    #[test]
    fn none_is_always_unconstrained() {
        let table = table_with_epoll_defect();

        for name in ["epoll", "kqueue", "something-else"] {
            let level =
                resolve_with(&table, &ProviderIdentity::new(name), ConstraintSpec::None).unwrap();
            assert_eq!(level, ConstraintLevel::UNCONSTRAINED);
        }
    }

    #[test]
    fn force_bypasses_table() {
        let table = table_with_epoll_defect();

        for name in ["epoll", "kqueue"] {
            let level =
                resolve_with(&table, &ProviderIdentity::new(name), ConstraintSpec::Force(3))
                    .unwrap();
            assert_eq!(level.get(), 3);
        }
    }

    #[test]
    fn force_zero_is_allowed() {
        let level = resolve(&ProviderIdentity::new("poll"), ConstraintSpec::Force(0)).unwrap();
        assert_eq!(level, ConstraintLevel::UNCONSTRAINED);
    }

    #[test]
    fn force_negative_is_invalid() {
        let result = resolve(&ProviderIdentity::new("poll"), ConstraintSpec::Force(-1));
        assert!(matches!(result, Err(Error::InvalidConfiguration { .. })));
    }

    #[test]
    fn force_too_large_is_invalid() {
        let result = resolve(
            &ProviderIdentity::new("poll"),
            ConstraintSpec::Force(i64::from(u32::MAX) + 1),
        );
        assert!(matches!(result, Err(Error::InvalidConfiguration { .. })));
    }

    #[test]
    fn auto_detect_uses_table_entry() {
        let table = table_with_epoll_defect();

        let level = resolve_with(
            &table,
            &ProviderIdentity::new("epoll"),
            ConstraintSpec::AutoDetect,
        )
        .unwrap();
        assert_eq!(level.get(), 2);
    }

    #[test]
    fn auto_detect_unknown_provider_is_unconstrained() {
        let table = table_with_epoll_defect();

        let level = resolve_with(
            &table,
            &ProviderIdentity::new("kqueue"),
            ConstraintSpec::AutoDetect,
        )
        .unwrap();
        assert_eq!(level, ConstraintLevel::UNCONSTRAINED);
    }

    #[test]
    fn default_spec_is_auto_detect() {
        assert_eq!(ConstraintSpec::default(), ConstraintSpec::AutoDetect);
    }

    #[test]
    fn parse_accepts_known_forms() {
        assert_eq!(
            "auto".parse::<ConstraintSpec>().unwrap(),
            ConstraintSpec::AutoDetect
        );
        assert_eq!(" NONE ".parse::<ConstraintSpec>().unwrap(), ConstraintSpec::None);
        assert_eq!(
            "2".parse::<ConstraintSpec>().unwrap(),
            ConstraintSpec::Force(2)
        );
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!("-1".parse::<ConstraintSpec>().is_err());
        assert!("sometimes".parse::<ConstraintSpec>().is_err());
        assert!("".parse::<ConstraintSpec>().is_err());
    }

    #[test]
    fn unset_env_var_is_auto_detect() {
        let spec = ConstraintSpec::from_env_value(Err(VarError::NotPresent)).unwrap();
        assert_eq!(spec, ConstraintSpec::AutoDetect);
    }

    #[test]
    fn env_var_value_is_parsed() {
        let forced = ConstraintSpec::from_env_value(Ok("4".to_string())).unwrap();
        let none = ConstraintSpec::from_env_value(Ok("none".to_string())).unwrap();

        assert_eq!(forced, ConstraintSpec::Force(4));
        assert_eq!(none, ConstraintSpec::None);
    }

    #[test]
    fn garbage_env_var_is_invalid() {
        let result = ConstraintSpec::from_env_value(Ok("often".to_string()));

        assert!(matches!(
            result,
            Err(Error::InvalidConfiguration { ref problem }) if problem.contains("often")
        ));
    }

    #[test]
    #[cfg(unix)]
    fn non_unicode_env_var_is_invalid() {
        use std::ffi::OsString;
        use std::os::unix::ffi::OsStringExt;

        let value = OsString::from_vec(vec![b'1', 0xFF]);
        let result = ConstraintSpec::from_env_value(Err(VarError::NotUnicode(value)));

        assert!(matches!(
            result,
            Err(Error::InvalidConfiguration { ref problem })
                if problem.contains(CONSTRAINT_SPEC_ENV_VAR)
        ));
    }

    #[test]
    fn serialized_registration_only_above_zero() {
        assert!(!ConstraintLevel::UNCONSTRAINED.requires_serialized_registration());
        assert!(ConstraintLevel::new(1).requires_serialized_registration());
    }
}
