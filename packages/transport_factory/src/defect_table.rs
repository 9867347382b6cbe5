//! The table of known multiplexer defects, keyed by provider identity.

use std::borrow::Cow;
use std::sync::OnceLock;

use crate::{ConstraintLevel, ProviderIdentity};

/// The process-wide table, initialized on first access.
static GLOBAL_TABLE: OnceLock<DefectTable> = OnceLock::new();

/// Records which multiplexer providers have known defects and the constraint level each one
/// requires.
///
/// This table is the single place where platform-specific defects of the multiplexing primitive
/// are recorded. It is consulted by [`ConstraintSpec::AutoDetect`][crate::ConstraintSpec] when a
/// factory is built. Factory code never needs to change when entries are added.
///
/// The package ships no entries of its own. Applications that know about a defect in the
/// multiplexer they use install a table once at process start via [`DefectTable::install()`].
/// After the first resolution the process-wide table is fixed and cannot be mutated.
///
/// Rules are evaluated in the order they were added and the first matching rule wins, so add
/// version-specific rules before catch-all rules for the same provider.
///
/// # Example
///
/// ```
/// use transport_factory::{ConstraintLevel, DefectTable, ProviderIdentity};
///
/// let table = DefectTable::builder()
///     .versioned_rule("epoll", "2.6.", ConstraintLevel::new(2))
///     .rule("devpoll", ConstraintLevel::new(1))
///     .build();
///
/// let old_epoll = ProviderIdentity::new("epoll").with_version("2.6.32");
/// assert_eq!(table.lookup(&old_epoll), Some(ConstraintLevel::new(2)));
///
/// let new_epoll = ProviderIdentity::new("epoll").with_version("6.8.0");
/// assert_eq!(table.lookup(&new_epoll), None);
/// ```
#[derive(Clone, Debug, Default)]
pub struct DefectTable {
    rules: Vec<DefectRule>,
}

impl DefectTable {
    /// Creates a table with no entries. Every provider resolves to level 0 against it.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Creates a builder for assembling a table.
    #[must_use]
    pub fn builder() -> DefectTableBuilder {
        DefectTableBuilder::new()
    }

    /// Returns the process-wide table, initializing it to an empty table if nothing was
    /// installed before the first access.
    #[must_use]
    pub fn global() -> &'static Self {
        GLOBAL_TABLE.get_or_init(Self::empty)
    }

    /// Installs the process-wide table.
    ///
    /// This must happen before the first factory is built (or before anything else accesses
    /// [`DefectTable::global()`]), because the process-wide table is immutable once initialized.
    ///
    /// # Errors
    ///
    /// Returns the table back to the caller if the process-wide table was already initialized.
    pub fn install(table: Self) -> Result<(), Self> {
        GLOBAL_TABLE.set(table)
    }

    /// Returns the constraint level of the first rule matching the provider, if any.
    #[must_use]
    pub fn lookup(&self, identity: &ProviderIdentity) -> Option<ConstraintLevel> {
        self.rules
            .iter()
            .find(|rule| rule.matches(identity))
            .map(|rule| rule.level)
    }

    /// Returns the number of rules in the table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the table has no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Iterates over the rules in evaluation order.
    pub fn rules(&self) -> impl Iterator<Item = &DefectRule> {
        self.rules.iter()
    }
}

/// A single entry of a [`DefectTable`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DefectRule {
    provider_name: Cow<'static, str>,
    version_prefix: Option<Cow<'static, str>>,
    level: ConstraintLevel,
}

impl DefectRule {
    /// Creates a rule that applies to every version of the named provider.
    #[must_use]
    pub fn new(provider_name: impl Into<Cow<'static, str>>, level: ConstraintLevel) -> Self {
        Self {
            provider_name: provider_name.into(),
            version_prefix: None,
            level,
        }
    }

    /// Narrows the rule to provider versions that start with the given prefix.
    ///
    /// A provider that does not report a version never matches a narrowed rule.
    #[must_use]
    pub fn for_versions_starting_with(mut self, prefix: impl Into<Cow<'static, str>>) -> Self {
        self.version_prefix = Some(prefix.into());
        self
    }

    /// The name of the provider this rule applies to.
    #[must_use]
    pub fn provider_name(&self) -> &str {
        &self.provider_name
    }

    /// The version prefix this rule is narrowed to, if any.
    #[must_use]
    pub fn version_prefix(&self) -> Option<&str> {
        self.version_prefix.as_deref()
    }

    /// The constraint level required by matching providers.
    #[must_use]
    pub fn level(&self) -> ConstraintLevel {
        self.level
    }

    fn matches(&self, identity: &ProviderIdentity) -> bool {
        if identity.name() != self.provider_name {
            return false;
        }

        match (&self.version_prefix, identity.version()) {
            (None, _) => true,
            (Some(prefix), Some(version)) => version.starts_with(prefix.as_ref()),
            (Some(_), None) => false,
        }
    }
}

/// Assembles a [`DefectTable`].
///
/// Use [`DefectTable::builder()`] to create an instance.
#[derive(Clone, Debug, Default)]
pub struct DefectTableBuilder {
    rules: Vec<DefectRule>,
}

impl DefectTableBuilder {
    fn new() -> Self {
        Self::default()
    }

    /// Adds a rule that applies to every version of the named provider.
    #[must_use]
    pub fn rule(self, provider_name: impl Into<Cow<'static, str>>, level: ConstraintLevel) -> Self {
        self.with_rule(DefectRule::new(provider_name, level))
    }

    /// Adds a rule that applies to versions of the named provider starting with `prefix`.
    #[must_use]
    pub fn versioned_rule(
        self,
        provider_name: impl Into<Cow<'static, str>>,
        prefix: impl Into<Cow<'static, str>>,
        level: ConstraintLevel,
    ) -> Self {
        self.with_rule(DefectRule::new(provider_name, level).for_versions_starting_with(prefix))
    }

    /// Adds a prepared rule.
    #[must_use]
    pub fn with_rule(mut self, rule: DefectRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Builds the table.
    #[must_use]
    pub fn build(self) -> DefectTable {
        DefectTable { rules: self.rules }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn empty_table_matches_nothing() {
        let table = DefectTable::empty();

        assert!(table.is_empty());
        assert_eq!(table.lookup(&ProviderIdentity::new("epoll")), None);
    }

    #[test]
    fn first_matching_rule_wins() {
        let table = DefectTable::builder()
            .versioned_rule("epoll", "2.", ConstraintLevel::new(2))
            .rule("epoll", ConstraintLevel::new(1))
            .build();

        let old = ProviderIdentity::new("epoll").with_version("2.6.32");
        let new = ProviderIdentity::new("epoll").with_version("6.1.0");
        let unversioned = ProviderIdentity::new("epoll");

        assert_eq!(table.lookup(&old), Some(ConstraintLevel::new(2)));
        assert_eq!(table.lookup(&new), Some(ConstraintLevel::new(1)));
        assert_eq!(table.lookup(&unversioned), Some(ConstraintLevel::new(1)));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn versioned_rule_requires_version() {
        let table = DefectTable::builder()
            .versioned_rule("kqueue", "10.", ConstraintLevel::new(1))
            .build();

        assert_eq!(table.lookup(&ProviderIdentity::new("kqueue")), None);
    }

    #[test]
    fn provider_name_must_match_exactly() {
        let table = DefectTable::builder()
            .rule("epoll", ConstraintLevel::new(1))
            .build();

        assert_eq!(table.lookup(&ProviderIdentity::new("epoll2")), None);
        assert_eq!(table.lookup(&ProviderIdentity::new("EPOLL")), None);
    }

    #[test]
    fn rules_are_iterated_in_order() {
        let table = DefectTable::builder()
            .rule("a", ConstraintLevel::new(1))
            .rule("b", ConstraintLevel::new(2))
            .build();

        let names: Vec<_> = table.rules().map(DefectRule::provider_name).collect();
        assert_eq!(names, ["a", "b"]);
    }
}
