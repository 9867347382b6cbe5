use crate::{ConstraintLevel, Provider};

/// Anything bound to the multiplexer provider and constraint level of a factory.
///
/// Factories, endpoints, workers and bosses all implement this. Everything created by one
/// factory reports the same provider and the same constraint level as the factory itself,
/// because the pair is resolved once when the factory is built and passed down from there.
pub trait MultiplexerEntity {
    /// The provider of the multiplexers that drive this entity.
    fn provider(&self) -> &Provider;

    /// The constraint level the multiplexers of this entity are driven under.
    fn constraint_level(&self) -> ConstraintLevel;

    /// Whether `other` uses the same provider under the same constraint level.
    fn shares_context_with(&self, other: &dyn MultiplexerEntity) -> bool {
        self.provider() == other.provider() && self.constraint_level() == other.constraint_level()
    }
}
