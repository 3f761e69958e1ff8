//! Entity trait: identity + continuity across snapshots.

/// Entity marker + minimal interface.
///
/// Snapshots fetched at different times describe the same entity when their
/// ids are equal, regardless of how their attributes differ.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Copy + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> Self::Id;
}
