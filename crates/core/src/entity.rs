//! Entity trait: identity that persists while state changes.

/// Entity marker + minimal interface.
///
/// A line item is the canonical entity of this domain: a bill tracks it by
/// id across quantity changes, and two items with the same id are the same
/// item no matter what their fields currently hold.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
