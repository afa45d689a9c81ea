//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Monetary amounts are the canonical case: two `Money` values with the same
/// amount and currency are interchangeable, and changing one means replacing
/// it with a new value, never editing it in place.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
