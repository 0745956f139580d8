//! Journal - durable input log offset marker

use crate::event::Offset;

/// Durable low-water mark of the input journal
///
/// `commit` must be idempotent and monotonic: committing an offset lower than
/// or equal to the current mark has no observable effect.
pub trait Journal: Send + Sync {
    /// Mark everything up to and including `offset` as no longer needing redelivery
    fn commit(&self, offset: Offset);

    /// Highest committed offset, if any
    fn committed(&self) -> Option<Offset>;
}
