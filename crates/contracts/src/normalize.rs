//! Normalizer - turns a raw event into a routable FilteredEvent

use crate::{Event, FilteredEvent};

/// Filtering/transform step applied on the producer task before buffering
///
/// Failures are handled upstream; an event reaching `normalize` always yields
/// a `FilteredEvent`.
pub trait Normalizer: Send + Sync {
    fn normalize(&self, event: Event) -> FilteredEvent;
}

impl<F> Normalizer for F
where
    F: Fn(Event) -> FilteredEvent + Send + Sync,
{
    fn normalize(&self, event: Event) -> FilteredEvent {
        self(event)
    }
}

/// Routes every event to exactly the destinations and streams it declares
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughNormalizer;

impl Normalizer for PassthroughNormalizer {
    fn normalize(&self, event: Event) -> FilteredEvent {
        FilteredEvent::from_event(event)
    }
}
