//! Event, FilteredEvent and Batch - the data flowing through the output pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Journal offset of an event
pub type Offset = u64;

/// Immutable record produced upstream
///
/// Owned by the journal for lifecycle purposes: the output pipeline never
/// deletes an event, it only marks its offset as committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Position in the durable input journal
    #[serde(default)]
    pub offset: Offset,

    /// Event timestamp
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,

    /// Originating host
    #[serde(default)]
    pub source: String,

    /// Short message
    pub message: String,

    /// Arbitrary additional fields
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,

    /// Logical streams this event is a member of
    #[serde(default)]
    pub streams: BTreeSet<String>,

    /// Index destinations this event belongs to
    #[serde(default)]
    pub destinations: BTreeSet<String>,
}

impl Event {
    /// Create an event with the given journal offset and message
    pub fn new(offset: Offset, message: impl Into<String>) -> Self {
        Self {
            offset,
            timestamp: Utc::now(),
            source: String::new(),
            message: message.into(),
            fields: BTreeMap::new(),
            streams: BTreeSet::new(),
            destinations: BTreeSet::new(),
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn with_stream(mut self, stream_id: impl Into<String>) -> Self {
        self.streams.insert(stream_id.into());
        self
    }

    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.destinations.insert(destination.into());
        self
    }
}

/// Result of normalization: an event plus its resolved routing metadata
///
/// Created per event on the producer task and only held transiently by the
/// batch buffer until flushed.
#[derive(Debug, Clone, PartialEq)]
pub struct FilteredEvent {
    event: Arc<Event>,
    destinations: BTreeSet<String>,
    streams: BTreeSet<String>,
}

impl FilteredEvent {
    /// Create with explicit routing metadata
    pub fn new(event: Event, destinations: BTreeSet<String>, streams: BTreeSet<String>) -> Self {
        Self {
            event: Arc::new(event),
            destinations,
            streams,
        }
    }

    /// Route the event to exactly the destinations and streams it declares
    pub fn from_event(event: Event) -> Self {
        let destinations = event.destinations.clone();
        let streams = event.streams.clone();
        Self::new(event, destinations, streams)
    }

    pub fn event(&self) -> &Event {
        &self.event
    }

    pub fn offset(&self) -> Offset {
        self.event.offset
    }

    pub fn destinations(&self) -> &BTreeSet<String> {
        &self.destinations
    }

    pub fn streams(&self) -> &BTreeSet<String> {
        &self.streams
    }

    /// Buffer weight of this event
    ///
    /// An event fanning out to several destinations counts once per
    /// destination; an event without destinations still counts once.
    #[inline]
    pub fn weight(&self) -> usize {
        self.destinations.len().max(1)
    }
}

/// Ordered sequence of filtered events collected between two flushes
///
/// A batch handed to an output is never empty; empty flushes are suppressed
/// by the dispatcher.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    events: Vec<FilteredEvent>,
}

impl Batch {
    pub fn new(events: Vec<FilteredEvent>) -> Self {
        Self { events }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[FilteredEvent] {
        &self.events
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FilteredEvent> {
        self.events.iter()
    }

    pub fn into_events(self) -> Vec<FilteredEvent> {
        self.events
    }

    /// Sum of the weights of all events
    pub fn weight(&self) -> usize {
        self.events.iter().map(FilteredEvent::weight).sum()
    }

    /// Highest journal offset present in the batch
    pub fn max_offset(&self) -> Option<Offset> {
        self.events.iter().map(FilteredEvent::offset).max()
    }
}

impl From<Vec<FilteredEvent>> for Batch {
    fn from(events: Vec<FilteredEvent>) -> Self {
        Self::new(events)
    }
}

impl<'a> IntoIterator for &'a Batch {
    type Item = &'a FilteredEvent;
    type IntoIter = std::slice::Iter<'a, FilteredEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weight_counts_destinations() {
        let plain = FilteredEvent::from_event(Event::new(1, "plain"));
        assert_eq!(plain.weight(), 1);

        let fanned = FilteredEvent::from_event(
            Event::new(2, "fanned")
                .with_destination("graylog_0")
                .with_destination("archive_0")
                .with_destination("audit_0"),
        );
        assert_eq!(fanned.weight(), 3);

        let batch = Batch::new(vec![plain, fanned]);
        assert_eq!(batch.weight(), 4);
    }

    #[test]
    fn test_max_offset() {
        let batch = Batch::new(vec![
            FilteredEvent::from_event(Event::new(7, "a")),
            FilteredEvent::from_event(Event::new(42, "b")),
            FilteredEvent::from_event(Event::new(13, "c")),
        ]);
        assert_eq!(batch.max_offset(), Some(42));
        assert_eq!(Batch::default().max_offset(), None);
    }

    #[test]
    fn test_event_deserialize_defaults() {
        let event: Event =
            serde_json::from_str(r#"{"message": "hello", "streams": ["errors"]}"#).unwrap();
        assert_eq!(event.offset, 0);
        assert!(event.streams.contains("errors"));
        assert!(event.destinations.is_empty());
    }
}
