//! WeightedBuffer - accumulator of filtered events measured in weight units
//!
//! Every swap (capacity reached, stale check, forced flush) happens under the
//! same lock as `append`, so an event ends up in exactly one returned batch.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use contracts::{Batch, Clock, FilteredEvent};

/// Upper bound on the vector capacity reserved per swap
const MAX_PREALLOCATED: usize = 4096;

struct Live {
    events: Vec<FilteredEvent>,
    weight: usize,
    last_flush: Instant,
}

/// Thread-safe weighted batch buffer
pub struct WeightedBuffer {
    live: Mutex<Live>,
    capacity: usize,
    clock: Arc<dyn Clock>,
}

impl WeightedBuffer {
    /// Create a buffer flushing once the accumulated weight reaches `capacity`
    pub fn new(capacity: usize, clock: Arc<dyn Clock>) -> Self {
        let capacity = capacity.max(1);
        Self {
            live: Mutex::new(Live {
                events: Vec::with_capacity(capacity.min(MAX_PREALLOCATED)),
                weight: 0,
                last_flush: clock.now(),
            }),
            capacity,
            clock,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append one event
    ///
    /// Returns the full batch when this append made the weight reach capacity;
    /// the caller is expected to dispatch it.
    pub fn append(&self, event: FilteredEvent) -> Option<Batch> {
        let mut live = self.lock();
        live.weight += event.weight();
        live.events.push(event);
        if live.weight >= self.capacity {
            Some(self.swap(&mut live))
        } else {
            observability::record_buffer_weight(live.weight);
            None
        }
    }

    /// Swap out the live batch if no flush happened for at least `interval`
    ///
    /// The returned batch may be empty; the timer is reset only on a swap.
    pub fn flush_if_stale(&self, interval: Duration) -> Batch {
        let mut live = self.lock();
        let now = self.clock.now();
        if now.saturating_duration_since(live.last_flush) >= interval {
            self.swap(&mut live)
        } else {
            Batch::default()
        }
    }

    /// Unconditional swap
    pub fn force_flush(&self) -> Batch {
        let mut live = self.lock();
        self.swap(&mut live)
    }

    /// Number of pending events
    pub fn len(&self) -> usize {
        self.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Accumulated weight of pending events
    pub fn weight(&self) -> usize {
        self.lock().weight
    }

    fn swap(&self, live: &mut Live) -> Batch {
        let events = std::mem::replace(
            &mut live.events,
            Vec::with_capacity(self.capacity.min(MAX_PREALLOCATED)),
        );
        live.weight = 0;
        observability::record_buffer_weight(0);
        live.last_flush = self.clock.now();
        Batch::new(events)
    }

    fn lock(&self) -> MutexGuard<'_, Live> {
        self.live.lock().unwrap_or_else(|e| e.into_inner())
    }
}
