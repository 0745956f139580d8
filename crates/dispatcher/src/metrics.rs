//! Dispatcher metrics for observability
//!
//! Counters live in-process so tests and the CLI summary can read them; every
//! update is mirrored into the `metrics` facade through `observability`.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use observability::{RunningStats, StatsSummary};

/// What requested a flush
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    /// Buffer weight reached capacity on a producer
    Capacity,
    /// Periodic stale check
    Interval,
    /// Final forced flush on stop
    Shutdown,
}

impl FlushTrigger {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Capacity => "capacity",
            Self::Interval => "interval",
            Self::Shutdown => "shutdown",
        }
    }
}

/// Metrics of one dispatcher instance
#[derive(Debug, Default)]
pub struct DispatcherMetrics {
    flushes_requested: AtomicU64,
    flushes_completed: AtomicU64,
    events_dispatched: AtomicU64,
    sink_failures: AtomicU64,
    shutdown_timeouts: AtomicU64,
    last_flush_us: AtomicU64,
    total_flush_us: AtomicU64,
    failures_by_sink: Mutex<BTreeMap<String, u64>>,
    batch_sizes: Mutex<RunningStats>,
}

impl DispatcherMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a non-empty batch handed to dispatch
    pub fn record_flush_requested(&self, trigger: FlushTrigger) {
        self.flushes_requested.fetch_add(1, Ordering::Relaxed);
        observability::record_flush_requested(trigger.as_str());
    }

    /// Count a batch whose sinks were all attempted and whose offset was committed
    pub fn record_flush_completed(&self, batch_size: usize, batch_weight: usize, elapsed_us: u64) {
        self.flushes_completed.fetch_add(1, Ordering::Relaxed);
        self.events_dispatched
            .fetch_add(batch_size as u64, Ordering::Relaxed);
        self.last_flush_us.store(elapsed_us, Ordering::Relaxed);
        self.total_flush_us.fetch_add(elapsed_us, Ordering::Relaxed);
        self.batch_sizes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(batch_size as f64);
        observability::record_flush_completed(batch_size, batch_weight, elapsed_us as f64 / 1000.0);
    }

    /// Count one delivery attempt to a sink
    pub fn record_delivery(&self, sink: &str, success: bool) {
        if !success {
            self.sink_failures.fetch_add(1, Ordering::Relaxed);
            *self
                .failures_by_sink
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .entry(sink.to_string())
                .or_default() += 1;
        }
        observability::record_output_delivery(sink, success);
    }

    pub fn record_shutdown_timeout(&self) {
        self.shutdown_timeouts.fetch_add(1, Ordering::Relaxed);
        observability::record_shutdown_timeout();
    }

    pub fn flushes_requested(&self) -> u64 {
        self.flushes_requested.load(Ordering::Relaxed)
    }

    pub fn flushes_completed(&self) -> u64 {
        self.flushes_completed.load(Ordering::Relaxed)
    }

    pub fn events_dispatched(&self) -> u64 {
        self.events_dispatched.load(Ordering::Relaxed)
    }

    /// Failures recorded for one sink
    pub fn failures_for(&self, sink: &str) -> u64 {
        self.failures_by_sink
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(sink)
            .copied()
            .unwrap_or(0)
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            flushes_requested: self.flushes_requested(),
            flushes_completed: self.flushes_completed(),
            events_dispatched: self.events_dispatched(),
            sink_failures: self.sink_failures.load(Ordering::Relaxed),
            shutdown_timeouts: self.shutdown_timeouts.load(Ordering::Relaxed),
            last_flush_us: self.last_flush_us.load(Ordering::Relaxed),
            total_flush_us: self.total_flush_us.load(Ordering::Relaxed),
            failures_by_sink: self
                .failures_by_sink
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone(),
            batch_size: self
                .batch_sizes
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .summary(),
        }
    }
}

/// Snapshot of dispatcher metrics (for reporting)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsSnapshot {
    pub flushes_requested: u64,
    pub flushes_completed: u64,
    pub events_dispatched: u64,
    pub sink_failures: u64,
    pub shutdown_timeouts: u64,
    pub last_flush_us: u64,
    pub total_flush_us: u64,
    pub failures_by_sink: BTreeMap<String, u64>,
    pub batch_size: StatsSummary,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot() {
        let metrics = DispatcherMetrics::new();
        metrics.record_flush_requested(FlushTrigger::Capacity);
        metrics.record_flush_requested(FlushTrigger::Interval);
        metrics.record_flush_completed(3, 4, 120);
        metrics.record_delivery("index", true);
        metrics.record_delivery("archive", false);
        metrics.record_delivery("archive", false);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.flushes_requested, 2);
        assert_eq!(snapshot.flushes_completed, 1);
        assert_eq!(snapshot.events_dispatched, 3);
        assert_eq!(snapshot.sink_failures, 2);
        assert_eq!(snapshot.failures_by_sink.get("archive"), Some(&2));
        assert_eq!(metrics.failures_for("index"), 0);
        assert_eq!(snapshot.last_flush_us, 120);
        assert_eq!(snapshot.batch_size.count, 1);
    }
}
