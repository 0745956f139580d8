//! BatchedDispatcher - weighted buffer with scheduler-driven stale flush
//!
//! The producer whose append reaches capacity dispatches that batch itself,
//! synchronously. A single periodic task flushes stale batches. Dispatch is
//! best-effort per sink and always ends with an offset commit.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use contracts::{ClusterHealth, Event, Normalizer, OutputBufferConfig};
use tokio::runtime::Handle;
use tracing::{debug, info, instrument, warn};

use crate::buffer::WeightedBuffer;
use crate::dispatcher::{drain_within, BatchDispatcher, DispatcherState, Lifecycle, Parts};
use crate::error::DispatcherError;
use crate::fanout::Fanout;
use crate::metrics::{FlushTrigger, MetricsSnapshot};
use crate::scheduler::PeriodicTask;

struct Shared {
    buffer: WeightedBuffer,
    fanout: Fanout,
}

impl Shared {
    async fn flush_stale(&self, interval: std::time::Duration) {
        let batch = self.buffer.flush_if_stale(interval);
        if !batch.is_empty() {
            self.fanout.dispatch(&batch, FlushTrigger::Interval).await;
        }
    }

    /// Final flush, skipped while the cluster is unreachable
    async fn flush_all(&self, health: &dyn ClusterHealth) {
        if !health.is_healthy().await {
            warn!(
                pending = self.buffer.len(),
                "Cluster unreachable, skipping final flush"
            );
            return;
        }
        let batch = self.buffer.force_flush();
        self.fanout.dispatch(&batch, FlushTrigger::Shutdown).await;
    }
}

/// Current batched dispatcher
pub struct BatchedDispatcher {
    shared: Arc<Shared>,
    config: OutputBufferConfig,
    normalizer: Arc<dyn Normalizer>,
    health: Arc<dyn ClusterHealth>,
    runtime: Handle,
    lifecycle: Lifecycle,
    periodic: Mutex<Option<PeriodicTask>>,
}

impl BatchedDispatcher {
    pub(crate) fn from_parts(parts: Parts) -> Self {
        let buffer = WeightedBuffer::new(parts.config.batch_size, parts.clock);
        Self {
            shared: Arc::new(Shared {
                buffer,
                fanout: parts.fanout,
            }),
            config: parts.config,
            normalizer: parts.normalizer,
            health: parts.health,
            runtime: parts.runtime,
            lifecycle: Lifecycle::new(),
            periodic: Mutex::new(None),
        }
    }

    /// Run one stale check now, as the periodic task would
    pub async fn flush_if_stale(&self) {
        self.shared.flush_stale(self.config.flush_interval()).await;
    }

    /// Accumulated weight of pending events
    pub fn pending_weight(&self) -> usize {
        self.shared.buffer.weight()
    }
}

#[async_trait]
impl BatchDispatcher for BatchedDispatcher {
    async fn write(&self, event: Event) -> Result<(), DispatcherError> {
        self.lifecycle.ensure_writable()?;
        let filtered = self.normalizer.normalize(event);
        if let Some(batch) = self.shared.buffer.append(filtered) {
            self.shared
                .fanout
                .dispatch(&batch, FlushTrigger::Capacity)
                .await;
        }
        Ok(())
    }

    #[instrument(name = "batched_dispatcher_initialize", skip(self))]
    fn initialize(&self) -> Result<(), DispatcherError> {
        if !self.lifecycle.start()? {
            return Ok(());
        }
        let interval = self.config.flush_interval();
        let shared = Arc::clone(&self.shared);
        let task = PeriodicTask::spawn(&self.runtime, "stale_flush", interval, move || {
            let shared = Arc::clone(&shared);
            async move { shared.flush_stale(interval).await }
        });
        *self.periodic.lock().unwrap_or_else(|e| e.into_inner()) = Some(task);

        info!(
            batch_size = self.config.batch_size,
            flush_interval_ms = self.config.flush_interval_ms,
            sinks = self.shared.fanout.outputs().len(),
            "Batched dispatcher started"
        );
        Ok(())
    }

    #[instrument(name = "batched_dispatcher_stop", skip(self))]
    async fn stop(&self) {
        if !self.lifecycle.begin_stop() {
            return;
        }
        let periodic = self.periodic.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(task) = periodic {
            task.cancel();
        }

        // The health check counts against the shutdown budget
        let shared = Arc::clone(&self.shared);
        let health = Arc::clone(&self.health);
        drain_within(
            &self.runtime,
            self.config.shutdown_timeout(),
            self.shared.fanout.metrics(),
            async move { shared.flush_all(health.as_ref()).await },
        )
        .await;

        self.lifecycle.finish_stop();
        debug!(snapshot = ?self.metrics(), "Batched dispatcher stopped");
    }

    fn state(&self) -> DispatcherState {
        self.lifecycle.get()
    }

    fn pending(&self) -> usize {
        self.shared.buffer.len()
    }

    fn metrics(&self) -> MetricsSnapshot {
        self.shared.fanout.metrics().snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::DispatcherBuilder;
    use crate::fanout::testing::{HangingOutput, RecordingOutput};
    use crate::health::ToggleHealth;
    use crate::journal::MemoryJournal;
    use contracts::{FilteredEvent, Journal, ManualClock};
    use std::time::{Duration, Instant};

    fn config(batch_size: usize) -> OutputBufferConfig {
        OutputBufferConfig {
            batch_size,
            flush_interval_ms: 1_000,
            shutdown_timeout_ms: 200,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_capacity_flush_on_producer() {
        let out = RecordingOutput::new("out");
        let journal = Arc::new(MemoryJournal::new());
        let dispatcher = DispatcherBuilder::new(config(3))
            .output(out.clone())
            .journal(journal.clone())
            .build_batched()
            .unwrap();

        dispatcher.write(Event::new(1, "a")).await.unwrap();
        dispatcher.write(Event::new(2, "b")).await.unwrap();
        assert_eq!(out.batch_count(), 0);
        dispatcher
            .write(Event::new(3, "c").with_destination("x").with_destination("y"))
            .await
            .unwrap();

        assert_eq!(out.offsets(), vec![1, 2, 3]);
        assert_eq!(journal.committed(), Some(3));
        assert_eq!(dispatcher.pending(), 0);
        assert_eq!(dispatcher.metrics().flushes_completed, 1);
    }

    #[tokio::test]
    async fn test_normalizer_applied() {
        let out = RecordingOutput::new("out");
        let normalizer = |event: Event| FilteredEvent::from_event(event.with_destination("a").with_destination("b"));
        let dispatcher = DispatcherBuilder::new(config(4))
            .output(out.clone())
            .normalizer(Arc::new(normalizer))
            .build_batched()
            .unwrap();

        dispatcher.write(Event::new(1, "a")).await.unwrap();
        assert_eq!(dispatcher.pending_weight(), 2);
        dispatcher.write(Event::new(2, "b")).await.unwrap();
        assert_eq!(out.offsets(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_stale_flush_uses_clock() {
        let out = RecordingOutput::new("out");
        let clock = Arc::new(ManualClock::new());
        let dispatcher = DispatcherBuilder::new(config(100))
            .output(out.clone())
            .clock(clock.clone())
            .build_batched()
            .unwrap();

        dispatcher.write(Event::new(1, "a")).await.unwrap();
        clock.advance(Duration::from_millis(999));
        dispatcher.flush_if_stale().await;
        assert_eq!(out.batch_count(), 0);

        clock.advance(Duration::from_millis(2));
        dispatcher.flush_if_stale().await;
        assert_eq!(out.offsets(), vec![1]);
    }

    #[tokio::test]
    async fn test_periodic_task_flushes_without_writes() {
        let out = RecordingOutput::new("out");
        let mut config = config(100);
        config.flush_interval_ms = 20;
        let dispatcher = DispatcherBuilder::new(config)
            .output(out.clone())
            .build_batched()
            .unwrap();
        dispatcher.initialize().unwrap();
        dispatcher.write(Event::new(7, "lonely")).await.unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while out.batch_count() == 0 && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(out.offsets(), vec![7]);
        dispatcher.stop().await;
    }

    #[tokio::test]
    async fn test_stop_flushes_pending_and_refuses_writes() {
        let out = RecordingOutput::new("out");
        let dispatcher = DispatcherBuilder::new(config(100))
            .output(out.clone())
            .build_batched()
            .unwrap();
        dispatcher.initialize().unwrap();
        dispatcher.write(Event::new(1, "a")).await.unwrap();

        dispatcher.stop().await;
        assert_eq!(out.offsets(), vec![1]);
        assert_eq!(dispatcher.state(), DispatcherState::Stopped);
        assert!(matches!(
            dispatcher.write(Event::new(2, "late")).await,
            Err(DispatcherError::NotRunning { .. })
        ));
        assert!(matches!(
            dispatcher.initialize(),
            Err(DispatcherError::AlreadyStopped)
        ));
    }

    #[tokio::test]
    async fn test_stop_bounded_by_shutdown_timeout() {
        let dispatcher = DispatcherBuilder::new(config(100))
            .output(Arc::new(HangingOutput("stuck")))
            .build_batched()
            .unwrap();
        dispatcher.initialize().unwrap();
        dispatcher.write(Event::new(1, "a")).await.unwrap();

        let started = Instant::now();
        dispatcher.stop().await;
        let elapsed = started.elapsed();

        assert!(elapsed >= Duration::from_millis(200));
        assert!(elapsed < Duration::from_millis(1_200), "stop took {:?}", elapsed);
        assert_eq!(dispatcher.metrics().shutdown_timeouts, 1);
        assert_eq!(dispatcher.state(), DispatcherState::Stopped);
    }

    #[tokio::test]
    async fn test_unhealthy_cluster_skips_final_flush() {
        let out = RecordingOutput::new("out");
        let dispatcher = DispatcherBuilder::new(config(100))
            .output(out.clone())
            .health(Arc::new(ToggleHealth::new(false)))
            .build_batched()
            .unwrap();
        dispatcher.write(Event::new(1, "a")).await.unwrap();

        dispatcher.stop().await;
        assert_eq!(out.batch_count(), 0);
        assert_eq!(dispatcher.pending(), 1);
        assert_eq!(dispatcher.state(), DispatcherState::Stopped);
    }

    struct UnresponsiveHealth;

    #[async_trait]
    impl ClusterHealth for UnresponsiveHealth {
        async fn is_healthy(&self) -> bool {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_health_check_counts_against_shutdown_timeout() {
        let out = RecordingOutput::new("out");
        let dispatcher = DispatcherBuilder::new(config(100))
            .output(out.clone())
            .health(Arc::new(UnresponsiveHealth))
            .build_batched()
            .unwrap();
        dispatcher.write(Event::new(1, "a")).await.unwrap();

        let started = Instant::now();
        tokio::time::timeout(Duration::from_secs(2), dispatcher.stop())
            .await
            .unwrap();
        assert!(started.elapsed() < Duration::from_millis(1_200), "stop took {:?}", started.elapsed());
        assert_eq!(dispatcher.metrics().shutdown_timeouts, 1);
        assert_eq!(out.batch_count(), 0);
        assert_eq!(dispatcher.state(), DispatcherState::Stopped);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_producers_commit_everything() {
        let out = RecordingOutput::new("out");
        let journal = Arc::new(MemoryJournal::new());
        let dispatcher = Arc::new(
            DispatcherBuilder::new(config(16))
                .output(out.clone())
                .journal(journal.clone())
                .build_batched()
                .unwrap(),
        );
        dispatcher.initialize().unwrap();

        let mut producers = Vec::new();
        for p in 0..4u64 {
            let dispatcher = Arc::clone(&dispatcher);
            producers.push(tokio::spawn(async move {
                for i in 0..250u64 {
                    dispatcher.write(Event::new(p * 250 + i, "m")).await.unwrap();
                }
            }));
        }
        for producer in producers {
            producer.await.unwrap();
        }
        dispatcher.stop().await;

        let mut offsets = out.offsets();
        offsets.sort_unstable();
        assert_eq!(offsets, (0..1000).collect::<Vec<_>>());
        assert_eq!(journal.committed(), Some(999));
    }
}
