//! BlockingDispatcher - legacy double-buffer dispatcher
//!
//! Differs from [`crate::BatchedDispatcher`]:
//! - capacity counts raw events, not weight
//! - every flush first waits until the downstream cluster reports healthy,
//!   so a write can stall for as long as the cluster is down
//! - the stale check runs on every write instead of on a timer; without
//!   traffic a small pending batch waits for the next write

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use contracts::{Batch, ClusterHealth, Clock, Event, FilteredEvent, Normalizer};
use tokio::runtime::Handle;
use tracing::{debug, info, instrument, warn};

use crate::dispatcher::{drain_within, BatchDispatcher, DispatcherState, Lifecycle, Parts};
use crate::error::DispatcherError;
use crate::fanout::Fanout;
use crate::metrics::{FlushTrigger, MetricsSnapshot};

struct DoubleBuffer {
    active: Vec<FilteredEvent>,
    /// Emptied vector waiting to become active again
    standby: Vec<FilteredEvent>,
    last_flush: Instant,
}

struct Shared {
    buffers: Mutex<DoubleBuffer>,
    capacity: usize,
    flush_interval: Duration,
    clock: Arc<dyn Clock>,
    health: Arc<dyn ClusterHealth>,
    fanout: Fanout,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, DoubleBuffer> {
        self.buffers.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Swap active and standby; caller holds the lock
    fn swap(&self, buffers: &mut DoubleBuffer) -> Batch {
        let mut full = std::mem::take(&mut buffers.standby);
        std::mem::swap(&mut full, &mut buffers.active);
        buffers.last_flush = self.clock.now();
        Batch::new(full)
    }

    fn is_stale(&self, buffers: &DoubleBuffer) -> bool {
        self.clock.now().saturating_duration_since(buffers.last_flush) >= self.flush_interval
    }

    /// Wait for cluster health, dispatch, then recycle the vector as standby
    async fn flush(&self, batch: Batch, trigger: FlushTrigger) {
        if batch.is_empty() {
            return;
        }
        if !self.health.is_healthy().await {
            warn!(events = batch.len(), "Cluster unreachable, flush waiting for recovery");
            self.health.wait_until_healthy().await;
        }
        self.fanout.dispatch(&batch, trigger).await;

        let mut events = batch.into_events();
        events.clear();
        let mut buffers = self.lock();
        if buffers.standby.capacity() == 0 {
            buffers.standby = events;
        }
    }

    async fn flush_all(&self) {
        let batch = {
            let mut buffers = self.lock();
            self.swap(&mut buffers)
        };
        self.flush(batch, FlushTrigger::Shutdown).await;
    }
}

/// Legacy health-gated dispatcher
pub struct BlockingDispatcher {
    shared: Arc<Shared>,
    normalizer: Arc<dyn Normalizer>,
    runtime: Handle,
    shutdown_timeout: Duration,
    lifecycle: Lifecycle,
}

impl BlockingDispatcher {
    pub(crate) fn from_parts(parts: Parts) -> Self {
        let capacity = parts.config.batch_size.max(1);
        let now = parts.clock.now();
        Self {
            shared: Arc::new(Shared {
                buffers: Mutex::new(DoubleBuffer {
                    active: Vec::with_capacity(capacity),
                    standby: Vec::with_capacity(capacity),
                    last_flush: now,
                }),
                capacity,
                flush_interval: parts.config.flush_interval(),
                clock: parts.clock,
                health: parts.health,
                fanout: parts.fanout,
            }),
            normalizer: parts.normalizer,
            runtime: parts.runtime,
            shutdown_timeout: parts.config.shutdown_timeout(),
            lifecycle: Lifecycle::new(),
        }
    }

    /// Flush if no flush happened for the flush interval
    ///
    /// Called by `write`; hosts may also call it from their own timer.
    pub async fn flush_if_stale(&self) {
        let batch = {
            let mut buffers = self.shared.lock();
            if buffers.active.is_empty() || !self.shared.is_stale(&buffers) {
                return;
            }
            self.shared.swap(&mut buffers)
        };
        self.shared.flush(batch, FlushTrigger::Interval).await;
    }
}

#[async_trait]
impl BatchDispatcher for BlockingDispatcher {
    async fn write(&self, event: Event) -> Result<(), DispatcherError> {
        self.lifecycle.ensure_writable()?;
        let filtered = self.normalizer.normalize(event);

        let due = {
            let mut buffers = self.shared.lock();
            buffers.active.push(filtered);
            if buffers.active.len() >= self.shared.capacity {
                Some((self.shared.swap(&mut buffers), FlushTrigger::Capacity))
            } else if self.shared.is_stale(&buffers) {
                Some((self.shared.swap(&mut buffers), FlushTrigger::Interval))
            } else {
                None
            }
        };

        if let Some((batch, trigger)) = due {
            self.shared.flush(batch, trigger).await;
        }
        Ok(())
    }

    #[instrument(name = "blocking_dispatcher_initialize", skip(self))]
    fn initialize(&self) -> Result<(), DispatcherError> {
        if self.lifecycle.start()? {
            info!(
                capacity = self.shared.capacity,
                flush_interval_ms = self.shared.flush_interval.as_millis() as u64,
                "Blocking dispatcher started"
            );
        }
        Ok(())
    }

    #[instrument(name = "blocking_dispatcher_stop", skip(self))]
    async fn stop(&self) {
        if !self.lifecycle.begin_stop() {
            return;
        }
        let shared = Arc::clone(&self.shared);
        drain_within(
            &self.runtime,
            self.shutdown_timeout,
            self.shared.fanout.metrics(),
            async move { shared.flush_all().await },
        )
        .await;
        self.lifecycle.finish_stop();
        debug!("Blocking dispatcher stopped");
    }

    fn state(&self) -> DispatcherState {
        self.lifecycle.get()
    }

    fn pending(&self) -> usize {
        self.shared.lock().active.len()
    }

    fn metrics(&self) -> MetricsSnapshot {
        self.shared.fanout.metrics().snapshot()
    }
}
