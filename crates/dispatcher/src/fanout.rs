//! Fanout - delivers one batch to every sink, then commits its offset
//!
//! Best-effort: a failing sink is logged, metered and skipped. The journal
//! offset is committed once every sink has been attempted, whatever the
//! outcome. Concurrent `dispatch` calls for different batches are allowed.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use contracts::{Batch, FilteredEvent, Journal, MessageOutput, Output};
use outputs::StreamOutputRouter;
use tracing::{debug, instrument, warn};

use crate::error::DispatcherError;
use crate::metrics::{DispatcherMetrics, FlushTrigger};

/// Sink set of a dispatcher
pub struct Fanout {
    outputs: Vec<Arc<dyn Output>>,
    router: Option<Arc<StreamOutputRouter>>,
    journal: Arc<dyn Journal>,
    module_timeout: Duration,
    metrics: Arc<DispatcherMetrics>,
}

impl Fanout {
    /// Create a fanout
    ///
    /// # Errors
    /// [`DispatcherError::NoSinks`] when there are neither batch outputs nor a
    /// stream router.
    pub fn new(
        outputs: Vec<Arc<dyn Output>>,
        router: Option<Arc<StreamOutputRouter>>,
        journal: Arc<dyn Journal>,
        module_timeout: Duration,
        metrics: Arc<DispatcherMetrics>,
    ) -> Result<Self, DispatcherError> {
        if outputs.is_empty() && router.is_none() {
            return Err(DispatcherError::NoSinks);
        }
        Ok(Self {
            outputs,
            router,
            journal,
            module_timeout,
            metrics,
        })
    }

    pub fn metrics(&self) -> &Arc<DispatcherMetrics> {
        &self.metrics
    }

    pub fn journal(&self) -> &Arc<dyn Journal> {
        &self.journal
    }

    /// Batch outputs receiving every batch
    pub fn outputs(&self) -> &[Arc<dyn Output>] {
        &self.outputs
    }

    /// Deliver `batch` to every sink and commit its highest offset
    ///
    /// Empty batches are skipped without touching sinks or the journal.
    #[instrument(
        name = "fanout_dispatch",
        skip(self, batch),
        fields(events = batch.len(), trigger = trigger.as_str())
    )]
    pub async fn dispatch(&self, batch: &Batch, trigger: FlushTrigger) {
        let Some(max_offset) = batch.max_offset() else {
            return;
        };
        self.metrics.record_flush_requested(trigger);
        let started = Instant::now();

        for output in &self.outputs {
            match output.deliver(batch).await {
                Ok(()) => self.metrics.record_delivery(output.name(), true),
                Err(e) => {
                    warn!(sink = %output.name(), error = %e, events = batch.len(), "Batch delivery failed, sink skipped");
                    self.metrics.record_delivery(output.name(), false);
                }
            }
        }

        if let Some(router) = &self.router {
            self.deliver_to_streams(router, batch).await;
        }

        self.journal.commit(max_offset);

        let elapsed = started.elapsed();
        self.metrics.record_flush_completed(
            batch.len(),
            batch.weight(),
            u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX),
        );
        debug!(
            events = batch.len(),
            offset = max_offset,
            elapsed_ms = elapsed.as_millis() as u64,
            "Batch dispatched"
        );
    }

    /// Hand every legacy output its share of the batch, in batch order
    async fn deliver_to_streams(&self, router: &StreamOutputRouter, batch: &Batch) {
        let mut groups: Vec<(Arc<dyn MessageOutput>, Vec<FilteredEvent>)> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for event in batch {
            for output in router.route(event).await {
                let slot = *index.entry(output.id().to_string()).or_insert_with(|| {
                    groups.push((Arc::clone(&output), Vec::new()));
                    groups.len() - 1
                });
                groups[slot].1.push(event.clone());
            }
        }

        for (output, events) in &groups {
            let result = tokio::time::timeout(self.module_timeout, output.write_all(events)).await;
            match result {
                Ok(Ok(())) => self.metrics.record_delivery(output.id(), true),
                Ok(Err(e)) => {
                    warn!(sink = %output.id(), error = %e, events = events.len(), "Stream output write failed, sink skipped");
                    self.metrics.record_delivery(output.id(), false);
                }
                Err(_) => {
                    warn!(
                        sink = %output.id(),
                        timeout_ms = self.module_timeout.as_millis() as u64,
                        events = events.len(),
                        "Stream output write timed out, sink skipped"
                    );
                    self.metrics.record_delivery(output.id(), false);
                }
            }
        }
    }
}
