//! BatchDispatcher - the write entry point of the output pipeline
//!
//! Two implementations share this trait and are selected by configuration:
//! [`BatchedDispatcher`] (weighted buffer, scheduler-driven stale flush) and
//! [`BlockingDispatcher`] (double buffer, health-gated, write-driven stale check).

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use contracts::{
    ClusterHealth, Clock, DispatcherMode, Event, Journal, Normalizer, Output, OutputBufferConfig,
    PassthroughNormalizer, SystemClock,
};
use outputs::StreamOutputRouter;
use tokio::runtime::Handle;
use tracing::{instrument, warn};

use crate::batched::BatchedDispatcher;
use crate::blocking::BlockingDispatcher;
use crate::error::DispatcherError;
use crate::fanout::Fanout;
use crate::health::AlwaysHealthy;
use crate::journal::MemoryJournal;
use crate::metrics::{DispatcherMetrics, MetricsSnapshot};

/// Lifecycle of a dispatcher instance
///
/// `Created -> Running -> Draining -> Stopped`. A stopped dispatcher never
/// runs again; build a new instance instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    /// Constructed, periodic work not started; writes are accepted
    Created,
    Running,
    /// Stop requested, final flush in progress
    Draining,
    Stopped,
}

impl fmt::Display for DispatcherState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Batched output dispatcher
#[async_trait]
pub trait BatchDispatcher: Send + Sync {
    /// Normalize and buffer one event, dispatching a batch if one is due
    ///
    /// # Errors
    /// [`DispatcherError::NotRunning`] once `stop` has begun.
    async fn write(&self, event: Event) -> Result<(), DispatcherError>;

    /// Write several events, in order
    async fn write_all(&self, events: Vec<Event>) -> Result<(), DispatcherError> {
        for event in events {
            self.write(event).await?;
        }
        Ok(())
    }

    /// Start periodic work
    ///
    /// # Errors
    /// [`DispatcherError::AlreadyStopped`] after `stop`.
    fn initialize(&self) -> Result<(), DispatcherError>;

    /// Stop periodic work and flush what is pending, bounded by the shutdown timeout
    async fn stop(&self);

    fn state(&self) -> DispatcherState;

    /// Number of buffered, not yet dispatched events
    fn pending(&self) -> usize;

    fn metrics(&self) -> MetricsSnapshot;
}

/// Guarded state machine shared by both implementations
#[derive(Debug)]
pub(crate) struct Lifecycle {
    state: Mutex<DispatcherState>,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(DispatcherState::Created),
        }
    }

    pub(crate) fn get(&self) -> DispatcherState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// `Created -> Running`; returns whether periodic work must be started
    pub(crate) fn start(&self) -> Result<bool, DispatcherError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        match *state {
            DispatcherState::Created => {
                *state = DispatcherState::Running;
                Ok(true)
            }
            DispatcherState::Running => Ok(false),
            DispatcherState::Draining | DispatcherState::Stopped => {
                Err(DispatcherError::AlreadyStopped)
            }
        }
    }

    /// `Created | Running -> Draining`; returns false if stop already began
    pub(crate) fn begin_stop(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        match *state {
            DispatcherState::Created | DispatcherState::Running => {
                *state = DispatcherState::Draining;
                true
            }
            DispatcherState::Draining | DispatcherState::Stopped => false,
        }
    }

    pub(crate) fn finish_stop(&self) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = DispatcherState::Stopped;
    }

    pub(crate) fn ensure_writable(&self) -> Result<(), DispatcherError> {
        match self.get() {
            DispatcherState::Created | DispatcherState::Running => Ok(()),
            state => Err(DispatcherError::not_running(state)),
        }
    }
}

/// Run the final flush on `runtime` and wait for it at most `budget`
///
/// On timeout the flush is abandoned, not cancelled: it may still complete
/// and commit offsets in the background.
pub(crate) async fn drain_within<F>(
    runtime: &Handle,
    budget: Duration,
    metrics: &DispatcherMetrics,
    flush: F,
) where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let handle = runtime.spawn(flush);
    match tokio::time::timeout(budget, handle).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "Final flush task failed"),
        Err(_) => {
            metrics.record_shutdown_timeout();
            warn!(
                timeout_ms = budget.as_millis() as u64,
                "Final flush did not complete within shutdown timeout, abandoning"
            );
        }
    }
}

/// Builder for creating a dispatcher
///
/// Defaults: passthrough normalizer, in-memory journal, always-healthy cluster,
/// system clock and the current tokio runtime.
pub struct DispatcherBuilder {
    config: OutputBufferConfig,
    outputs: Vec<Arc<dyn Output>>,
    router: Option<Arc<StreamOutputRouter>>,
    journal: Option<Arc<dyn Journal>>,
    normalizer: Option<Arc<dyn Normalizer>>,
    health: Option<Arc<dyn ClusterHealth>>,
    clock: Option<Arc<dyn Clock>>,
    runtime: Option<Handle>,
}

/// Collaborators resolved by [`DispatcherBuilder`]
pub(crate) struct Parts {
    pub config: OutputBufferConfig,
    pub fanout: Fanout,
    pub normalizer: Arc<dyn Normalizer>,
    pub health: Arc<dyn ClusterHealth>,
    pub clock: Arc<dyn Clock>,
    pub runtime: Handle,
}

impl DispatcherBuilder {
    pub fn new(config: OutputBufferConfig) -> Self {
        Self {
            config,
            outputs: Vec::new(),
            router: None,
            journal: None,
            normalizer: None,
            health: None,
            clock: None,
            runtime: None,
        }
    }

    /// Add a batch output
    pub fn output(mut self, output: Arc<dyn Output>) -> Self {
        self.outputs.push(output);
        self
    }

    pub fn outputs(mut self, outputs: impl IntoIterator<Item = Arc<dyn Output>>) -> Self {
        self.outputs.extend(outputs);
        self
    }

    /// Route every batch to stream outputs as well
    pub fn router(mut self, router: Arc<StreamOutputRouter>) -> Self {
        self.router = Some(router);
        self
    }

    pub fn journal(mut self, journal: Arc<dyn Journal>) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn normalizer(mut self, normalizer: Arc<dyn Normalizer>) -> Self {
        self.normalizer = Some(normalizer);
        self
    }

    pub fn health(mut self, health: Arc<dyn ClusterHealth>) -> Self {
        self.health = Some(health);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Runtime running the periodic task and the final flush
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    fn into_parts(self) -> Result<Parts, DispatcherError> {
        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current().map_err(|e| {
                DispatcherError::Io(std::io::Error::other(format!("no tokio runtime: {}", e)))
            })?,
        };
        let journal = self
            .journal
            .unwrap_or_else(|| Arc::new(MemoryJournal::new()));
        let fanout = Fanout::new(
            self.outputs,
            self.router,
            journal,
            self.config.output_module_timeout(),
            Arc::new(DispatcherMetrics::new()),
        )?;

        Ok(Parts {
            config: self.config,
            fanout,
            normalizer: self
                .normalizer
                .unwrap_or_else(|| Arc::new(PassthroughNormalizer)),
            health: self.health.unwrap_or_else(|| Arc::new(AlwaysHealthy)),
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            runtime,
        })
    }

    /// Build the current batched dispatcher
    pub fn build_batched(self) -> Result<BatchedDispatcher, DispatcherError> {
        Ok(BatchedDispatcher::from_parts(self.into_parts()?))
    }

    /// Build the legacy blocking dispatcher
    pub fn build_blocking(self) -> Result<BlockingDispatcher, DispatcherError> {
        Ok(BlockingDispatcher::from_parts(self.into_parts()?))
    }

    /// Build the implementation selected by `mode`
    #[instrument(name = "dispatcher_builder_build", skip(self), fields(mode = ?self.config.mode))]
    pub fn build(self) -> Result<Arc<dyn BatchDispatcher>, DispatcherError> {
        Ok(match self.config.mode {
            DispatcherMode::Batched => Arc::new(self.build_batched()?),
            DispatcherMode::Blocking => Arc::new(self.build_blocking()?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use outputs::LogOutput;

    #[test]
    fn test_lifecycle_transitions() {
        let lifecycle = Lifecycle::new();
        assert!(lifecycle.ensure_writable().is_ok());
        assert!(lifecycle.start().unwrap());
        assert!(!lifecycle.start().unwrap());
        assert!(lifecycle.begin_stop());
        assert!(!lifecycle.begin_stop());
        assert!(matches!(
            lifecycle.ensure_writable(),
            Err(DispatcherError::NotRunning { .. })
        ));
        lifecycle.finish_stop();
        assert_eq!(lifecycle.get(), DispatcherState::Stopped);
        assert!(matches!(lifecycle.start(), Err(DispatcherError::AlreadyStopped)));
    }

    #[tokio::test]
    async fn test_build_selects_mode() {
        let mut config = OutputBufferConfig::default();
        let dispatcher = DispatcherBuilder::new(config.clone())
            .output(Arc::new(LogOutput::new("log")))
            .build()
            .unwrap();
        assert_eq!(dispatcher.state(), DispatcherState::Created);

        config.mode = DispatcherMode::Blocking;
        let dispatcher = DispatcherBuilder::new(config)
            .output(Arc::new(LogOutput::new("log")))
            .build()
            .unwrap();
        dispatcher.stop().await;
        assert_eq!(dispatcher.state(), DispatcherState::Stopped);
    }

    #[tokio::test]
    async fn test_build_without_sinks_fails() {
        let result = DispatcherBuilder::new(OutputBufferConfig::default()).build();
        assert!(matches!(result, Err(DispatcherError::NoSinks)));
    }
}
