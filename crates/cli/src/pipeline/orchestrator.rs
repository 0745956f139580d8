//! Pipeline orchestrator - builds the output pipeline from configuration and
//! feeds it from concurrent producer tasks.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use contracts::{Event, Journal, MessageOutput, Output, ServerConfig, SystemClock};
use dispatcher::{BatchDispatcher, DispatcherBuilder, MemoryJournal};
use outputs::{LogOutput, MemoryOutputStore, OutputFactory, OutputRegistry, StreamOutputRouter};
use tokio::io::AsyncBufRead;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::input::{read_events, EventDecoder, InputCounters};
use super::PipelineStats;
use crate::error::{CliError, Result};

/// Events buffered between the input reader and the producers
const INPUT_QUEUE_CAPACITY: usize = 1024;

/// Name of the log output used when no default output is configured
const FALLBACK_DEFAULT_OUTPUT: &str = "default";

/// Fully wired output pipeline
pub struct Pipeline {
    dispatcher: Arc<dyn BatchDispatcher>,
    filtered: Vec<Arc<dyn Output>>,
    router: Arc<StreamOutputRouter>,
    journal: Arc<MemoryJournal>,
    shutdown_timeout: Duration,
}

impl Pipeline {
    /// Reject configurations naming output types the factory cannot build
    pub fn check_output_types(config: &ServerConfig, factory: &OutputFactory) -> Result<()> {
        let all = config
            .default_output
            .iter()
            .chain(&config.filtered_outputs)
            .chain(&config.outputs);
        for output in all {
            if !factory.supports(&output.output_type) {
                return Err(CliError::unsupported_output_type(&output.id, &output.output_type));
            }
        }
        Ok(())
    }

    /// Instantiate outputs, registry, router and dispatcher
    pub async fn build(config: &ServerConfig) -> Result<Self> {
        let factory = OutputFactory::with_builtins();
        Self::check_output_types(config, &factory)?;

        let default_output: Arc<dyn MessageOutput> = match &config.default_output {
            Some(output) => factory.create(output).await?.as_message_output(),
            None => {
                info!(output = FALLBACK_DEFAULT_OUTPUT, "No default output configured, using log output");
                Arc::new(LogOutput::new(FALLBACK_DEFAULT_OUTPUT))
            }
        };

        let mut filtered = Vec::with_capacity(config.filtered_outputs.len());
        for output in &config.filtered_outputs {
            filtered.push(factory.create(output).await?.as_output());
        }

        let store = Arc::new(MemoryOutputStore::from_config(config));
        let registry = Arc::new(OutputRegistry::new(factory, store, default_output));
        let router = Arc::new(StreamOutputRouter::new(
            registry,
            &config.route_cache,
            Arc::new(SystemClock),
        ));
        let journal = Arc::new(MemoryJournal::new());

        let dispatcher = DispatcherBuilder::new(config.output_buffer.clone())
            .outputs(filtered.iter().cloned())
            .router(Arc::clone(&router))
            .journal(journal.clone())
            .health(dispatcher::health::from_config(&config.cluster))
            .build()?;

        info!(
            mode = ?config.output_buffer.mode,
            filtered_outputs = filtered.len(),
            stream_outputs = config.outputs.len(),
            streams = config.streams.len(),
            "Pipeline built"
        );

        Ok(Self {
            dispatcher,
            filtered,
            router,
            journal,
            shutdown_timeout: config.output_buffer.shutdown_timeout(),
        })
    }

    /// Read events until EOF or `shutdown`, write them from `producers` tasks,
    /// then stop the dispatcher and release every output
    ///
    /// Once `shutdown` fires, producers get the shutdown timeout to finish
    /// their current write; after that they are aborted.
    pub async fn run<R, F>(
        self,
        reader: R,
        decoder: EventDecoder,
        producers: usize,
        shutdown: F,
    ) -> Result<PipelineStats>
    where
        R: AsyncBufRead + Send + Unpin + 'static,
        F: Future<Output = ()>,
    {
        let started = Instant::now();
        let counters = Arc::new(InputCounters::default());
        tokio::pin!(shutdown);
        let (tx, rx) = mpsc::channel::<Event>(INPUT_QUEUE_CAPACITY);
        let rx = Arc::new(Mutex::new(rx));

        self.dispatcher.initialize()?;

        let mut tasks = JoinSet::new();
        for id in 0..producers.max(1) {
            tasks.spawn(produce(
                id,
                Arc::clone(&self.dispatcher),
                Arc::clone(&rx),
                Arc::clone(&counters),
            ));
        }

        let mut input = {
            let counters = Arc::clone(&counters);
            tokio::spawn(async move { read_events(reader, decoder, tx, &counters).await })
        };

        let mut interrupted = tokio::select! {
            result = &mut input => {
                match result {
                    Ok(Ok(())) => info!("Input exhausted"),
                    Ok(Err(e)) => warn!(error = %e, "Input read failed, stopping"),
                    Err(e) => warn!(error = %e, "Input task failed, stopping"),
                }
                false
            }
            _ = &mut shutdown => {
                warn!("Shutdown requested, stopping input");
                input.abort();
                true
            }
        };

        // Producers drain the queue and exit once the reader is gone
        if !interrupted {
            tokio::select! {
                _ = join_producers(&mut tasks) => {}
                _ = &mut shutdown => {
                    warn!("Shutdown requested while draining input");
                    interrupted = true;
                }
            }
        }
        if interrupted
            && tokio::time::timeout(self.shutdown_timeout, join_producers(&mut tasks))
                .await
                .is_err()
        {
            warn!(
                producers = tasks.len(),
                timeout_ms = self.shutdown_timeout.as_millis() as u64,
                "Producers did not finish within shutdown timeout, aborting"
            );
            tasks.abort_all();
        }

        self.dispatcher.stop().await;
        self.close().await;

        let cache = self.router.cache().stats();
        Ok(PipelineStats {
            events_read: InputCounters::get(&counters.read),
            lines_skipped: InputCounters::get(&counters.skipped),
            events_written: InputCounters::get(&counters.written),
            writes_rejected: InputCounters::get(&counters.rejected),
            interrupted,
            duration: started.elapsed(),
            committed_offset: self.journal.committed(),
            pending_after_stop: self.dispatcher.pending(),
            dispatcher: self.dispatcher.metrics(),
            route_cache_hit_rate: cache.hit_rate(),
            running_stream_outputs: self.router.registry().running_outputs().len(),
        })
    }

    async fn close(&self) {
        for output in &self.filtered {
            if let Err(e) = output.close().await {
                warn!(output = %output.name(), error = %e, "Failed to close output");
            }
        }
        self.router.registry().stop_all().await;
        debug!("Outputs released");
    }
}

async fn join_producers(tasks: &mut JoinSet<()>) {
    while let Some(result) = tasks.join_next().await {
        if let Err(e) = result {
            warn!(error = %e, "Producer task failed");
        }
    }
}

async fn produce(
    id: usize,
    dispatcher: Arc<dyn BatchDispatcher>,
    rx: Arc<Mutex<mpsc::Receiver<Event>>>,
    counters: Arc<InputCounters>,
) {
    loop {
        let next = rx.lock().await.recv().await;
        let Some(event) = next else {
            break;
        };
        match dispatcher.write(event).await {
            Ok(()) => InputCounters::bump(&counters.written),
            Err(e) => {
                InputCounters::bump(&counters.rejected);
                warn!(producer = id, error = %e, "Dispatcher rejected event");
            }
        }
    }
    debug!(producer = id, "Producer finished");
}
