//! Pipeline statistics.

use std::time::Duration;

use contracts::Offset;
use dispatcher::MetricsSnapshot;

/// Statistics from a pipeline run
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// Events decoded from the input
    pub events_read: u64,

    /// Input lines that were not valid events
    pub lines_skipped: u64,

    /// Events accepted by the dispatcher
    pub events_written: u64,

    /// Events refused because the dispatcher was stopping
    pub writes_rejected: u64,

    /// Stopped by a shutdown signal or timeout instead of EOF
    pub interrupted: bool,

    /// Total duration of the run
    pub duration: Duration,

    /// Journal low-water mark after the final flush
    pub committed_offset: Option<Offset>,

    /// Events left in the buffer after stop (final flush skipped or abandoned)
    pub pending_after_stop: usize,

    /// Dispatcher flush and delivery metrics
    pub dispatcher: MetricsSnapshot,

    pub route_cache_hit_rate: f64,

    pub running_stream_outputs: usize,
}

impl PipelineStats {
    /// Written events per second
    pub fn events_per_sec(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.events_written as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n=== Outflow Run Summary ===\n");

        println!("Input");
        println!("  Duration:         {:.2}s", self.duration.as_secs_f64());
        println!("  Events read:      {}", self.events_read);
        println!("  Lines skipped:    {}", self.lines_skipped);
        println!("  Events written:   {}", self.events_written);
        println!("  Writes rejected:  {}", self.writes_rejected);
        println!("  Throughput:       {:.2} events/s", self.events_per_sec());
        if self.interrupted {
            println!("  Stopped by:       shutdown signal");
        }

        let metrics = &self.dispatcher;
        println!("\nDispatch");
        println!("  Flushes:          {}/{}", metrics.flushes_completed, metrics.flushes_requested);
        println!("  Events sent:      {}", metrics.events_dispatched);
        println!(
            "  Batch size:       mean {:.1}, max {:.0}",
            metrics.batch_size.mean, metrics.batch_size.max
        );
        println!("  Sink failures:    {}", metrics.sink_failures);
        for (sink, failures) in &metrics.failures_by_sink {
            println!("    - {}: {}", sink, failures);
        }
        if metrics.shutdown_timeouts > 0 {
            println!("  Shutdown timeouts: {}", metrics.shutdown_timeouts);
        }
        if self.pending_after_stop > 0 {
            println!("  Not flushed:      {}", self.pending_after_stop);
        }

        println!("\nRouting");
        println!("  Stream outputs:   {}", self.running_stream_outputs);
        println!("  Cache hit rate:   {:.1}%", self.route_cache_hit_rate * 100.0);

        println!("\nJournal");
        match self.committed_offset {
            Some(offset) => println!("  Committed offset: {}", offset),
            None => println!("  Committed offset: none"),
        }
        println!();
    }
}
