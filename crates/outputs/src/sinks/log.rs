//! LogOutput - logs batch and event summaries via tracing

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use contracts::{Batch, ContractError, FilteredEvent, MessageOutput, Output};
use tracing::{debug, info, instrument};

/// Output that logs what it receives, for debugging and as default output
pub struct LogOutput {
    name: String,
    received: AtomicU64,
}

impl LogOutput {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            received: AtomicU64::new(0),
        }
    }

    /// Number of events received so far
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Output for LogOutput {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "log_output_deliver",
        skip(self, batch),
        fields(output = %self.name, events = batch.len())
    )]
    async fn deliver(&self, batch: &Batch) -> Result<(), ContractError> {
        self.received.fetch_add(batch.len() as u64, Ordering::Relaxed);
        info!(
            output = %self.name,
            events = batch.len(),
            weight = batch.weight(),
            max_offset = batch.max_offset(),
            "Batch received"
        );
        Ok(())
    }

    async fn close(&self) -> Result<(), ContractError> {
        info!(output = %self.name, received = self.received(), "LogOutput closed");
        Ok(())
    }
}

#[async_trait]
impl MessageOutput for LogOutput {
    fn id(&self) -> &str {
        &self.name
    }

    async fn write(&self, event: &FilteredEvent) -> Result<(), ContractError> {
        self.received.fetch_add(1, Ordering::Relaxed);
        debug!(
            output = %self.name,
            offset = event.offset(),
            source = %event.event().source,
            streams = event.streams().len(),
            "Event received"
        );
        Ok(())
    }

    async fn stop(&self) -> Result<(), ContractError> {
        Output::close(self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::Event;

    #[tokio::test]
    async fn test_log_output_counts_events() {
        let output = LogOutput::new("console");
        let batch = Batch::new(vec![
            FilteredEvent::from_event(Event::new(1, "a")),
            FilteredEvent::from_event(Event::new(2, "b")),
        ]);

        output.deliver(&batch).await.unwrap();
        output.write(&batch.events()[0]).await.unwrap();
        assert_eq!(output.received(), 3);
    }

    #[test]
    fn test_log_output_name() {
        let output = LogOutput::new("my_logger");
        assert_eq!(Output::name(&output), "my_logger");
        assert_eq!(MessageOutput::id(&output), "my_logger");
    }
}
