//! Output traits - dispatcher output interface
//!
//! Two kinds of outputs exist:
//! - [`Output`] receives whole batches (filtered outputs)
//! - [`MessageOutput`] receives individual events resolved per logical stream (legacy outputs)
//!
//! Implementations are shared between the registry and any dispatcher holding
//! a reference, so every method takes `&self` and must tolerate concurrent calls.

use async_trait::async_trait;

use crate::{Batch, ContractError, FilteredEvent};

/// Batch output
#[async_trait]
pub trait Output: Send + Sync {
    /// Output name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Deliver a non-empty batch
    ///
    /// # Errors
    /// Returns delivery error (should include context). The dispatcher logs
    /// and skips a failing output; retries are the output's own business.
    async fn deliver(&self, batch: &Batch) -> Result<(), ContractError>;

    /// Release resources
    async fn close(&self) -> Result<(), ContractError> {
        Ok(())
    }
}

/// Per-event output attached to logical streams
#[async_trait]
pub trait MessageOutput: Send + Sync {
    /// Stable output identifier
    fn id(&self) -> &str;

    /// Write a single event
    async fn write(&self, event: &FilteredEvent) -> Result<(), ContractError>;

    /// Write several events, in order
    async fn write_all(&self, events: &[FilteredEvent]) -> Result<(), ContractError> {
        for event in events {
            self.write(event).await?;
        }
        Ok(())
    }

    /// Stop the output; it will not be used afterwards
    async fn stop(&self) -> Result<(), ContractError> {
        Ok(())
    }
}
