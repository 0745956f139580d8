//! ClusterHealth - reachability of the downstream cluster

use async_trait::async_trait;
use std::time::Duration;

/// Downstream cluster health
#[async_trait]
pub trait ClusterHealth: Send + Sync {
    /// Whether the cluster is currently reachable
    async fn is_healthy(&self) -> bool;

    /// Delay between two health checks while waiting
    fn retry_interval(&self) -> Duration {
        Duration::from_secs(1)
    }

    /// Block until the cluster reports healthy
    ///
    /// Bounded only by the implementation's own retry policy.
    async fn wait_until_healthy(&self) {
        while !self.is_healthy().await {
            tokio::time::sleep(self.retry_interval()).await;
        }
    }
}
