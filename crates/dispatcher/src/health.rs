//! ClusterHealth implementations
//!
//! - [`AlwaysHealthy`]: no downstream cluster to wait for
//! - [`ToggleHealth`]: switched explicitly, wakes waiters on recovery
//! - [`TcpProbeHealth`]: TCP connect probe against the cluster address

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use contracts::{ClusterConfig, ClusterHealth};
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tracing::{debug, info};

/// Cluster that is always reachable
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysHealthy;

#[async_trait]
impl ClusterHealth for AlwaysHealthy {
    async fn is_healthy(&self) -> bool {
        true
    }
}

/// Health flag flipped by the host process
#[derive(Debug)]
pub struct ToggleHealth {
    healthy: AtomicBool,
    changed: Notify,
}

impl ToggleHealth {
    pub fn new(healthy: bool) -> Self {
        Self {
            healthy: AtomicBool::new(healthy),
            changed: Notify::new(),
        }
    }

    pub fn set_healthy(&self, healthy: bool) {
        let previous = self.healthy.swap(healthy, Ordering::AcqRel);
        if previous != healthy {
            info!(healthy, "Cluster health changed");
        }
        if healthy {
            self.changed.notify_waiters();
        }
    }
}

#[async_trait]
impl ClusterHealth for ToggleHealth {
    async fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }

    async fn wait_until_healthy(&self) {
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.healthy.load(Ordering::Acquire) {
                return;
            }
            notified.await;
        }
    }
}

/// Probes the cluster by opening a TCP connection
#[derive(Debug, Clone)]
pub struct TcpProbeHealth {
    addr: String,
    probe_timeout: Duration,
    retry_interval: Duration,
}

impl TcpProbeHealth {
    pub fn new(addr: impl Into<String>, probe_timeout: Duration, retry_interval: Duration) -> Self {
        Self {
            addr: addr.into(),
            probe_timeout,
            retry_interval,
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }
}

#[async_trait]
impl ClusterHealth for TcpProbeHealth {
    async fn is_healthy(&self) -> bool {
        match tokio::time::timeout(self.probe_timeout, TcpStream::connect(&self.addr)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!(addr = %self.addr, error = %e, "Cluster probe failed");
                false
            }
            Err(_) => {
                debug!(addr = %self.addr, "Cluster probe timed out");
                false
            }
        }
    }

    fn retry_interval(&self) -> Duration {
        self.retry_interval
    }
}

/// Health check for a cluster configuration
pub fn from_config(config: &ClusterConfig) -> Arc<dyn ClusterHealth> {
    match &config.probe_addr {
        Some(addr) => Arc::new(TcpProbeHealth::new(
            addr.clone(),
            Duration::from_millis(config.probe_timeout_ms),
            Duration::from_millis(config.retry_interval_ms),
        )),
        None => Arc::new(AlwaysHealthy),
    }
}
