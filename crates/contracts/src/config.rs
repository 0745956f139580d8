//! ServerConfig - Config Loader output
//!
//! Describes output buffering, route caching, cluster health probing and the
//! outputs/streams the server routes to.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Config version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete server configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Config version
    #[serde(default)]
    pub version: ConfigVersion,

    /// Batching and flush behaviour
    #[serde(default)]
    pub output_buffer: OutputBufferConfig,

    /// Stream route cache
    #[serde(default)]
    pub route_cache: RouteCacheConfig,

    /// Downstream cluster health probing
    #[serde(default)]
    pub cluster: ClusterConfig,

    /// Built-in output that receives every event
    #[serde(default)]
    pub default_output: Option<OutputConfig>,

    /// Outputs receiving whole batches
    #[serde(default)]
    pub filtered_outputs: Vec<OutputConfig>,

    /// Persisted stream outputs, instantiated on demand
    #[serde(default)]
    pub outputs: Vec<OutputConfig>,

    /// Logical streams and their attached outputs
    #[serde(default)]
    pub streams: Vec<StreamConfig>,
}

/// Dispatcher implementation selector
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatcherMode {
    /// Weighted buffer, scheduler-driven stale flush, best-effort fan-out
    #[default]
    Batched,
    /// Double-buffer swap gated on cluster health, write-driven stale check
    Blocking,
}

/// Output buffer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputBufferConfig {
    /// Flush once the accumulated weight reaches this value
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Maximum time between two flushes in milliseconds
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,

    /// Budget for the final flush on shutdown in milliseconds
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,

    /// Budget for one stream output's share of a batch in milliseconds
    #[serde(default = "default_output_module_timeout_ms")]
    pub output_module_timeout_ms: u64,

    /// Dispatcher implementation
    #[serde(default)]
    pub mode: DispatcherMode,
}

fn default_batch_size() -> usize {
    500
}

fn default_flush_interval_ms() -> u64 {
    1000
}

fn default_shutdown_timeout_ms() -> u64 {
    30_000
}

fn default_output_module_timeout_ms() -> u64 {
    10_000
}

impl Default for OutputBufferConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            flush_interval_ms: default_flush_interval_ms(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
            output_module_timeout_ms: default_output_module_timeout_ms(),
            mode: DispatcherMode::default(),
        }
    }
}

impl OutputBufferConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn output_module_timeout(&self) -> Duration {
        Duration::from_millis(self.output_module_timeout_ms)
    }
}

/// Route cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteCacheConfig {
    /// Entry time-to-live in milliseconds
    #[serde(default = "default_cache_ttl_ms")]
    pub ttl_ms: u64,

    /// Maximum number of cached streams
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: usize,
}

fn default_cache_ttl_ms() -> u64 {
    1000
}

fn default_cache_max_entries() -> usize {
    100
}

impl Default for RouteCacheConfig {
    fn default() -> Self {
        Self {
            ttl_ms: default_cache_ttl_ms(),
            max_entries: default_cache_max_entries(),
        }
    }
}

impl RouteCacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}

/// Cluster health probe configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// TCP address probed for reachability (None = always healthy)
    #[serde(default)]
    pub probe_addr: Option<String>,

    /// Connect timeout of one probe in milliseconds
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    /// Delay between probes while waiting for health in milliseconds
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,
}

fn default_probe_timeout_ms() -> u64 {
    500
}

fn default_retry_interval_ms() -> u64 {
    1000
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            probe_addr: None,
            probe_timeout_ms: default_probe_timeout_ms(),
            retry_interval_ms: default_retry_interval_ms(),
        }
    }
}

/// Persisted output configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Stable identifier
    pub id: String,

    /// Human readable title
    #[serde(default)]
    pub title: String,

    /// Type discriminator resolved by the output factory (e.g. "log", "file", "gelf")
    pub output_type: String,

    /// Type specific parameters
    #[serde(default)]
    pub params: HashMap<String, String>,
}

impl OutputConfig {
    pub fn new(id: impl Into<String>, output_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: String::new(),
            output_type: output_type.into(),
            params: HashMap::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

/// Logical stream configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Stable identifier
    pub id: String,

    /// Human readable title
    #[serde(default)]
    pub title: String,

    /// Outputs attached to this stream
    #[serde(default)]
    pub output_ids: Vec<String>,
}

impl ServerConfig {
    /// Total number of sinks a dispatcher would be built with
    pub fn sink_count(&self) -> usize {
        self.filtered_outputs.len() + usize::from(self.default_output.is_some())
    }
}
