//! MemoryOutputStore - in-memory persisted configuration
//!
//! Backs the `OutputStore` contract with maps seeded from the server
//! configuration. Mutations model concurrent edits of the persisted state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use contracts::{OutputConfig, OutputStore, ServerConfig};

/// In-memory output and stream configuration
#[derive(Debug, Default)]
pub struct MemoryOutputStore {
    outputs: RwLock<HashMap<String, OutputConfig>>,
    streams: RwLock<HashMap<String, Vec<String>>>,
    stream_lookups: AtomicU64,
}

impl MemoryOutputStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from the `outputs` and `streams` sections of a server configuration
    pub fn from_config(config: &ServerConfig) -> Self {
        let store = Self::new();
        for output in &config.outputs {
            store.upsert_output(output.clone());
        }
        for stream in &config.streams {
            store.set_stream_outputs(&stream.id, stream.output_ids.clone());
        }
        store
    }

    /// Insert or replace an output configuration
    pub fn upsert_output(&self, config: OutputConfig) {
        let mut outputs = self.outputs.write().unwrap_or_else(|e| e.into_inner());
        outputs.insert(config.id.clone(), config);
    }

    /// Delete an output configuration
    pub fn remove_output(&self, id: &str) -> Option<OutputConfig> {
        let mut outputs = self.outputs.write().unwrap_or_else(|e| e.into_inner());
        outputs.remove(id)
    }

    /// Replace the outputs attached to a stream
    pub fn set_stream_outputs(&self, stream_id: &str, output_ids: Vec<String>) {
        let mut streams = self.streams.write().unwrap_or_else(|e| e.into_inner());
        streams.insert(stream_id.to_string(), output_ids);
    }

    /// Number of stream route lookups served so far
    pub fn stream_lookups(&self) -> u64 {
        self.stream_lookups.load(Ordering::Relaxed)
    }
}

impl OutputStore for MemoryOutputStore {
    fn find_output(&self, id: &str) -> Option<OutputConfig> {
        let outputs = self.outputs.read().unwrap_or_else(|e| e.into_inner());
        outputs.get(id).cloned()
    }

    fn output_ids_for_stream(&self, stream_id: &str) -> Vec<String> {
        self.stream_lookups.fetch_add(1, Ordering::Relaxed);
        let streams = self.streams.read().unwrap_or_else(|e| e.into_inner());
        streams.get(stream_id).cloned().unwrap_or_default()
    }
}
