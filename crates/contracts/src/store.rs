//! OutputStore - persisted output and stream configuration

use crate::OutputConfig;

/// Configuration source for output instantiation and stream routing
///
/// Backed by persistent storage; lookups may be slow, which is why the
/// router caches its results.
pub trait OutputStore: Send + Sync {
    /// Load the persisted configuration of an output
    fn find_output(&self, id: &str) -> Option<OutputConfig>;

    /// Identifiers of the outputs attached to a stream
    fn output_ids_for_stream(&self, stream_id: &str) -> Vec<String>;
}
