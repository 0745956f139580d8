//! StreamOutputRouter - resolves the legacy outputs of an event
//!
//! The route set of an event is the default output plus every running output
//! attached to one of its streams, deduplicated by id with the default first.
//! Stream lookups are cached for a short TTL so storage is not hit per event.

use std::collections::HashSet;
use std::sync::Arc;

use contracts::{Clock, FilteredEvent, MessageOutput, RouteCacheConfig};
use tracing::{debug, instrument, warn};

use crate::cache::RouteCache;
use crate::registry::OutputRegistry;

type Outputs = Arc<Vec<Arc<dyn MessageOutput>>>;

/// Stream to output router
pub struct StreamOutputRouter {
    registry: Arc<OutputRegistry>,
    cache: RouteCache<Outputs>,
}

impl StreamOutputRouter {
    pub fn new(
        registry: Arc<OutputRegistry>,
        config: &RouteCacheConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry,
            cache: RouteCache::new(config.ttl(), config.max_entries, clock),
        }
    }

    pub fn registry(&self) -> &Arc<OutputRegistry> {
        &self.registry
    }

    pub fn cache(&self) -> &RouteCache<Outputs> {
        &self.cache
    }

    /// Running outputs attached to a stream
    ///
    /// Outputs that cannot be resolved (missing configuration, failed start)
    /// are logged and left out of the result.
    #[instrument(name = "router_outputs_for_stream", skip(self), fields(stream = %stream_id))]
    pub async fn outputs_for_stream(&self, stream_id: &str) -> Outputs {
        if let Some(outputs) = self.cache.get(stream_id) {
            return outputs;
        }

        let ids = self.registry.store().output_ids_for_stream(stream_id);
        let mut outputs = Vec::with_capacity(ids.len());
        for id in &ids {
            match self.registry.get_or_create(id).await {
                Ok(output) => outputs.push(output),
                Err(e) => {
                    warn!(stream = %stream_id, output = %id, error = %e, "Output skipped for stream")
                }
            }
        }
        debug!(stream = %stream_id, resolved = outputs.len(), configured = ids.len(), "Stream outputs resolved");

        let outputs = Arc::new(outputs);
        self.cache.insert(stream_id, Arc::clone(&outputs));
        outputs
    }

    /// Route set of one event: default output first, then stream outputs
    pub async fn route(&self, event: &FilteredEvent) -> Vec<Arc<dyn MessageOutput>> {
        let default = Arc::clone(self.registry.default_output());
        let mut seen = HashSet::new();
        seen.insert(default.id().to_string());
        let mut route = vec![default];

        for stream in event.streams() {
            for output in self.outputs_for_stream(stream).await.iter() {
                if seen.insert(output.id().to_string()) {
                    route.push(Arc::clone(output));
                }
            }
        }
        route
    }

    /// Drop the cached route of a stream
    pub fn invalidate_stream(&self, stream_id: &str) {
        self.cache.invalidate(stream_id);
    }
}
