//! OutputRegistry - lazily instantiated, memoized stream outputs
//!
//! Each persisted output id maps to at most one running instance. Concurrent
//! first requests for the same id share a single construction.

use std::sync::Arc;

use contracts::{MessageOutput, OutputConfig, OutputStore};
use dashmap::DashMap;
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, warn};

use crate::error::OutputError;
use crate::factory::OutputFactory;

type Slot = Arc<OnceCell<Arc<dyn MessageOutput>>>;

/// Registry of running stream outputs
pub struct OutputRegistry {
    factory: OutputFactory,
    store: Arc<dyn OutputStore>,
    default_output: Arc<dyn MessageOutput>,
    running: DashMap<String, Slot>,
    /// Configuration that failed to start, per output id
    failed: DashMap<String, OutputConfig>,
}

impl OutputRegistry {
    /// Create a registry
    ///
    /// `default_output` lives outside the dynamic map and is never removed.
    pub fn new(
        factory: OutputFactory,
        store: Arc<dyn OutputStore>,
        default_output: Arc<dyn MessageOutput>,
    ) -> Self {
        Self {
            factory,
            store,
            default_output,
            running: DashMap::new(),
            failed: DashMap::new(),
        }
    }

    /// The built-in output routed for every event
    pub fn default_output(&self) -> &Arc<dyn MessageOutput> {
        &self.default_output
    }

    /// Persisted configuration source
    pub fn store(&self) -> &Arc<dyn OutputStore> {
        &self.store
    }

    /// Return the running output for `id`, instantiating it on first request
    ///
    /// A failed instantiation is remembered with the configuration that
    /// caused it; until that configuration changes the output is reported as
    /// [`OutputError::PreviouslyFailed`] without another attempt.
    #[instrument(name = "output_registry_get_or_create", skip(self), fields(output = %id))]
    pub async fn get_or_create(&self, id: &str) -> Result<Arc<dyn MessageOutput>, OutputError> {
        let slot = self.slot(id);
        if let Some(output) = slot.get() {
            return Ok(Arc::clone(output));
        }

        let config = self
            .store
            .find_output(id)
            .ok_or_else(|| OutputError::not_found(id))?;

        if self.failed.get(id).is_some_and(|failed| *failed == config) {
            return Err(OutputError::PreviouslyFailed { id: id.to_string() });
        }

        let result = slot
            .get_or_try_init(|| async {
                let handle = self.factory.create(&config).await?;
                Ok::<_, OutputError>(handle.as_message_output())
            })
            .await;

        match result {
            Ok(output) => {
                self.failed.remove(id);
                info!(output = %id, output_type = %config.output_type, "Output started");
                Ok(Arc::clone(output))
            }
            Err(e) => {
                warn!(output = %id, error = %e, "Output failed to start");
                observability::record_output_instantiation_failure(id);
                self.failed.insert(id.to_string(), config);
                Err(e)
            }
        }
    }

    /// Stop and forget a running output
    ///
    /// Returns whether an instance was running.
    #[instrument(name = "output_registry_remove", skip(self), fields(output = %id))]
    pub async fn remove(&self, id: &str) -> bool {
        self.failed.remove(id);
        let Some((_, slot)) = self.running.remove(id) else {
            return false;
        };
        match slot.get() {
            Some(output) => {
                if let Err(e) = output.stop().await {
                    warn!(output = %id, error = %e, "Output failed to stop cleanly");
                }
                info!(output = %id, "Output removed");
                true
            }
            None => false,
        }
    }

    /// Forget a remembered instantiation failure so the next request retries
    pub fn invalidate(&self, id: &str) {
        if self.failed.remove(id).is_some() {
            debug!(output = %id, "Instantiation failure cleared");
        }
    }

    /// Currently running stream outputs (excluding the default output)
    pub fn running_outputs(&self) -> Vec<Arc<dyn MessageOutput>> {
        self.running
            .iter()
            .filter_map(|entry| entry.value().get().cloned())
            .collect()
    }

    /// Stop every running output, including the default output
    #[instrument(name = "output_registry_stop_all", skip(self))]
    pub async fn stop_all(&self) {
        let ids: Vec<String> = self.running.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            self.remove(&id).await;
        }
        if let Err(e) = self.default_output.stop().await {
            warn!(output = %self.default_output.id(), error = %e, "Default output failed to stop cleanly");
        }
    }

    fn slot(&self, id: &str) -> Slot {
        if let Some(slot) = self.running.get(id) {
            return Arc::clone(slot.value());
        }
        Arc::clone(self.running.entry(id.to_string()).or_default().value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::OutputHandle;
    use crate::sinks::LogOutput;
    use crate::store::MemoryOutputStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_factory(created: Arc<AtomicUsize>) -> OutputFactory {
        let mut factory = OutputFactory::empty();
        factory.register("log", move |config| {
            let created = Arc::clone(&created);
            async move {
                created.fetch_add(1, Ordering::SeqCst);
                tokio::task::yield_now().await;
                Ok(OutputHandle::new(LogOutput::new(config.id)))
            }
        });
        factory
    }

    fn registry_with(store: Arc<MemoryOutputStore>, created: Arc<AtomicUsize>) -> OutputRegistry {
        OutputRegistry::new(
            counting_factory(created),
            store,
            Arc::new(LogOutput::new("default")),
        )
    }

    #[tokio::test]
    async fn test_get_or_create_memoizes() {
        let store = Arc::new(MemoryOutputStore::new());
        store.upsert_output(OutputConfig::new("a", "log"));
        let created = Arc::new(AtomicUsize::new(0));
        let registry = registry_with(store, Arc::clone(&created));

        let first = registry.get_or_create("a").await.unwrap();
        let second = registry.get_or_create("a").await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(created.load(Ordering::SeqCst), 1);
        assert_eq!(registry.running_outputs().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_first_requests_construct_once() {
        let store = Arc::new(MemoryOutputStore::new());
        store.upsert_output(OutputConfig::new("a", "log"));
        let created = Arc::new(AtomicUsize::new(0));
        let registry = Arc::new(registry_with(store, Arc::clone(&created)));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let registry = Arc::clone(&registry);
            tasks.push(tokio::spawn(async move {
                registry.get_or_create("a").await.is_ok()
            }));
        }
        for task in tasks {
            assert!(task.await.unwrap());
        }
        assert_eq!(created.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_not_found() {
        let store = Arc::new(MemoryOutputStore::new());
        let registry = registry_with(store, Arc::new(AtomicUsize::new(0)));
        let err = registry.get_or_create("missing").await.err().unwrap();
        assert!(matches!(err, OutputError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_failure_remembered_until_config_changes() {
        let store = Arc::new(MemoryOutputStore::new());
        store.upsert_output(OutputConfig::new("a", "unknown"));
        let created = Arc::new(AtomicUsize::new(0));
        let registry = registry_with(Arc::clone(&store), Arc::clone(&created));

        let err = registry.get_or_create("a").await.err().unwrap();
        assert!(matches!(err, OutputError::UnknownType { .. }));

        let err = registry.get_or_create("a").await.err().unwrap();
        assert!(matches!(err, OutputError::PreviouslyFailed { .. }));

        // Configuration changed: retried and started
        store.upsert_output(OutputConfig::new("a", "log"));
        assert!(registry.get_or_create("a").await.is_ok());
        assert_eq!(created.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalidate_allows_retry() {
        let store = Arc::new(MemoryOutputStore::new());
        store.upsert_output(OutputConfig::new("a", "unknown"));
        let registry = registry_with(store, Arc::new(AtomicUsize::new(0)));

        assert!(registry.get_or_create("a").await.is_err());
        registry.invalidate("a");
        let err = registry.get_or_create("a").await.err().unwrap();
        assert!(matches!(err, OutputError::UnknownType { .. }));
    }

    #[tokio::test]
    async fn test_remove_then_recreate() {
        let store = Arc::new(MemoryOutputStore::new());
        store.upsert_output(OutputConfig::new("a", "log"));
        let created = Arc::new(AtomicUsize::new(0));
        let registry = registry_with(store, Arc::clone(&created));

        registry.get_or_create("a").await.unwrap();
        assert!(registry.remove("a").await);
        assert!(!registry.remove("a").await);
        assert!(registry.running_outputs().is_empty());

        registry.get_or_create("a").await.unwrap();
        assert_eq!(created.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_default_output_outside_map() {
        let store = Arc::new(MemoryOutputStore::new());
        let registry = registry_with(store, Arc::new(AtomicUsize::new(0)));
        assert_eq!(registry.default_output().id(), "default");
        assert!(registry.running_outputs().is_empty());
        registry.stop_all().await;
    }
}
