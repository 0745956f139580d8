//! OutputFactory - constructor registry keyed by output type
//!
//! Resolves the type discriminator of a persisted output configuration to a
//! constructor once, at startup, instead of per lookup.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use contracts::{ContractError, MessageOutput, Output, OutputConfig};
use tracing::{debug, instrument};

use crate::error::OutputError;
use crate::sinks::{FileOutput, GelfOutput, LogOutput};

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Constructor for one output type
pub type OutputConstructor =
    Arc<dyn Fn(OutputConfig) -> BoxFuture<Result<OutputHandle, ContractError>> + Send + Sync>;

/// A constructed output, usable both as batch output and as stream output
#[derive(Clone)]
pub struct OutputHandle {
    id: String,
    batch: Arc<dyn Output>,
    message: Arc<dyn MessageOutput>,
}

impl OutputHandle {
    /// Wrap an output implementing both contracts
    pub fn new<T>(output: T) -> Self
    where
        T: Output + MessageOutput + 'static,
    {
        Self::from_arc(Arc::new(output))
    }

    /// Wrap an already shared output
    pub fn from_arc<T>(output: Arc<T>) -> Self
    where
        T: Output + MessageOutput + 'static,
    {
        Self {
            id: MessageOutput::id(output.as_ref()).to_string(),
            batch: output.clone(),
            message: output,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Batch view
    pub fn as_output(&self) -> Arc<dyn Output> {
        Arc::clone(&self.batch)
    }

    /// Per-event view
    pub fn as_message_output(&self) -> Arc<dyn MessageOutput> {
        Arc::clone(&self.message)
    }
}

impl std::fmt::Debug for OutputHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputHandle").field("id", &self.id).finish()
    }
}

/// Output factory
pub struct OutputFactory {
    constructors: HashMap<String, OutputConstructor>,
}

impl OutputFactory {
    /// Factory without any output type
    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Factory with the built-in `log`, `file` and `gelf` types
    pub fn with_builtins() -> Self {
        let mut factory = Self::empty();
        factory.register("log", |config| async move {
            Ok(OutputHandle::new(LogOutput::new(config.id)))
        });
        factory.register("file", |config| async move {
            let output = FileOutput::from_params(&config.id, &config.params).await?;
            Ok(OutputHandle::new(output))
        });
        factory.register("gelf", |config| async move {
            let output = GelfOutput::from_params(&config.id, &config.params).await?;
            Ok(OutputHandle::new(output))
        });
        factory
    }

    /// Register (or replace) the constructor for an output type
    pub fn register<F, Fut>(&mut self, output_type: impl Into<String>, constructor: F)
    where
        F: Fn(OutputConfig) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<OutputHandle, ContractError>> + Send + 'static,
    {
        let constructor: OutputConstructor = Arc::new(
            move |config| -> BoxFuture<Result<OutputHandle, ContractError>> {
                Box::pin(constructor(config))
            },
        );
        self.constructors.insert(output_type.into(), constructor);
    }

    /// Whether a constructor exists for the given type
    pub fn supports(&self, output_type: &str) -> bool {
        self.constructors.contains_key(output_type)
    }

    /// Registered output types, sorted
    pub fn output_types(&self) -> Vec<&str> {
        let mut types: Vec<_> = self.constructors.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    /// Construct and initialize an output from its configuration
    #[instrument(
        name = "output_factory_create",
        skip(self, config),
        fields(output = %config.id, output_type = %config.output_type)
    )]
    pub async fn create(&self, config: &OutputConfig) -> Result<OutputHandle, OutputError> {
        let constructor = self
            .constructors
            .get(&config.output_type)
            .ok_or_else(|| OutputError::unknown_type(&config.id, &config.output_type))?;

        let handle = constructor(config.clone())
            .await
            .map_err(|e| OutputError::creation(&config.id, e))?;

        debug!(output = %config.id, "Output created");
        Ok(handle)
    }
}

impl Default for OutputFactory {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_builtin_log_output() {
        let factory = OutputFactory::with_builtins();
        assert_eq!(factory.output_types(), vec!["file", "gelf", "log"]);

        let handle = factory
            .create(&OutputConfig::new("console", "log"))
            .await
            .unwrap();
        assert_eq!(handle.id(), "console");
        assert_eq!(handle.as_output().name(), "console");
        assert_eq!(handle.as_message_output().id(), "console");
    }

    #[tokio::test]
    async fn test_unknown_type() {
        let factory = OutputFactory::with_builtins();
        let err = factory
            .create(&OutputConfig::new("x", "kafka"))
            .await
            .unwrap_err();
        assert!(matches!(err, OutputError::UnknownType { .. }));
    }

    #[tokio::test]
    async fn test_creation_failure_is_wrapped() {
        let factory = OutputFactory::with_builtins();
        // gelf requires host/port/protocol
        let err = factory
            .create(&OutputConfig::new("g", "gelf"))
            .await
            .unwrap_err();
        assert!(matches!(err, OutputError::Creation { .. }));
    }

    #[tokio::test]
    async fn test_register_custom_type() {
        let mut factory = OutputFactory::empty();
        assert!(!factory.supports("log"));
        factory.register("console", |config| async move {
            Ok(OutputHandle::new(LogOutput::new(config.id)))
        });
        assert!(factory.supports("console"));
        let handle = factory
            .create(&OutputConfig::new("c1", "console"))
            .await
            .unwrap();
        assert_eq!(handle.id(), "c1");
    }
}
