//! # Outputs
//!
//! Output instantiation and stream routing.
//!
//! Responsibilities:
//! - Turn persisted output configuration into running outputs exactly once ([`OutputRegistry`])
//! - Resolve the outputs attached to a stream without hitting storage per event ([`StreamOutputRouter`])
//! - Provide the built-in output types ([`LogOutput`], [`FileOutput`], [`GelfOutput`])

pub mod cache;
pub mod error;
pub mod factory;
pub mod registry;
pub mod router;
pub mod sinks;
pub mod store;

pub use cache::{CacheStats, RouteCache};
pub use contracts::{MessageOutput, Output};
pub use error::OutputError;
pub use factory::{OutputFactory, OutputHandle};
pub use registry::OutputRegistry;
pub use router::StreamOutputRouter;
pub use sinks::{FileOutput, GelfConnectOptions, GelfOutput, GelfProtocol, LogOutput};
pub use store::MemoryOutputStore;
