//! Pipeline orchestration module.

mod input;
mod orchestrator;
mod stats;

pub use input::{EventDecoder, EventSource};
pub use orchestrator::Pipeline;
pub use stats::PipelineStats;
