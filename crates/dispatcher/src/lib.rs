//! # Dispatcher
//!
//! 批量输出缓冲与分发模块。
//!
//! 负责：
//! - 在加权缓冲区中累积归一化后的事件
//! - 达到容量时由写入方 flush，超时由周期任务 flush
//! - Fan-out 到所有 sinks (尽力而为)，随后提交 offset
//! - 关闭过程受 shutdown_timeout 约束

pub mod batched;
pub mod blocking;
pub mod buffer;
pub mod dispatcher;
pub mod error;
pub mod fanout;
pub mod health;
pub mod journal;
pub mod metrics;
pub mod scheduler;

pub use batched::BatchedDispatcher;
pub use blocking::BlockingDispatcher;
pub use buffer::WeightedBuffer;
pub use contracts::{Batch, Event, FilteredEvent};
pub use dispatcher::{BatchDispatcher, DispatcherBuilder, DispatcherState};
pub use error::DispatcherError;
pub use fanout::Fanout;
pub use health::{AlwaysHealthy, TcpProbeHealth, ToggleHealth};
pub use journal::MemoryJournal;
pub use metrics::{DispatcherMetrics, FlushTrigger, MetricsSnapshot};
pub use scheduler::PeriodicTask;
