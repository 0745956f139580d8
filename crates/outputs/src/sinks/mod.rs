//! Built-in output implementations
//!
//! Contains LogOutput, FileOutput, and GelfOutput. Each one serves both as a
//! batch output and as a per-stream output.

mod file;
mod gelf;
mod log;

pub use self::file::FileOutput;
pub use self::gelf::{GelfConnectOptions, GelfOutput, GelfProtocol};
pub use self::log::LogOutput;
