//! Dispatcher error types

use thiserror::Error;

/// Dispatcher-specific errors
#[derive(Debug, Error)]
pub enum DispatcherError {
    /// Constructed without any sink: every event would be discarded
    #[error("dispatcher has no sinks configured")]
    NoSinks,

    /// Lifecycle cannot go back from stopped to running
    #[error("dispatcher already stopped, create a new instance to restart")]
    AlreadyStopped,

    /// Write attempted after shutdown began
    #[error("dispatcher is not running (state: {state})")]
    NotRunning { state: String },

    /// Error from a contract collaborator
    #[error("contract error: {0}")]
    Contract(#[from] contracts::ContractError),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl DispatcherError {
    pub fn not_running(state: impl std::fmt::Display) -> Self {
        Self::NotRunning {
            state: state.to_string(),
        }
    }
}
