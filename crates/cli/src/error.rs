//! Error types for CLI operations.

use dispatcher::DispatcherError;
use outputs::OutputError;
use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// An output references a type no constructor is registered for
    #[error("Output '{id}' has unsupported type '{output_type}'")]
    UnsupportedOutputType { id: String, output_type: String },

    /// Event input could not be opened
    #[error("Failed to open event input {path}: {source}")]
    InputOpen {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Output construction error
    #[error(transparent)]
    Output(#[from] OutputError),

    /// Dispatcher construction error
    #[error(transparent)]
    Dispatcher(#[from] DispatcherError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    pub fn unsupported_output_type(id: impl Into<String>, output_type: impl Into<String>) -> Self {
        Self::UnsupportedOutputType {
            id: id.into(),
            output_type: output_type.into(),
        }
    }

    pub fn input_open(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::InputOpen {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
