//! Output error types

use thiserror::Error;

/// Output lookup and instantiation errors
#[derive(Debug, Error)]
pub enum OutputError {
    /// No persisted configuration for this id
    #[error("output '{id}' not found")]
    NotFound { id: String },

    /// The factory has no constructor for this type discriminator
    #[error("unknown output type '{output_type}' for output '{id}'")]
    UnknownType { id: String, output_type: String },

    /// Construction or initialization failed
    #[error("failed to create output '{id}': {source}")]
    Creation {
        id: String,
        #[source]
        source: contracts::ContractError,
    },

    /// An earlier instantiation with the same configuration failed
    #[error("output '{id}' previously failed to start with its current configuration")]
    PreviouslyFailed { id: String },
}

impl OutputError {
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    pub fn unknown_type(id: impl Into<String>, output_type: impl Into<String>) -> Self {
        Self::UnknownType {
            id: id.into(),
            output_type: output_type.into(),
        }
    }

    pub fn creation(id: impl Into<String>, source: contracts::ContractError) -> Self {
        Self::Creation {
            id: id.into(),
            source,
        }
    }
}
