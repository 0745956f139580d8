//! Layered error definitions
//!
//! Categorized by source: config / output / journal

use thiserror::Error;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Output Errors =====
    /// Output delivery error
    #[error("output '{output}' delivery error: {message}")]
    OutputDelivery { output: String, message: String },

    /// Output connection error
    #[error("output '{output}' connection error: {message}")]
    OutputConnection { output: String, message: String },

    /// Output could not be instantiated from its configuration
    #[error("output '{output}' instantiation error: {message}")]
    OutputInstantiation { output: String, message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create output delivery error
    pub fn output_delivery(output: impl Into<String>, message: impl Into<String>) -> Self {
        Self::OutputDelivery {
            output: output.into(),
            message: message.into(),
        }
    }

    /// Create output connection error
    pub fn output_connection(output: impl Into<String>, message: impl Into<String>) -> Self {
        Self::OutputConnection {
            output: output.into(),
            message: message.into(),
        }
    }

    /// Create output instantiation error
    pub fn output_instantiation(output: impl Into<String>, message: impl Into<String>) -> Self {
        Self::OutputInstantiation {
            output: output.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_carry_output_name() {
        let err = ContractError::output_delivery("gelf-1", "connection reset");
        assert_eq!(
            err.to_string(),
            "output 'gelf-1' delivery error: connection reset"
        );

        let err = ContractError::config_validation("streams[0].output_ids", "unknown output");
        assert!(err.to_string().contains("streams[0].output_ids"));
    }
}
