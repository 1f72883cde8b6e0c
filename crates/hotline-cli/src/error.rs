//! CLI error type

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    ConfigError(#[from] hotline::ConfigError),

    /// Engine start-up failure, rendered with its full report context
    #[error("Engine error: {0}")]
    EngineError(String),

    #[error("Failed to install Ctrl-C handler: {0}")]
    Signal(#[from] ctrlc::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl From<error_stack::Report<hotline::EngineError>> for CliError {
    fn from(report: error_stack::Report<hotline::EngineError>) -> Self {
        CliError::EngineError(format!("{report:?}"))
    }
}
