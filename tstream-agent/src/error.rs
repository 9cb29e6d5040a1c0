//! Error types for the agent.

use thiserror::Error;

/// Result type alias using [`AgentError`].
pub type Result<T> = std::result::Result<T, AgentError>;

/// Errors that can occur while configuring or running the agent.
#[derive(Error, Debug)]
pub enum AgentError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration file not found.
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Configuration parse error.
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(String),

    /// Configuration validation error.
    #[error("Configuration validation failed: {0}")]
    ConfigValidation(String),

    /// A collection cycle failed.
    #[error("Collection failed: {0}")]
    Collection(#[from] tstream_core::Error),

    /// Snapshot encoding error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Writing a snapshot failed.
    #[error("Failed to write output for {consumer}: {message}")]
    Output { consumer: String, message: String },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AgentError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a configuration validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ConfigValidation(msg.into())
    }

    /// Create an output error for a consumer.
    pub fn output(consumer: impl Into<String>, message: impl ToString) -> Self {
        Self::Output {
            consumer: consumer.into(),
            message: message.to_string(),
        }
    }
}

impl From<json5::Error> for AgentError {
    fn from(err: json5::Error) -> Self {
        Self::ConfigParse(err.to_string())
    }
}

impl From<tstream_common::Error> for AgentError {
    fn from(err: tstream_common::Error) -> Self {
        match err {
            tstream_common::Error::Config(msg) => Self::Config(msg),
            err @ tstream_common::Error::Read { .. } => Self::Config(err.to_string()),
            other => Self::Serialization(other.to_string()),
        }
    }
}
