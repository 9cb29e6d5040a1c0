use std::path::PathBuf;

use thiserror::Error;

use crate::serialization::Format;

/// Errors raised by the shared plumbing.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to read '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode snapshot as {format:?}: {message}")]
    Encode { format: Format, message: String },

    #[error("Failed to decode {format:?} payload: {message}")]
    Decode { format: Format, message: String },
}

impl Error {
    pub(crate) fn encode(format: Format, err: impl std::fmt::Display) -> Self {
        Self::Encode {
            format,
            message: err.to_string(),
        }
    }

    pub(crate) fn decode(format: Format, err: impl std::fmt::Display) -> Self {
        Self::Decode {
            format,
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
