//! Error types for the collection engine.

use thiserror::Error;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while loading property tables, collecting or normalizing.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid declarative configuration (unknown operator, function or pattern).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A predicate needed a context field that was never resolved.
    #[error("Context error: {0}")]
    Context(String),

    /// The fetch collaborator failed to load an endpoint.
    #[error("Failed to load endpoint '{endpoint}': {message}")]
    Load { endpoint: String, message: String },

    /// A normalization stage received input it cannot handle.
    #[error("Normalization error: {0}")]
    Normalization(String),

    /// Any of the above, annotated with the property being processed.
    #[error("Property '{name}' (key '{key}'): {source}")]
    Property {
        name: String,
        key: String,
        #[source]
        source: Box<Error>,
    },

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a configuration error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a context error.
    pub fn context(msg: impl Into<String>) -> Self {
        Self::Context(msg.into())
    }

    /// Create a normalization error.
    pub fn normalization(msg: impl Into<String>) -> Self {
        Self::Normalization(msg.into())
    }

    /// Create a load error for an endpoint.
    pub fn load(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Load {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Annotate this error with the property it was raised for.
    ///
    /// Already annotated errors are returned unchanged.
    pub fn for_property(self, name: impl Into<String>, key: impl Into<String>) -> Self {
        match self {
            Self::Property { .. } => self,
            other => Self::Property {
                name: name.into(),
                key: key.into(),
                source: Box::new(other),
            },
        }
    }

    /// The innermost error, skipping property annotations.
    pub fn root(&self) -> &Error {
        match self {
            Self::Property { source, .. } => source.root(),
            other => other,
        }
    }
}

impl From<regex::Error> for Error {
    fn from(err: regex::Error) -> Self {
        Self::Configuration(format!("invalid pattern: {}", err))
    }
}

impl From<json5::Error> for Error {
    fn from(err: json5::Error) -> Self {
        Self::Configuration(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_annotation() {
        let err = Error::load("sysInfo", "connection refused").for_property("system", "sysInfo");

        assert_eq!(
            err.to_string(),
            "Property 'system' (key 'sysInfo'): Failed to load endpoint 'sysInfo': connection refused"
        );
        assert!(matches!(err.root(), Error::Load { .. }));
    }

    #[test]
    fn test_annotation_is_not_nested() {
        let err = Error::normalization("bad")
            .for_property("inner", "a")
            .for_property("outer", "b");

        match err {
            Error::Property { name, .. } => assert_eq!(name, "inner"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
