//! JSON5 documents and logging settings.

use std::path::Path;

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::error::{Error, Result};

/// Log line layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// `logging` section shared by every tstream configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, e.g. `info` or `tstream_core=debug`.
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

impl LoggingConfig {
    /// Same layout, different filter directive.
    pub fn with_level(&self, level: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            format: self.format,
        }
    }
}

/// Read and parse a JSON5 file.
pub fn load_config<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;

    json5::from_str(&content)
        .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
}

/// Parse a JSON5 document held in memory.
pub fn parse_config<T: DeserializeOwned>(content: &str) -> Result<T> {
    json5::from_str(content).map_err(|e| Error::Config(e.to_string()))
}
