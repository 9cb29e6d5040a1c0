//! Agent configuration.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::{Map, Value};
use tstream_common::{Format, LoggingConfig};
use tstream_core::{CollectOptions, ConnectionOptions, SinkConfig, TagValue};

use crate::error::{AgentError, Result};

/// Complete agent configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Encoding of written snapshots.
    #[serde(default)]
    pub serialization: Format,

    /// The device to collect from.
    pub system: SystemConfig,

    /// Property table (JSON5).
    pub properties: PathBuf,

    /// Endpoint table (JSON5), handed to the endpoint client.
    pub endpoints: PathBuf,

    /// Fixture-backed endpoint client settings.
    pub replay: ReplayConfig,

    /// Downstream consumers, each with its own filter and output.
    #[serde(default)]
    pub consumers: Vec<ConsumerConfig>,
}

/// Device connection and collection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SystemConfig {
    pub host: String,

    /// Seconds between collections (default: 60).
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Tags injected into tagged records, in declared order.
    #[serde(default)]
    pub tags: Map<String, Value>,

    #[serde(default)]
    pub connection: ConnectionOptions,
}

fn default_interval() -> u64 {
    60
}

/// Directory of recorded payloads, laid out as `<directory>/<host>/<endpoint>.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct ReplayConfig {
    pub directory: PathBuf,
}

/// One downstream consumer.
#[derive(Debug, Clone, Deserialize)]
pub struct ConsumerConfig {
    pub name: String,

    #[serde(flatten)]
    pub sink: SinkConfig,

    /// File to write snapshots to; stdout when absent.
    #[serde(default)]
    pub output: Option<PathBuf>,
}

impl AgentConfig {
    /// Load and validate configuration from a JSON5 file.
    ///
    /// Relative paths in the file are resolved against its directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(AgentError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path)?;
        let mut config: Self = json5::from_str(&content)?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }

        config.validate()?;
        Ok(config)
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.properties);
        resolve(&mut self.endpoints);
        resolve(&mut self.replay.directory);
        for consumer in &mut self.consumers {
            if let Some(output) = consumer.output.as_mut() {
                resolve(output);
            }
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.system.host.trim().is_empty() {
            return Err(AgentError::validation("system.host must not be empty"));
        }
        if self.system.interval_secs == 0 {
            return Err(AgentError::validation("system.interval_secs must be greater than 0"));
        }

        let mut names = HashSet::new();
        for consumer in &self.consumers {
            if consumer.name.is_empty() {
                return Err(AgentError::validation("consumer name must not be empty"));
            }
            if !names.insert(consumer.name.as_str()) {
                return Err(AgentError::validation(format!(
                    "duplicate consumer name '{}'",
                    consumer.name
                )));
            }
        }

        self.tags()?;
        Ok(())
    }

    /// Configured tags, in declared order.
    pub fn tags(&self) -> Result<Vec<(String, TagValue)>> {
        self.system
            .tags
            .iter()
            .map(|(name, value)| {
                serde_json::from_value(value.clone())
                    .map(|tag| (name.clone(), tag))
                    .map_err(|e| AgentError::validation(format!("tag '{}': {}", name, e)))
            })
            .collect()
    }

    /// Options for one collection run.
    pub fn collect_options(&self) -> Result<CollectOptions> {
        Ok(CollectOptions {
            tags: self.tags()?,
            connection: self.system.connection.clone(),
        })
    }
}
