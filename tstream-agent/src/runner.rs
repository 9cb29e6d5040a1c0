//! Agent runner for the collection lifecycle.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::io::AsyncWriteExt;
use tokio::signal;
use tokio::time::MissedTickBehavior;
use tstream_common::{Format, encode};
use tstream_core::{CollectOptions, DataFilter, PropertyEvaluator, PropertyTable};

use crate::config::AgentConfig;
use crate::error::{AgentError, Result};
use crate::replay::ReplayConnector;

/// A consumer with its long-lived filter.
struct Consumer {
    name: String,
    filter: DataFilter,
    output: Option<PathBuf>,
}

/// Drives periodic collections and hands filtered snapshots to consumers.
///
/// Handles:
/// - Property and endpoint table loading
/// - One collection per tick
/// - Per-consumer filtering, encoding and output
/// - Graceful shutdown on Ctrl+C
pub struct Agent {
    host: String,
    interval: Duration,
    format: Format,
    options: CollectOptions,
    evaluator: PropertyEvaluator<ReplayConnector>,
    consumers: Vec<Consumer>,
}

impl Agent {
    /// Build an agent from a validated configuration.
    pub fn new(config: &AgentConfig) -> Result<Self> {
        let source = std::fs::read_to_string(&config.properties).map_err(|e| {
            AgentError::config(format!(
                "Failed to read property table '{}': {}",
                config.properties.display(),
                e
            ))
        })?;
        let table = PropertyTable::parse(&source).map_err(|e| {
            AgentError::config(format!(
                "Invalid property table '{}': {}",
                config.properties.display(),
                e
            ))
        })?;
        let endpoints: Map<String, Value> = tstream_common::load_config(&config.endpoints)?;

        let consumers = config
            .consumers
            .iter()
            .map(|consumer| Consumer {
                name: consumer.name.clone(),
                filter: DataFilter::new(&consumer.sink),
                output: consumer.output.clone(),
            })
            .collect::<Vec<_>>();

        tracing::info!(
            host = %config.system.host,
            stats = table.stats.len(),
            endpoints = endpoints.len(),
            consumers = consumers.len(),
            "Agent configured"
        );

        Ok(Self {
            host: config.system.host.clone(),
            interval: Duration::from_secs(config.system.interval_secs),
            format: config.serialization,
            options: config.collect_options()?,
            evaluator: PropertyEvaluator::new(
                Arc::new(table),
                endpoints,
                ReplayConnector::new(&config.replay.directory),
            ),
            consumers,
        })
    }

    /// Run one collection and deliver it to every consumer.
    ///
    /// Returns the number of consumers written to.
    pub async fn collect_once(&self) -> Result<usize> {
        let snapshot = Value::Object(self.evaluator.collect(&self.host, &self.options).await?);

        for consumer in &self.consumers {
            let filtered = consumer.filter.apply(&snapshot);
            let bytes = encode(&filtered, self.format)?;
            self.write(consumer, &bytes).await?;
            tracing::debug!(consumer = %consumer.name, bytes = bytes.len(), "Snapshot delivered");
        }

        Ok(self.consumers.len())
    }

    async fn write(&self, consumer: &Consumer, bytes: &[u8]) -> Result<()> {
        match &consumer.output {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .map_err(|e| AgentError::output(&consumer.name, e))?;
                }
                tokio::fs::write(path, bytes)
                    .await
                    .map_err(|e| AgentError::output(&consumer.name, e))
            }
            None => {
                let mut stdout = tokio::io::stdout();
                stdout.write_all(bytes).await?;
                if self.format == Format::Json {
                    stdout.write_all(b"\n").await?;
                }
                stdout.flush().await?;
                Ok(())
            }
        }
    }

    /// Collect on every tick until Ctrl+C is received.
    ///
    /// A failed cycle is logged and the next tick proceeds normally.
    pub async fn run(&self) -> Result<()> {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let shutdown = signal::ctrl_c();
        tokio::pin!(shutdown);

        tracing::info!(
            host = %self.host,
            interval_secs = self.interval.as_secs(),
            "Agent running. Press Ctrl+C to stop."
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.collect_once().await {
                        tracing::warn!(host = %self.host, error = %e, "Collection cycle failed");
                    }
                }
                result = &mut shutdown => {
                    if let Err(e) = result {
                        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                    }
                    break;
                }
            }
        }

        tracing::info!(host = %self.host, "Received shutdown signal");
        Ok(())
    }
}
