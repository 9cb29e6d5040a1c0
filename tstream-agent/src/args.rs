//! CLI argument parsing.

use std::path::PathBuf;

use clap::Parser;
use tstream_common::LoggingConfig;

/// Telemetry collection agent.
#[derive(Parser, Debug, Clone)]
#[command(about = "Collects, normalizes and filters device telemetry")]
pub struct AgentArgs {
    /// Path to configuration file.
    #[arg(short, long, default_value = "tstream.json5")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Run a single collection and exit.
    #[arg(long)]
    pub once: bool,
}

impl AgentArgs {
    /// Logging settings with the CLI level override applied.
    pub fn logging(&self, configured: &LoggingConfig) -> LoggingConfig {
        match &self.log_level {
            Some(level) => configured.with_level(level.as_str()),
            None => configured.clone(),
        }
    }
}
