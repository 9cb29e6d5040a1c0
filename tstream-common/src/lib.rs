//! Shared plumbing for the tstream workspace.
//!
//! - [`config`] - JSON5 loading and the `logging` section
//! - [`serialization`] - JSON/CBOR snapshot encoding
//! - [`error`] - Error types

pub mod config;
pub mod error;
pub mod serialization;

pub use config::{LogFormat, LoggingConfig, load_config, parse_config};
pub use error::{Error, Result};
pub use serialization::{Format, decode, encode};

/// Install the global tracing subscriber.
///
/// Logs go to stderr so that stdout stays free for snapshots. `RUST_LOG`
/// overrides `config.level` when set.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{EnvFilter, Layer, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| Error::Config(format!("Invalid log level '{}': {}", config.level, e)))?;

    let layer = match config.format {
        LogFormat::Text => fmt::layer().with_writer(std::io::stderr).boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(false)
            .with_writer(std::io::stderr)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(layer.with_filter(filter))
        .try_init()
        .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))
}
