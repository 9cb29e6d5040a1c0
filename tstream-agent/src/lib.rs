//! tstream agent
//!
//! Periodically collects a device's telemetry through the declarative engine in
//! `tstream-core`, filters the snapshot per consumer and writes it out as JSON
//! or CBOR.
//!
//! - [`args`] - CLI arguments
//! - [`config`] - Agent configuration (JSON5)
//! - [`replay`] - Fixture-backed endpoint client
//! - [`runner`] - Collection loop and output
//! - [`error`] - Error types

pub mod args;
pub mod config;
pub mod error;
pub mod replay;
pub mod runner;

pub use args::AgentArgs;
pub use config::{AgentConfig, ConsumerConfig, ReplayConfig, SystemConfig};
pub use error::{AgentError, Result};
pub use replay::{ReplayClient, ReplayConnector};
pub use runner::Agent;
