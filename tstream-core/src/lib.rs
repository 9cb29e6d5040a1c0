//! Declarative telemetry collection engine.
//!
//! This crate turns a property table into a normalized, ordered snapshot of a
//! device's telemetry:
//!
//! - [`property`]: property tables and `if`/`then`/`else` resolution
//! - [`predicate`]: the closed registry of conditional predicates
//! - [`evaluator`]: context phases, concurrent collection, reshaping
//! - [`normalize`]: the staged normalization pipeline
//! - [`filter`]: per-sink blacklist filtering
//! - [`endpoint`]: the contract with the fetch collaborator
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tstream_core::{CollectOptions, PropertyEvaluator, PropertyTable};
//!
//! let table = Arc::new(PropertyTable::parse(&source)?);
//! let evaluator = PropertyEvaluator::new(table, endpoints, connector);
//! let snapshot = evaluator.collect("bigip1", &CollectOptions::default()).await?;
//! ```

pub mod context;
pub mod endpoint;
pub mod error;
pub mod evaluator;
pub mod filter;
pub mod normalize;
mod ordered;
pub mod predicate;
pub mod property;
pub mod template;

pub use context::Context;
pub use endpoint::{ConnectionOptions, EndpointClient, EndpointConnector, EndpointResponse};
pub use error::{Error, Result};
pub use evaluator::{CollectOptions, CollectionRun, PropertyEvaluator};
pub use filter::{DataFilter, SinkConfig};
pub use normalize::{NormalizeOptions, TagPattern, TagValue, normalize, parse_event};
pub use predicate::PredicateRegistry;
pub use property::{PropertyNode, PropertyTable};
