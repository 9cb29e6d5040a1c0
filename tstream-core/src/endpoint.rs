//! Contract with the endpoint fetch collaborator.
//!
//! The core never talks to a device directly. A [`EndpointConnector`] builds a
//! client per host; the client authenticates, receives the endpoint table and
//! serves raw payloads by endpoint id.

use std::future::Future;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;

/// Connection settings handed to the connector untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionOptions {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_protocol")]
    pub protocol: String,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default, skip_serializing)]
    pub passphrase: Option<String>,

    #[serde(default)]
    pub allow_self_signed_cert: bool,
}

fn default_port() -> u16 {
    443
}

fn default_protocol() -> String {
    "https".to_string()
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            port: default_port(),
            protocol: default_protocol(),
            username: None,
            passphrase: None,
            allow_self_signed_cert: false,
        }
    }
}

/// Raw payload returned for one endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EndpointResponse {
    pub data: Value,
}

impl EndpointResponse {
    pub fn new(data: Value) -> Self {
        Self { data }
    }

    /// Insert `items: []` when the data is a mapping without `items`.
    pub fn ensure_items(&mut self) {
        if let Value::Object(map) = &mut self.data {
            map.entry("items").or_insert_with(|| Value::Array(Vec::new()));
        }
    }
}

/// Builds a client for one host.
pub trait EndpointConnector: Send + Sync {
    type Client: EndpointClient;

    fn connect(&self, host: &str, options: &ConnectionOptions) -> Result<Self::Client>;
}

/// A per-host session with the device management API.
pub trait EndpointClient: Send + Sync {
    /// Authenticate before any endpoint is loaded.
    fn authenticate(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Install the endpoint table (id to opaque descriptor).
    fn set_endpoints(&mut self, endpoints: Map<String, Value>);

    /// Fetch one endpoint, forwarding `key_args` verbatim.
    fn load_endpoint(
        &self,
        id: &str,
        key_args: Option<&Value>,
    ) -> impl Future<Output = Result<EndpointResponse>> + Send;
}
