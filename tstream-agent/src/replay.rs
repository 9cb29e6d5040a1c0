//! Fixture-backed endpoint client.
//!
//! Serves recorded management API payloads from disk instead of a device:
//! endpoint `sysInfo` of host `bigip1` is read from
//! `<directory>/bigip1/sysInfo.json`.

use std::path::PathBuf;

use serde_json::{Map, Value};
use tstream_core::{ConnectionOptions, EndpointClient, EndpointConnector, EndpointResponse};

/// Creates a [`ReplayClient`] per host.
#[derive(Debug, Clone)]
pub struct ReplayConnector {
    directory: PathBuf,
}

impl ReplayConnector {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }
}

impl EndpointConnector for ReplayConnector {
    type Client = ReplayClient;

    fn connect(&self, host: &str, options: &ConnectionOptions) -> tstream_core::Result<ReplayClient> {
        tracing::debug!(
            host = %host,
            protocol = %options.protocol,
            port = options.port,
            "Opening replay session"
        );
        Ok(ReplayClient {
            root: self.directory.join(host),
            endpoints: Map::new(),
        })
    }
}

/// Replays recorded payloads for one host.
#[derive(Debug)]
pub struct ReplayClient {
    root: PathBuf,
    endpoints: Map<String, Value>,
}

impl EndpointClient for ReplayClient {
    async fn authenticate(&mut self) -> tstream_core::Result<()> {
        match tokio::fs::metadata(&self.root).await {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(tstream_core::Error::load(
                "authentication",
                format!("{} is not a directory", self.root.display()),
            )),
            Err(e) => Err(tstream_core::Error::load(
                "authentication",
                format!("no recordings for host at {}: {}", self.root.display(), e),
            )),
        }
    }

    fn set_endpoints(&mut self, endpoints: Map<String, Value>) {
        self.endpoints = endpoints;
    }

    async fn load_endpoint(
        &self,
        id: &str,
        key_args: Option<&Value>,
    ) -> tstream_core::Result<EndpointResponse> {
        if !self.endpoints.is_empty() && !self.endpoints.contains_key(id) {
            return Err(tstream_core::Error::load(id, "unknown endpoint"));
        }
        if let Some(args) = key_args {
            tracing::trace!(endpoint = %id, %args, "Ignoring key arguments for replay");
        }

        let path = self.root.join(format!("{}.json", id));
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| tstream_core::Error::load(id, format!("{}: {}", path.display(), e)))?;
        let data: Value = serde_json::from_str(&content)
            .map_err(|e| tstream_core::Error::load(id, format!("{}: {}", path.display(), e)))?;

        Ok(EndpointResponse::new(data))
    }
}
