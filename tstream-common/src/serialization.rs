//! Snapshot encodings.

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::error::{Error, Result};

/// Encoding used when a collected snapshot is handed to an output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    #[default]
    Json,
    /// Compact binary, for consumers that ingest CBOR.
    Cbor,
}

/// Encode a snapshot.
pub fn encode<T: Serialize>(value: &T, format: Format) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    match format {
        Format::Json => serde_json::to_writer(&mut buf, value).map_err(|e| Error::encode(format, e))?,
        Format::Cbor => ciborium::into_writer(value, &mut buf).map_err(|e| Error::encode(format, e))?,
    }
    Ok(buf)
}

/// Decode a snapshot previously produced by [`encode`].
pub fn decode<T: DeserializeOwned>(data: &[u8], format: Format) -> Result<T> {
    match format {
        Format::Json => serde_json::from_slice(data).map_err(|e| Error::decode(format, e)),
        Format::Cbor => ciborium::from_reader(data).map_err(|e| Error::decode(format, e)),
    }
}
