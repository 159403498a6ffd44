use serde::{Deserialize, Serialize};

use crate::error::LinkError;

/// One replicated mutation.
///
/// Identity is `(source, id)`. The payload is kept as the raw patch text the
/// client submitted so that a malformed payload replicates byte-for-byte and
/// every node rejects it the same way.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transaction {
    #[serde(rename = "Source")]
    pub source: String,
    #[serde(rename = "Id")]
    pub id: u64,
    #[serde(rename = "Payload")]
    pub payload: String,
}

impl Transaction {
    pub fn new(source: impl Into<String>, id: u64, payload: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            id,
            payload: payload.into(),
        }
    }

    /// Encodes the transaction as a replication text frame.
    pub fn to_frame(&self) -> Result<String, LinkError> {
        serde_json::to_string(self).map_err(|err| LinkError::Malformed(err.to_string()))
    }

    /// Decodes a replication text frame.
    pub fn from_frame(frame: &str) -> Result<Self, LinkError> {
        serde_json::from_str(frame).map_err(|err| LinkError::Malformed(err.to_string()))
    }
}
