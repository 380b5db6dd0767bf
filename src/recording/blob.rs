use serde::{Deserialize, Serialize};

use super::event::RecordEvent;

/// Encoded media held in memory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalBlob {
    pub mime: String,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

impl LocalBlob {
    pub fn new(mime: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            mime: mime.into(),
            data,
        }
    }
}

/// A recorded blob, either fresh or already on the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BlobRef {
    /// URL of an uploaded record
    Remote(String),
    Local(LocalBlob),
}

impl BlobRef {
    pub fn is_remote(&self) -> bool {
        matches!(self, BlobRef::Remote(_))
    }
}

/// A finished take: camera blob, optional pointer overlay, event log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub webcam_blob: BlobRef,
    #[serde(default)]
    pub pointer_blob: Option<BlobRef>,
    pub events: Vec<RecordEvent>,
}

mod base64_bytes {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(serde::de::Error::custom)
    }
}
