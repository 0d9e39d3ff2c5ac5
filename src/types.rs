//! Wire types shared with the backend.
//!
//! These are serialized as JSON on the event channel (backend → session) and
//! in the apply request (session → backend). Field names are part of the
//! backend contract and must not change.

use serde::{Deserialize, Deserializer, Serialize};

/// Payload of the image update event pushed by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateEvent {
    /// Target node; string or integer on the wire, normalized to a string.
    #[serde(deserialize_with = "node_id_string")]
    pub node_id: String,
    /// Base64 image, usually a `data:image/png;base64,` URL.
    pub image_data: String,
}

/// Body of the apply request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitPayload {
    pub node_id: String,
    /// Row-major RGBA bytes, `width * height * 4` long.
    pub adjusted_data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Body of the apply response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn node_id_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(i64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(s) => s,
        RawId::Number(n) => n.to_string(),
    })
}
