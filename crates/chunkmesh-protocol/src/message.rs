//! Message types and structures

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ProtocolError, Result};

/// Message type enumeration
///
/// Serialized as its integer discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
#[repr(u8)]
pub enum MessageType {
    /// Liveness check (0)
    Ping = 0,
    /// Liveness reply (1)
    Pong = 1,
    /// Request for the receiver's active peer addresses (2)
    NodeDiscovery = 2,
    /// List of active peer addresses (3)
    NodeAnnouncement = 3,
    /// Reserved for chunk transfer (4)
    FileRequest = 4,
    /// Reserved for chunk transfer (5)
    FileInfo = 5,
    /// Reserved for chunk transfer (6)
    FileChunk = 6,
    /// Error report (7)
    Error = 7,
}

impl MessageType {
    /// All message types, in discriminator order
    pub const ALL: [MessageType; 8] = [
        MessageType::Ping,
        MessageType::Pong,
        MessageType::NodeDiscovery,
        MessageType::NodeAnnouncement,
        MessageType::FileRequest,
        MessageType::FileInfo,
        MessageType::FileChunk,
        MessageType::Error,
    ];

    /// Create from the wire discriminator
    pub fn from_u64(value: u64) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.to_u64() == value)
            .ok_or(ProtocolError::InvalidMessageType(value))
    }

    /// Convert to the wire discriminator
    pub fn to_u64(self) -> u64 {
        self as u8 as u64
    }
}

impl TryFrom<u64> for MessageType {
    type Error = ProtocolError;

    fn try_from(value: u64) -> Result<Self> {
        MessageType::from_u64(value)
    }
}

impl From<MessageType> for u64 {
    fn from(value: MessageType) -> Self {
        value.to_u64()
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageType::Ping => write!(f, "Ping"),
            MessageType::Pong => write!(f, "Pong"),
            MessageType::NodeDiscovery => write!(f, "NodeDiscovery"),
            MessageType::NodeAnnouncement => write!(f, "NodeAnnouncement"),
            MessageType::FileRequest => write!(f, "FileRequest"),
            MessageType::FileInfo => write!(f, "FileInfo"),
            MessageType::FileChunk => write!(f, "FileChunk"),
            MessageType::Error => write!(f, "Error"),
        }
    }
}

/// A message on the ChunkMesh overlay: `{"type": <int>, "payload": <bytes>}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Message type
    #[serde(rename = "type")]
    pub message_type: MessageType,

    /// Opaque message payload, base64 on the wire
    #[serde(default, with = "payload_base64")]
    pub payload: Vec<u8>,
}

/// Payload bytes as a standard base64 string; `null` reads as empty
mod payload_base64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(payload: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(payload))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            Some(encoded) => STANDARD
                .decode(encoded.as_bytes())
                .map_err(serde::de::Error::custom),
            None => Ok(Vec::new()),
        }
    }
}

impl Message {
    /// Create a new message
    pub fn new(message_type: MessageType, payload: Vec<u8>) -> Self {
        Message {
            message_type,
            payload,
        }
    }

    /// Create a message with no payload
    pub fn empty(message_type: MessageType) -> Self {
        Self::new(message_type, Vec::new())
    }

    /// Build a NodeAnnouncement carrying a list of `host:port` addresses
    pub fn announcement(addresses: &[String]) -> Result<Self> {
        let payload = serde_json::to_vec(addresses)
            .map_err(|e| ProtocolError::SerializationFailed(e.to_string()))?;
        Ok(Self::new(MessageType::NodeAnnouncement, payload))
    }

    /// Parse the address list out of a NodeAnnouncement payload
    pub fn announced_addresses(&self) -> Result<Vec<String>> {
        serde_json::from_slice(&self.payload)
            .map_err(|e| ProtocolError::DeserializationFailed(e.to_string()))
    }

    /// Encode the envelope (without length prefix)
    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| ProtocolError::SerializationFailed(e.to_string()))
    }

    /// Decode an envelope (without length prefix)
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| ProtocolError::DeserializationFailed(e.to_string()))
    }
}
