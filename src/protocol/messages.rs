use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use super::types::{Cost, NodeId};

/// Destination costs as advertised by one neighbor. Ordered so identical
/// tables always serialize to identical bytes.
pub type AdvertisedVector = BTreeMap<NodeId, Cost>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Data(Vec<u8>),
    Advertisement(AdvertisedVector),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub source: NodeId,
    pub destination: Option<NodeId>,
    pub payload: Payload,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "UPPERCASE")]
enum WirePacket {
    Routing {
        source: NodeId,
        #[serde(default)]
        destination: Option<NodeId>,
        content: String,
    },
    Data {
        source: NodeId,
        destination: NodeId,
        content: Vec<u8>,
    },
}

impl Packet {
    pub fn data(source: NodeId, destination: NodeId, content: Vec<u8>) -> Self {
        Self {
            source,
            destination: Some(destination),
            payload: Payload::Data(content),
        }
    }

    pub fn advertisement(source: NodeId, vector: AdvertisedVector) -> Self {
        Self {
            source,
            destination: None,
            payload: Payload::Advertisement(vector),
        }
    }

    pub fn is_advertisement(&self) -> bool {
        matches!(self.payload, Payload::Advertisement(_))
    }

    pub fn serialize(&self) -> Result<Vec<u8>, serde_json::Error> {
        let wire = match &self.payload {
            Payload::Advertisement(vector) => WirePacket::Routing {
                source: self.source.clone(),
                destination: None,
                content: serde_json::to_string(vector)?,
            },
            Payload::Data(content) => WirePacket::Data {
                source: self.source.clone(),
                destination: self.destination.clone().unwrap_or_default(),
                content: content.clone(),
            },
        };
        serde_json::to_vec(&wire)
    }

    pub fn deserialize(data: &[u8]) -> Result<Self, serde_json::Error> {
        let packet = match serde_json::from_slice::<WirePacket>(data)? {
            WirePacket::Routing { source, content, .. } => {
                Packet::advertisement(source, serde_json::from_str(&content)?)
            }
            WirePacket::Data { source, destination, content } => {
                Packet::data(source, destination, content)
            }
        };
        Ok(packet)
    }
}
