use alloc::format;
use alloc::vec::Vec;

use serde::{Deserialize, Serialize};

use super::error::TransportError;

/// Serialization format selector. Postcard is the radio wire format;
/// JSON is used for the persisted record store and debugging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Protocol {
    #[default]
    Postcard,
    Json,
}

impl Protocol {
    pub fn encode<T: Serialize>(self, data: &T) -> Result<Vec<u8>, TransportError> {
        match self {
            Protocol::Postcard => postcard::to_allocvec(data)
                .map_err(|e| TransportError::Serialization(format!("{:?}", e))),
            Protocol::Json => serde_json::to_vec(data)
                .map_err(|e| TransportError::Serialization(format!("{}", e))),
        }
    }

    pub fn decode<T: for<'de> Deserialize<'de>>(self, data: &[u8]) -> Result<T, TransportError> {
        match self {
            Protocol::Postcard => postcard::from_bytes(data)
                .map_err(|e| TransportError::Deserialization(format!("{:?}", e))),
            Protocol::Json => serde_json::from_slice(data)
                .map_err(|e| TransportError::Deserialization(format!("{}", e))),
        }
    }
}
