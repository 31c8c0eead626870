mod error;
mod protocol;

pub use error::TransportError;
pub use protocol::Protocol;

use alloc::vec::Vec;

use super::message::Message;

/// Encode a wire message in the on-air format (postcard; the enum
/// discriminant is the type tag receivers dispatch on).
pub fn encode_message(message: &Message) -> Result<Vec<u8>, TransportError> {
    Protocol::Postcard.encode(message)
}

/// Decode a received radio frame.
pub fn decode_message(data: &[u8]) -> Result<Message, TransportError> {
    Protocol::Postcard.decode(data)
}
