use alloc::string::String;
use core::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum TransportError {
    Serialization(String),
    Deserialization(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Serialization(detail) => write!(f, "serialization failed: {}", detail),
            TransportError::Deserialization(detail) => {
                write!(f, "deserialization failed: {}", detail)
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for TransportError {}
