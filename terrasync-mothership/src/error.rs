use core::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Persisted record store failed.
    Storage,
    /// Wire message could not be encoded or decoded.
    Serialization,
    /// No registered node with that address.
    UnknownNode,
    /// The node's lifecycle state does not allow the operation.
    NotEligible,
    /// Every transmit attempt was rejected by the radio.
    SendFailed,
    /// No wall-clock source is available to hand out.
    ClockUnavailable,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Storage => write!(f, "storage error"),
            Error::Serialization => write!(f, "serialization error"),
            Error::UnknownNode => write!(f, "unknown node"),
            Error::NotEligible => write!(f, "node state does not allow this operation"),
            Error::SendFailed => write!(f, "all send attempts failed"),
            Error::ClockUnavailable => write!(f, "wall clock unavailable"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

pub type Result<T> = core::result::Result<T, Error>;
