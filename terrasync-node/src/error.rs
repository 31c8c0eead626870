use core::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Two-wire bus NACK or timeout talking to the RTC.
    Bus,
    /// Radio stack rejected a send or peer operation.
    Radio,
    /// Wire message could not be encoded or decoded.
    Serialization,
    /// The RTC or a command carried an impossible calendar time.
    InvalidTime,
    /// Suspend hardware refused a sleep/wake operation.
    Sleep,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Bus => write!(f, "RTC bus error"),
            Error::Radio => write!(f, "radio error"),
            Error::Serialization => write!(f, "serialization error"),
            Error::InvalidTime => write!(f, "invalid calendar time"),
            Error::Sleep => write!(f, "sleep controller error"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

pub type Result<T> = core::result::Result<T, Error>;
