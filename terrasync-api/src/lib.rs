#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod message;
pub mod radio;
pub mod storage;
pub mod time;
pub mod transport;

pub use message::{
    ALLOWED_WAKE_INTERVALS, DEFAULT_WAKE_INTERVAL_MINUTES, Mac, Message, NODE_TYPE_AIR_TEMP,
    NODE_TYPE_HUMIDITY, NODE_TYPE_LIGHT, NODE_TYPE_PH, NODE_TYPE_SOIL_MOISTURE, NodeState,
    RADIO_CHANNEL, clamp_wake_interval,
};
pub use radio::RadioLink;
pub use storage::{LocalStorage, MemoryStorage};
pub use time::{TimeProvider, WallClockTime};
pub use transport::{Protocol, TransportError, decode_message, encode_message};
