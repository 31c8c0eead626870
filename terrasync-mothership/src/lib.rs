#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod dispatch;
pub mod error;
pub mod registry;

pub use error::{Error, Result};
pub use registry::{FleetRegistry, MothershipConfig, NodeReading, RegisteredNode};
