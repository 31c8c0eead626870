#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod rtc;
pub mod schedule;
pub mod sleep;

pub use config::NodeConfig;
pub use error::{Error, Result};
pub use lifecycle::{NodeIdentity, NodeLifecycle, SensorSource};
pub use rtc::{AlarmMatch, Ds3231, RtcTime};
pub use schedule::{AlarmBoundary, IntervalMode};
pub use sleep::{AlarmLatch, SleepControl, WakeCause, WakeCoordinator};
