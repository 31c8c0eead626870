use alloc::string::String;
use core::fmt;

use serde::{Deserialize, Serialize};

use super::time::WallClockTime;

/// Single fixed radio channel shared by the whole fleet.
pub const RADIO_CHANNEL: u8 = 1;

/// Wake interval used until the coordinator schedules something else.
pub const DEFAULT_WAKE_INTERVAL_MINUTES: u8 = 5;

/// Wake intervals the RTC alarm scheduler supports, in minutes.
pub const ALLOWED_WAKE_INTERVALS: [u8; 6] = [1, 5, 10, 20, 30, 60];

/// Node type tags carried in discovery and sensor messages.
pub const NODE_TYPE_AIR_TEMP: &str = "temperature";
pub const NODE_TYPE_SOIL_MOISTURE: &str = "soil_moisture";
pub const NODE_TYPE_HUMIDITY: &str = "humidity";
pub const NODE_TYPE_LIGHT: &str = "light";
pub const NODE_TYPE_PH: &str = "ph";

/// Clamp a requested wake interval to the supported set.
///
/// Zero means "every minute". Anything else snaps to the nearest allowed
/// value, resolving ties downward.
pub fn clamp_wake_interval(minutes: u8) -> u8 {
    if minutes == 0 {
        return 1;
    }
    let mut best = ALLOWED_WAKE_INTERVALS[0];
    let mut best_dist = u8::MAX;
    for candidate in ALLOWED_WAKE_INTERVALS {
        let dist = candidate.abs_diff(minutes);
        if dist < best_dist {
            best = candidate;
            best_dist = dist;
        }
    }
    best
}

/// A radio-layer MAC address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Mac(pub [u8; 6]);

impl Mac {
    /// All-ones broadcast address.
    pub const BROADCAST: Mac = Mac([0xFF; 6]);
    /// All-zero address, meaning "no peer bound".
    pub const UNSET: Mac = Mac([0; 6]);

    pub fn is_unset(&self) -> bool {
        self.0 == [0; 6]
    }

    pub fn is_broadcast(&self) -> bool {
        self.0 == [0xFF; 6]
    }

    /// 12-character uppercase hex form used by the persisted record store.
    pub fn to_hex(&self) -> String {
        let mut out = String::with_capacity(12);
        for byte in self.0 {
            let _ = fmt::Write::write_fmt(&mut out, format_args!("{:02X}", byte));
        }
        out
    }

    /// Parse the 12-character hex form; anything else maps to `UNSET`.
    pub fn from_hex(hex: &str) -> Mac {
        if hex.len() != 12 || !hex.is_ascii() {
            return Mac::UNSET;
        }
        let mut bytes = [0u8; 6];
        for (i, chunk) in hex.as_bytes().chunks_exact(2).enumerate() {
            let pair = match core::str::from_utf8(chunk) {
                Ok(pair) => pair,
                Err(_) => return Mac::UNSET,
            };
            match u8::from_str_radix(pair, 16) {
                Ok(byte) => bytes[i] = byte,
                Err(_) => return Mac::UNSET,
            }
        }
        Mac(bytes)
    }
}

impl fmt::Display for Mac {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

/// Node lifecycle state, ordered by trust: the registry only upgrades on
/// indirect signals and downgrades on explicit commands.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum NodeState {
    #[default]
    Unpaired,
    Paired,
    Deployed,
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeState::Unpaired => write!(f, "UNPAIRED"),
            NodeState::Paired => write!(f, "PAIRED"),
            NodeState::Deployed => write!(f, "DEPLOYED"),
        }
    }
}

/// Every frame exchanged between nodes and the mothership.
///
/// The serialized enum discriminant is the wire type tag; receivers
/// dispatch on it, never on payload length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    /// Node broadcast announcing itself while unpaired.
    DiscoveryRequest {
        node_id: String,
        node_type: String,
        /// Node uptime, for coordinator-side diagnostics only.
        uptime_ms: u32,
    },
    /// Coordinator reply binding the node to this coordinator.
    DiscoveryResponse {
        mothership_id: String,
        acknowledged: bool,
    },
    /// Coordinator broadcast asking unpaired nodes to announce themselves.
    DiscoveryScan { mothership_id: String },
    /// Node poll asking whether it is considered paired.
    PairingRequest { node_id: String },
    /// Poll reply; also doubles as a legacy pairing acknowledgment.
    PairingResponse {
        node_id: String,
        paired: bool,
        interval_minutes: u8,
    },
    /// Direct pairing command addressed to one node.
    PairingCommand {
        node_id: String,
        interval_minutes: u8,
        mothership_id: String,
    },
    /// Deploys a paired node: sets its clock and starts the alarm cycle.
    DeploymentCommand {
        node_id: String,
        clock: WallClockTime,
        interval_minutes: u8,
        mothership_id: String,
    },
    /// Changes the wake interval without touching lifecycle state.
    ScheduleCommand {
        interval_minutes: u8,
        mothership_id: String,
    },
    /// Node request for the coordinator's wall clock.
    TimeSyncRequest { node_id: String, uptime_ms: u32 },
    /// Coordinator's wall clock, as separate date/time components.
    TimeSyncResponse {
        clock: WallClockTime,
        mothership_id: String,
    },
    /// Unbinds a node from its coordinator.
    UnpairCommand { node_id: String },
    /// One sensor reading, stamped with the node's RTC unix time.
    SensorReading {
        node_id: String,
        sensor_type: String,
        value: f32,
        timestamp: u32,
    },
}

impl Message {
    /// Node identifier the message is addressed to or sent by, when it
    /// carries one.
    pub fn node_id(&self) -> Option<&str> {
        match self {
            Message::DiscoveryRequest { node_id, .. }
            | Message::PairingRequest { node_id }
            | Message::PairingResponse { node_id, .. }
            | Message::PairingCommand { node_id, .. }
            | Message::DeploymentCommand { node_id, .. }
            | Message::TimeSyncRequest { node_id, .. }
            | Message::UnpairCommand { node_id }
            | Message::SensorReading { node_id, .. } => Some(node_id),
            _ => None,
        }
    }
}
