//! Coordinator-side fleet registry.
//!
//! Tracks every node heard over the radio, owns the pairing and
//! deployment handshakes, and persists the paired roster so bindings
//! survive a coordinator reboot. Liveness is advisory: a node that goes
//! quiet is marked inactive but keeps its lifecycle state, since a
//! sleeping node looks exactly like a dead one.

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use embassy_time::Timer;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use terrasync_api::{
    LocalStorage, Mac, Message, NodeState, RadioLink, TimeProvider, clamp_wake_interval,
    decode_message,
};

use crate::dispatch::{send_frame, send_with_retry};
use crate::error::{Error, Result};

/// Record-store key for the paired-roster document.
pub const ROSTER_KEY: &str = "paired_nodes";

/// Newly registered radio peers need a beat before unicast is reliable.
const PEER_SETTLE_MS: u64 = 10;

#[derive(Debug, Clone)]
pub struct MothershipConfig {
    pub mothership_id: String,
    pub channel: u8,
    /// A node silent for longer than this is marked inactive.
    pub liveness_window_ms: u64,
    pub send_retries: u8,
    pub retry_delay_ms: u64,
    /// How often the whole deployed fleet gets a fresh clock.
    pub fleet_sync_interval_ms: u64,
}

impl Default for MothershipConfig {
    fn default() -> Self {
        Self {
            mothership_id: "MOTHERSHIP001".to_string(),
            channel: terrasync_api::RADIO_CHANNEL,
            liveness_window_ms: 300_000,
            send_retries: 3,
            retry_delay_ms: 100,
            fleet_sync_interval_ms: 86_400_000,
        }
    }
}

/// Everything the coordinator knows about one node.
#[derive(Debug, Clone)]
pub struct RegisteredNode {
    pub mac: Mac,
    pub node_id: String,
    pub node_type: String,
    pub state: NodeState,
    pub last_seen_ms: u64,
    pub is_active: bool,
    pub schedule_interval: u8,
    pub assigned_id: u16,
    pub friendly_name: Option<String>,
    pub last_time_sync_ms: u64,
}

/// Roster entry as written to the record store. Only the binding
/// survives a reboot; liveness is re-learned from traffic.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedNode {
    mac: String,
    node_id: String,
    node_type: String,
    state: NodeState,
    schedule_interval: u8,
    friendly_name: Option<String>,
}

/// A sensor value accepted from a deployed node, handed to the caller
/// for forwarding or storage.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeReading {
    pub node_id: String,
    pub sensor_type: String,
    pub value: f32,
    pub timestamp: u32,
}

/// The registry proper. The radio is borrowed per call so the caller's
/// receive loop keeps ownership of it.
pub struct FleetRegistry<S: LocalStorage, T: TimeProvider> {
    config: MothershipConfig,
    nodes: BTreeMap<Mac, RegisteredNode>,
    storage: S,
    clock: T,
    next_assigned_id: u16,
    last_fleet_sync_ms: Option<u64>,
}

impl<S: LocalStorage, T: TimeProvider> FleetRegistry<S, T> {
    pub fn new(config: MothershipConfig, storage: S, clock: T) -> Self {
        Self {
            config,
            nodes: BTreeMap::new(),
            storage,
            clock,
            next_assigned_id: 1,
            last_fleet_sync_ms: None,
        }
    }

    pub fn config(&self) -> &MothershipConfig {
        &self.config
    }

    pub fn node(&self, mac: Mac) -> Option<&RegisteredNode> {
        self.nodes.get(&mac)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &RegisteredNode> {
        self.nodes.values()
    }

    /// Resolve a node identifier to its current radio address, for
    /// operator commands that name nodes rather than MACs.
    pub fn find_by_node_id(&self, node_id: &str) -> Option<Mac> {
        self.nodes
            .values()
            .find(|node| node.node_id == node_id)
            .map(|node| node.mac)
    }

    pub fn set_friendly_name(&mut self, mac: Mac, name: &str) -> Result<()> {
        let node = self.nodes.get_mut(&mac).ok_or(Error::UnknownNode)?;
        node.friendly_name = Some(name.to_string());
        Ok(())
    }

    fn wall_clock(&self) -> Result<terrasync_api::WallClockTime> {
        self.clock.wall_clock().ok_or(Error::ClockUnavailable)
    }

    /// Process one received radio frame; returns the decoded sensor
    /// reading when the frame carried one.
    pub async fn handle_frame<R: RadioLink>(
        &mut self,
        radio: &mut R,
        sender: Mac,
        data: &[u8],
    ) -> Result<Option<NodeReading>> {
        let message = match decode_message(data) {
            Ok(message) => message,
            Err(err) => {
                debug!("undecodable frame from {}: {}", sender, err);
                return Ok(None);
            }
        };
        let now_ms = self.clock.monotonic_ms();

        match message {
            Message::DiscoveryRequest {
                node_id, node_type, ..
            } => {
                self.register_or_update(radio, sender, &node_id, &node_type, now_ms)
                    .await;
                send_frame(
                    radio,
                    sender,
                    &Message::DiscoveryResponse {
                        mothership_id: self.config.mothership_id.clone(),
                        acknowledged: true,
                    },
                )
                .await?;
            }
            Message::PairingRequest { node_id } => {
                let (paired, interval) = match self.nodes.get_mut(&sender) {
                    Some(node) => {
                        node.last_seen_ms = now_ms;
                        node.is_active = true;
                        (node.state >= NodeState::Paired, node.schedule_interval)
                    }
                    None => (false, terrasync_api::DEFAULT_WAKE_INTERVAL_MINUTES),
                };
                send_frame(
                    radio,
                    sender,
                    &Message::PairingResponse {
                        node_id,
                        paired,
                        interval_minutes: interval,
                    },
                )
                .await?;
            }
            Message::TimeSyncRequest { node_id, .. } => {
                let clock = self.wall_clock()?;
                if let Some(node) = self.nodes.get_mut(&sender) {
                    node.last_seen_ms = now_ms;
                    node.is_active = true;
                    node.last_time_sync_ms = now_ms;
                } else {
                    debug!("time sync from unregistered node {}", node_id);
                }
                send_frame(
                    radio,
                    sender,
                    &Message::TimeSyncResponse {
                        clock,
                        mothership_id: self.config.mothership_id.clone(),
                    },
                )
                .await?;
            }
            Message::SensorReading {
                node_id,
                sensor_type,
                value,
                timestamp,
            } => {
                // A reading from an address with no record means the
                // roster is behind (reboot with a lost roster, say).
                // The node is demonstrably deployed, so rebuild the
                // record rather than discard its data.
                if !self.nodes.contains_key(&sender) {
                    warn!("reading from unknown address {}, rebuilding record", sender);
                    self.register_or_update(radio, sender, &node_id, &sensor_type, now_ms)
                        .await;
                }
                let mut upgraded = false;
                if let Some(node) = self.nodes.get_mut(&sender) {
                    node.last_seen_ms = now_ms;
                    node.is_active = true;
                    // A reading proves the deployment handshake
                    // completed even if our ack-side bookkeeping
                    // missed it.
                    if node.state < NodeState::Deployed {
                        info!("{} confirmed deployed by first reading", node.node_id);
                        node.state = NodeState::Deployed;
                        upgraded = true;
                    }
                }
                if upgraded {
                    self.persist().await?;
                }
                return Ok(Some(NodeReading {
                    node_id,
                    sensor_type,
                    value,
                    timestamp,
                }));
            }
            other => {
                debug!("ignoring frame {:?} from {}", other.node_id(), sender);
            }
        }
        Ok(None)
    }

    /// Insert or refresh a node record. Handles a node re-announcing
    /// under a new MAC after a board swap: the old record for the same
    /// node id is dropped so the identifier stays unique.
    async fn register_or_update<R: RadioLink>(
        &mut self,
        radio: &mut R,
        mac: Mac,
        node_id: &str,
        node_type: &str,
        now_ms: u64,
    ) {
        if let Some(node) = self.nodes.get_mut(&mac) {
            node.last_seen_ms = now_ms;
            node.is_active = true;
            // Announcing again never downgrades an established binding.
            return;
        }

        let stale: Vec<Mac> = self
            .nodes
            .values()
            .filter(|node| node.node_id == node_id)
            .map(|node| node.mac)
            .collect();
        for old_mac in stale {
            warn!("{} moved from {} to {}", node_id, old_mac, mac);
            if let Err(err) = radio.remove_peer(old_mac) {
                debug!("stale peer removal failed: {:?}", err);
            }
            self.nodes.remove(&old_mac);
        }

        if let Err(err) = radio.add_peer(mac, self.config.channel) {
            warn!("peer registration for {} failed: {:?}", mac, err);
        }
        Timer::after_millis(PEER_SETTLE_MS).await;

        let assigned_id = self.next_assigned_id;
        self.next_assigned_id = self.next_assigned_id.wrapping_add(1).max(1);
        info!("registered {} ({}) at {}", node_id, node_type, mac);
        self.nodes.insert(
            mac,
            RegisteredNode {
                mac,
                node_id: node_id.to_string(),
                node_type: node_type.to_string(),
                state: NodeState::Unpaired,
                last_seen_ms: now_ms,
                is_active: true,
                schedule_interval: terrasync_api::DEFAULT_WAKE_INTERVAL_MINUTES,
                assigned_id,
                friendly_name: None,
                last_time_sync_ms: 0,
            },
        );
    }

    /// Pair a registered node. The state flips to PAIRED before the
    /// command goes out and rolls back if every attempt is rejected, so
    /// the registry never claims a binding the node cannot know about.
    pub async fn pair<R: RadioLink>(&mut self, radio: &mut R, mac: Mac, interval: u8) -> Result<()> {
        let interval = clamp_wake_interval(interval);
        let (node_id, previous) = {
            let node = self.nodes.get_mut(&mac).ok_or(Error::UnknownNode)?;
            let previous = node.state;
            node.state = NodeState::Paired;
            node.schedule_interval = interval;
            (node.node_id.clone(), previous)
        };

        let command = Message::PairingCommand {
            node_id: node_id.clone(),
            interval_minutes: interval,
            mothership_id: self.config.mothership_id.clone(),
        };
        if let Err(err) = send_with_retry(
            radio,
            mac,
            &command,
            self.config.send_retries,
            self.config.retry_delay_ms,
        )
        .await
        {
            if let Some(node) = self.nodes.get_mut(&mac) {
                node.state = previous;
            }
            return Err(err);
        }

        // Older node firmware acknowledges pairing via the poll reply.
        let ack = Message::PairingResponse {
            node_id,
            paired: true,
            interval_minutes: interval,
        };
        if let Err(err) = send_frame(radio, mac, &ack).await {
            debug!("legacy pairing ack not delivered: {:?}", err);
        }

        self.persist().await
    }

    /// Deploy a paired node: hand it the current wall clock and start
    /// its alarm cycle.
    pub async fn deploy<R: RadioLink>(&mut self, radio: &mut R, mac: Mac) -> Result<()> {
        let clock = self.wall_clock()?;
        let now_ms = self.clock.monotonic_ms();
        let (node_id, interval) = {
            let node = self.nodes.get(&mac).ok_or(Error::UnknownNode)?;
            if node.state < NodeState::Paired {
                return Err(Error::NotEligible);
            }
            (node.node_id.clone(), node.schedule_interval)
        };

        let command = Message::DeploymentCommand {
            node_id: node_id.clone(),
            clock,
            interval_minutes: interval,
            mothership_id: self.config.mothership_id.clone(),
        };
        send_with_retry(
            radio,
            mac,
            &command,
            self.config.send_retries,
            self.config.retry_delay_ms,
        )
        .await?;

        if let Some(node) = self.nodes.get_mut(&mac) {
            node.state = NodeState::Deployed;
            node.last_time_sync_ms = now_ms;
        }
        info!("deployed {} with {}-minute interval", node_id, interval);
        self.persist().await
    }

    /// Push a new wake interval to every paired and deployed node.
    pub async fn broadcast_wake_interval<R: RadioLink>(
        &mut self,
        radio: &mut R,
        interval: u8,
    ) -> Result<()> {
        let interval = clamp_wake_interval(interval);
        let command = Message::ScheduleCommand {
            interval_minutes: interval,
            mothership_id: self.config.mothership_id.clone(),
        };
        let targets: Vec<Mac> = self
            .nodes
            .values()
            .filter(|node| node.state >= NodeState::Paired)
            .map(|node| node.mac)
            .collect();
        for mac in targets {
            if let Err(err) = send_frame(radio, mac, &command).await {
                warn!("schedule update to {} failed: {}", mac, err);
                continue;
            }
            if let Some(node) = self.nodes.get_mut(&mac) {
                node.schedule_interval = interval;
            }
        }
        self.persist().await
    }

    /// Push the current wall clock to one node.
    pub async fn send_time_sync<R: RadioLink>(&mut self, radio: &mut R, mac: Mac) -> Result<()> {
        let clock = self.wall_clock()?;
        let now_ms = self.clock.monotonic_ms();
        if !self.nodes.contains_key(&mac) {
            return Err(Error::UnknownNode);
        }
        send_frame(
            radio,
            mac,
            &Message::TimeSyncResponse {
                clock,
                mothership_id: self.config.mothership_id.clone(),
            },
        )
        .await?;
        if let Some(node) = self.nodes.get_mut(&mac) {
            node.last_time_sync_ms = now_ms;
        }
        Ok(())
    }

    /// Daily fleet-wide clock refresh; a no-op until the interval has
    /// elapsed since the last one.
    pub async fn sync_fleet_time<R: RadioLink>(&mut self, radio: &mut R) -> Result<()> {
        let now_ms = self.clock.monotonic_ms();
        if let Some(last) = self.last_fleet_sync_ms {
            if now_ms.saturating_sub(last) < self.config.fleet_sync_interval_ms {
                return Ok(());
            }
        }
        let clock = self.wall_clock()?;
        let message = Message::TimeSyncResponse {
            clock,
            mothership_id: self.config.mothership_id.clone(),
        };
        let targets: Vec<Mac> = self
            .nodes
            .values()
            .filter(|node| node.state == NodeState::Deployed)
            .map(|node| node.mac)
            .collect();
        for mac in targets {
            if let Err(err) = send_frame(radio, mac, &message).await {
                warn!("fleet time sync to {} failed: {}", mac, err);
                continue;
            }
            if let Some(node) = self.nodes.get_mut(&mac) {
                node.last_time_sync_ms = now_ms;
            }
        }
        self.last_fleet_sync_ms = Some(now_ms);
        Ok(())
    }

    /// Ask any unpaired nodes in range to announce themselves.
    pub async fn discovery_scan<R: RadioLink>(&mut self, radio: &mut R) -> Result<()> {
        send_frame(
            radio,
            Mac::BROADCAST,
            &Message::DiscoveryScan {
                mothership_id: self.config.mothership_id.clone(),
            },
        )
        .await
    }

    /// Unbind a node. The local record and roster are cleaned up first;
    /// the over-the-air command is best-effort, since the node may be
    /// asleep and will re-learn its state at the next contact anyway.
    pub async fn unpair<R: RadioLink>(&mut self, radio: &mut R, mac: Mac) -> Result<()> {
        let node_id = {
            let node = self.nodes.get_mut(&mac).ok_or(Error::UnknownNode)?;
            node.state = NodeState::Unpaired;
            node.node_id.clone()
        };
        if let Err(err) = radio.remove_peer(mac) {
            debug!("peer removal for {} failed: {:?}", mac, err);
        }
        self.persist().await?;

        let command = Message::UnpairCommand { node_id };
        if let Err(err) = send_frame(radio, mac, &command).await {
            warn!("unpair command to {} not delivered: {}", mac, err);
        }
        Ok(())
    }

    /// Liveness sweep: nodes silent beyond the window go inactive but
    /// keep their lifecycle state.
    pub fn sweep(&mut self) {
        let now_ms = self.clock.monotonic_ms();
        for node in self.nodes.values_mut() {
            if node.is_active
                && now_ms.saturating_sub(node.last_seen_ms) > self.config.liveness_window_ms
            {
                info!("{} went quiet, marking inactive", node.node_id);
                node.is_active = false;
            }
        }
    }

    /// Restore the paired roster from the record store and re-register
    /// the radio peers. Nodes come back inactive until heard from.
    pub async fn load_roster<R: RadioLink>(&mut self, radio: &mut R) -> Result<()> {
        let raw = match self.storage.get_item(ROSTER_KEY).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return Ok(()),
            Err(err) => {
                warn!("roster read failed: {:?}", err);
                return Err(Error::Storage);
            }
        };
        let persisted: Vec<PersistedNode> = match serde_json::from_str(&raw) {
            Ok(persisted) => persisted,
            Err(err) => {
                warn!("corrupt roster ({}), starting empty", err);
                return Ok(());
            }
        };

        for entry in persisted {
            let mac = Mac::from_hex(&entry.mac);
            if mac.is_unset() {
                warn!("skipping roster entry with bad address {}", entry.mac);
                continue;
            }
            if let Err(err) = radio.add_peer(mac, self.config.channel) {
                warn!("peer re-registration for {} failed: {:?}", mac, err);
            }
            let assigned_id = self.next_assigned_id;
            self.next_assigned_id = self.next_assigned_id.wrapping_add(1).max(1);
            self.nodes.insert(
                mac,
                RegisteredNode {
                    mac,
                    node_id: entry.node_id,
                    node_type: entry.node_type,
                    state: entry.state,
                    last_seen_ms: 0,
                    is_active: false,
                    schedule_interval: entry.schedule_interval,
                    assigned_id,
                    friendly_name: entry.friendly_name,
                    last_time_sync_ms: 0,
                },
            );
        }
        info!("restored {} roster entries", self.nodes.len());
        Ok(())
    }

    /// Write the paired roster. Unpaired records are registry-local and
    /// not persisted.
    async fn persist(&mut self) -> Result<()> {
        let persisted: Vec<PersistedNode> = self
            .nodes
            .values()
            .filter(|node| node.state >= NodeState::Paired)
            .map(|node| PersistedNode {
                mac: node.mac.to_hex(),
                node_id: node.node_id.clone(),
                node_type: node.node_type.clone(),
                state: node.state,
                schedule_interval: node.schedule_interval,
                friendly_name: node.friendly_name.clone(),
            })
            .collect();
        let raw = serde_json::to_string(&persisted).map_err(|_| Error::Serialization)?;
        self.storage
            .set_item(ROSTER_KEY, &raw)
            .await
            .map_err(|err| {
                warn!("roster write failed: {:?}", err);
                Error::Storage
            })
    }
}

#[cfg(test)]
mod tests {
    use alloc::rc::Rc;
    use core::cell::Cell;
    use terrasync_api::{MemoryStorage, NODE_TYPE_AIR_TEMP, WallClockTime, encode_message};

    use super::*;

    const NODE_A: Mac = Mac([0xAA, 0, 0, 0, 0, 0x01]);
    const NODE_B: Mac = Mac([0xBB, 0, 0, 0, 0, 0x02]);

    struct MockRadio {
        peers: Vec<Mac>,
        sent: Vec<(Mac, Message)>,
        fail_send: bool,
    }

    impl MockRadio {
        fn new() -> Self {
            Self {
                peers: Vec::new(),
                sent: Vec::new(),
                fail_send: false,
            }
        }
    }

    impl RadioLink for MockRadio {
        type Error = &'static str;

        fn add_peer(&mut self, mac: Mac, _channel: u8) -> core::result::Result<(), &'static str> {
            if !self.peers.contains(&mac) {
                self.peers.push(mac);
            }
            Ok(())
        }

        fn remove_peer(&mut self, mac: Mac) -> core::result::Result<(), &'static str> {
            self.peers.retain(|peer| *peer != mac);
            Ok(())
        }

        async fn send(
            &mut self,
            dest: Mac,
            payload: &[u8],
        ) -> core::result::Result<(), &'static str> {
            if self.fail_send {
                return Err("send rejected");
            }
            let message = decode_message(payload).map_err(|_| "bad frame")?;
            self.sent.push((dest, message));
            Ok(())
        }
    }

    #[derive(Clone)]
    struct MockClock {
        now_ms: Rc<Cell<u64>>,
        wall: Option<WallClockTime>,
    }

    impl MockClock {
        fn new() -> Self {
            Self {
                now_ms: Rc::new(Cell::new(0)),
                wall: Some(WallClockTime {
                    year: 2025,
                    month: 1,
                    day: 1,
                    hour: 9,
                    minute: 0,
                    second: 0,
                }),
            }
        }

        fn advance(&self, ms: u64) {
            self.now_ms.set(self.now_ms.get() + ms);
        }
    }

    impl TimeProvider for MockClock {
        fn monotonic_ms(&self) -> u64 {
            self.now_ms.get()
        }

        fn wall_clock(&self) -> Option<WallClockTime> {
            self.wall
        }
    }

    fn registry(clock: MockClock) -> FleetRegistry<MemoryStorage, MockClock> {
        FleetRegistry::new(MothershipConfig::default(), MemoryStorage::new(), clock)
    }

    fn announce(node_id: &str) -> Vec<u8> {
        encode_message(&Message::DiscoveryRequest {
            node_id: node_id.to_string(),
            node_type: NODE_TYPE_AIR_TEMP.to_string(),
            uptime_ms: 1_000,
        })
        .unwrap()
    }

    async fn register(
        registry: &mut FleetRegistry<MemoryStorage, MockClock>,
        radio: &mut MockRadio,
        mac: Mac,
        node_id: &str,
    ) {
        registry
            .handle_frame(radio, mac, &announce(node_id))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn discovery_registers_and_acknowledges() {
        let clock = MockClock::new();
        let mut registry = registry(clock);
        let mut radio = MockRadio::new();

        register(&mut registry, &mut radio, NODE_A, "TEMP_001").await;

        let node = registry.node(NODE_A).unwrap();
        assert_eq!(node.state, NodeState::Unpaired);
        assert!(node.is_active);
        assert_eq!(node.assigned_id, 1);
        assert!(radio.peers.contains(&NODE_A));
        assert!(matches!(
            radio.sent.last(),
            Some((dest, Message::DiscoveryResponse { acknowledged: true, .. }))
                if *dest == NODE_A
        ));
    }

    #[tokio::test]
    async fn pairing_sends_command_and_persists() {
        let clock = MockClock::new();
        let mut registry = registry(clock);
        let mut radio = MockRadio::new();
        register(&mut registry, &mut radio, NODE_A, "TEMP_001").await;

        registry.pair(&mut radio, NODE_A, 10).await.unwrap();

        assert_eq!(registry.node(NODE_A).unwrap().state, NodeState::Paired);
        assert!(radio.sent.iter().any(|(dest, message)| {
            *dest == NODE_A
                && matches!(
                    message,
                    Message::PairingCommand { interval_minutes: 10, .. }
                )
        }));

        let raw = registry
            .storage
            .get_item(ROSTER_KEY)
            .await
            .unwrap()
            .unwrap();
        assert!(raw.contains("TEMP_001"));
    }

    #[tokio::test]
    async fn pairing_rolls_back_when_every_send_fails() {
        let clock = MockClock::new();
        let mut registry = registry(clock);
        let mut radio = MockRadio::new();
        register(&mut registry, &mut radio, NODE_A, "TEMP_001").await;

        radio.fail_send = true;
        let result = registry.pair(&mut radio, NODE_A, 5).await;
        assert_eq!(result, Err(Error::SendFailed));
        assert_eq!(registry.node(NODE_A).unwrap().state, NodeState::Unpaired);
    }

    #[tokio::test]
    async fn deploy_requires_pairing_and_a_clock() {
        let clock = MockClock::new();
        let mut registry = registry(clock.clone());
        let mut radio = MockRadio::new();
        register(&mut registry, &mut radio, NODE_A, "TEMP_001").await;

        assert_eq!(
            registry.deploy(&mut radio, NODE_A).await,
            Err(Error::NotEligible)
        );

        registry.pair(&mut radio, NODE_A, 5).await.unwrap();
        registry.deploy(&mut radio, NODE_A).await.unwrap();
        assert_eq!(registry.node(NODE_A).unwrap().state, NodeState::Deployed);
        assert!(radio.sent.iter().any(|(dest, message)| {
            *dest == NODE_A && matches!(message, Message::DeploymentCommand { .. })
        }));

        // Without a wall clock the operation refuses outright.
        let mut blind = FleetRegistry::new(
            MothershipConfig::default(),
            MemoryStorage::new(),
            MockClock {
                now_ms: Rc::new(Cell::new(0)),
                wall: None,
            },
        );
        register(&mut blind, &mut radio, NODE_B, "TEMP_002").await;
        blind.pair(&mut radio, NODE_B, 5).await.unwrap();
        assert_eq!(
            blind.deploy(&mut radio, NODE_B).await,
            Err(Error::ClockUnavailable)
        );
    }

    #[tokio::test]
    async fn reading_upgrades_state_and_is_returned() {
        let clock = MockClock::new();
        let mut registry = registry(clock);
        let mut radio = MockRadio::new();
        register(&mut registry, &mut radio, NODE_A, "TEMP_001").await;
        registry.pair(&mut radio, NODE_A, 5).await.unwrap();

        let frame = encode_message(&Message::SensorReading {
            node_id: "TEMP_001".to_string(),
            sensor_type: NODE_TYPE_AIR_TEMP.to_string(),
            value: 21.5,
            timestamp: 1_735_722_000,
        })
        .unwrap();
        let reading = registry
            .handle_frame(&mut radio, NODE_A, &frame)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(reading.value, 21.5);
        assert_eq!(registry.node(NODE_A).unwrap().state, NodeState::Deployed);
    }

    #[tokio::test]
    async fn reading_from_unknown_mac_rebuilds_the_record() {
        // A coordinator that lost its roster must not discard data from
        // nodes that are already deployed and asleep between readings.
        let clock = MockClock::new();
        let mut registry = registry(clock);
        let mut radio = MockRadio::new();

        let frame = encode_message(&Message::SensorReading {
            node_id: "TEMP_001".to_string(),
            sensor_type: NODE_TYPE_AIR_TEMP.to_string(),
            value: 18.25,
            timestamp: 1_735_722_000,
        })
        .unwrap();
        let reading = registry
            .handle_frame(&mut radio, NODE_A, &frame)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reading.node_id, "TEMP_001");

        let node = registry.node(NODE_A).unwrap();
        assert_eq!(node.state, NodeState::Deployed);
        assert!(node.is_active);
        assert_eq!(node.node_type, NODE_TYPE_AIR_TEMP);
        assert!(radio.peers.contains(&NODE_A));

        // The rebuilt binding survives the next reboot.
        let raw = registry
            .storage
            .get_item(ROSTER_KEY)
            .await
            .unwrap()
            .unwrap();
        assert!(raw.contains("TEMP_001"));
    }

    #[tokio::test]
    async fn announcing_again_never_downgrades() {
        let clock = MockClock::new();
        let mut registry = registry(clock);
        let mut radio = MockRadio::new();
        register(&mut registry, &mut radio, NODE_A, "TEMP_001").await;
        registry.pair(&mut radio, NODE_A, 5).await.unwrap();
        registry.deploy(&mut radio, NODE_A).await.unwrap();

        register(&mut registry, &mut radio, NODE_A, "TEMP_001").await;
        assert_eq!(registry.node(NODE_A).unwrap().state, NodeState::Deployed);
    }

    #[tokio::test]
    async fn node_id_moving_to_a_new_mac_drops_the_old_record() {
        let clock = MockClock::new();
        let mut registry = registry(clock);
        let mut radio = MockRadio::new();
        register(&mut registry, &mut radio, NODE_A, "TEMP_001").await;
        register(&mut registry, &mut radio, NODE_B, "TEMP_001").await;

        assert!(registry.node(NODE_A).is_none());
        assert!(registry.node(NODE_B).is_some());
        assert!(!radio.peers.contains(&NODE_A));
    }

    #[tokio::test]
    async fn sweep_marks_quiet_nodes_inactive_but_keeps_state() {
        let clock = MockClock::new();
        let mut registry = registry(clock.clone());
        let mut radio = MockRadio::new();
        register(&mut registry, &mut radio, NODE_A, "TEMP_001").await;
        registry.pair(&mut radio, NODE_A, 5).await.unwrap();
        registry.deploy(&mut radio, NODE_A).await.unwrap();

        // 300 seconds of silence is still inside the window.
        clock.advance(300_000);
        registry.sweep();
        assert!(registry.node(NODE_A).unwrap().is_active);

        clock.advance(1_000);
        registry.sweep();
        let node = registry.node(NODE_A).unwrap();
        assert!(!node.is_active);
        assert_eq!(node.state, NodeState::Deployed);
    }

    #[tokio::test]
    async fn roster_roundtrip_restores_bindings_and_peers() {
        let clock = MockClock::new();
        let mut registry = registry(clock.clone());
        let mut radio = MockRadio::new();
        register(&mut registry, &mut radio, NODE_A, "TEMP_001").await;
        registry.pair(&mut radio, NODE_A, 10).await.unwrap();
        registry.deploy(&mut radio, NODE_A).await.unwrap();

        let storage = registry.storage;
        let mut restored = FleetRegistry::new(MothershipConfig::default(), storage, clock);
        let mut fresh_radio = MockRadio::new();
        restored.load_roster(&mut fresh_radio).await.unwrap();

        let node = restored.node(NODE_A).unwrap();
        assert_eq!(node.state, NodeState::Deployed);
        assert_eq!(node.schedule_interval, 10);
        assert!(!node.is_active);
        assert!(fresh_radio.peers.contains(&NODE_A));
    }

    #[tokio::test]
    async fn unpair_cleans_up_before_notifying() {
        let clock = MockClock::new();
        let mut registry = registry(clock);
        let mut radio = MockRadio::new();
        register(&mut registry, &mut radio, NODE_A, "TEMP_001").await;
        registry.pair(&mut radio, NODE_A, 5).await.unwrap();

        registry.unpair(&mut radio, NODE_A).await.unwrap();
        assert_eq!(registry.node(NODE_A).unwrap().state, NodeState::Unpaired);
        assert!(!radio.peers.contains(&NODE_A));
        assert!(radio.sent.iter().any(|(dest, message)| {
            *dest == NODE_A && matches!(message, Message::UnpairCommand { .. })
        }));

        // The roster no longer carries the binding.
        let raw = registry
            .storage
            .get_item(ROSTER_KEY)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(raw, "[]");
    }

    #[tokio::test]
    async fn broadcast_interval_is_clamped_and_tracked() {
        let clock = MockClock::new();
        let mut registry = registry(clock);
        let mut radio = MockRadio::new();
        register(&mut registry, &mut radio, NODE_A, "TEMP_001").await;
        registry.pair(&mut radio, NODE_A, 5).await.unwrap();

        registry
            .broadcast_wake_interval(&mut radio, 15)
            .await
            .unwrap();
        assert_eq!(registry.node(NODE_A).unwrap().schedule_interval, 10);
        assert!(radio.sent.iter().any(|(dest, message)| {
            *dest == NODE_A
                && matches!(
                    message,
                    Message::ScheduleCommand { interval_minutes: 10, .. }
                )
        }));
    }

    #[tokio::test]
    async fn fleet_time_sync_skips_until_interval_elapses() {
        let clock = MockClock::new();
        let mut registry = registry(clock.clone());
        let mut radio = MockRadio::new();
        register(&mut registry, &mut radio, NODE_A, "TEMP_001").await;
        registry.pair(&mut radio, NODE_A, 5).await.unwrap();
        registry.deploy(&mut radio, NODE_A).await.unwrap();
        radio.sent.clear();

        registry.sync_fleet_time(&mut radio).await.unwrap();
        let first = radio.sent.len();
        assert_eq!(first, 1);

        // An hour later nothing happens; a day later the fleet is
        // refreshed again.
        clock.advance(3_600_000);
        registry.sync_fleet_time(&mut radio).await.unwrap();
        assert_eq!(radio.sent.len(), first);

        clock.advance(86_400_000);
        registry.sync_fleet_time(&mut radio).await.unwrap();
        assert_eq!(radio.sent.len(), first + 1);
    }

    #[tokio::test]
    async fn time_sync_request_is_answered_with_the_wall_clock() {
        let clock = MockClock::new();
        let mut registry = registry(clock);
        let mut radio = MockRadio::new();
        register(&mut registry, &mut radio, NODE_A, "TEMP_001").await;

        let frame = encode_message(&Message::TimeSyncRequest {
            node_id: "TEMP_001".to_string(),
            uptime_ms: 5_000,
        })
        .unwrap();
        registry
            .handle_frame(&mut radio, NODE_A, &frame)
            .await
            .unwrap();

        assert!(matches!(
            radio.sent.last(),
            Some((dest, Message::TimeSyncResponse { clock, .. }))
                if *dest == NODE_A && clock.hour == 9
        ));
    }
}
