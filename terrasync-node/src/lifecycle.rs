//! Node-side lifecycle state machine.
//!
//! A node moves UNPAIRED -> PAIRED -> DEPLOYED, driven entirely by
//! coordinator frames. The state itself lives in [`NodeConfig`]; this
//! module owns the transitions, the periodic duties (discovery
//! announcements, time-sync requests) and the alarm-wake transmit path.

use alloc::string::{String, ToString};
use embassy_time::Timer;
use embedded_hal::i2c::I2c;
use log::{debug, info, warn};
use terrasync_api::{
    LocalStorage, Mac, Message, NodeState, RADIO_CHANNEL, RadioLink, clamp_wake_interval,
    decode_message, encode_message,
};

use crate::config::NodeConfig;
use crate::error::{Error, Result};
use crate::rtc::Ds3231;
use crate::schedule::arm_or_fallback;

/// Unpaired nodes announce themselves this often.
pub const DISCOVERY_PERIOD_MS: u64 = 15_000;
/// Minimum spacing between time-sync requests.
pub const TIME_SYNC_COOLDOWN_MS: u64 = 30_000;
/// A clock older than this is re-synced at the next opportunity.
pub const TIME_SYNC_MAX_AGE_SECS: u32 = 24 * 3600;

/// Delay between clearing the alarm flag and touching the bus again,
/// letting the open-drain interrupt line settle high.
const ALARM_SETTLE_MS: u64 = 5;

/// Immutable identity baked in at provisioning time.
#[derive(Debug, Clone)]
pub struct NodeIdentity {
    pub node_id: String,
    pub node_type: String,
}

/// Where sensor values come from. `None` means the measurement failed;
/// nothing is transmitted for that cycle.
pub trait SensorSource {
    fn sample(&mut self) -> Option<f32>;
}

/// Lifecycle driver owning the node's configuration and record store.
///
/// The RTC, radio and sensor are borrowed per call so the same
/// peripherals stay usable from the wake/sleep path.
pub struct NodeLifecycle<S: LocalStorage> {
    identity: NodeIdentity,
    config: NodeConfig,
    storage: S,
    last_discovery_ms: u64,
    last_sync_request_ms: u64,
}

fn period_elapsed(last: u64, now: u64, period: u64) -> bool {
    last == 0 || now.saturating_sub(last) >= period
}

async fn send_frame<R: RadioLink>(radio: &mut R, dest: Mac, message: &Message) -> Result<()> {
    let frame = encode_message(message).map_err(|_| Error::Serialization)?;
    radio.send(dest, &frame).await.map_err(|err| {
        warn!("send to {} failed: {:?}", dest, err);
        Error::Radio
    })
}

impl<S: LocalStorage> NodeLifecycle<S> {
    /// Boot-time recovery: load the stored configuration, reconcile it
    /// with what the RTC says about power loss, and re-register radio
    /// peers that do not survive a reset.
    pub async fn boot<I2C: I2c, R: RadioLink>(
        identity: NodeIdentity,
        storage: S,
        rtc: &mut Ds3231<I2C>,
        radio: &mut R,
    ) -> Result<Self> {
        let mut node = Self {
            identity,
            config: NodeConfig::load(&storage).await,
            storage,
            last_discovery_ms: 0,
            last_sync_request_ms: 0,
        };
        node.config.boot_count = node.config.boot_count.wrapping_add(1);

        // An oscillator stop means the alarm schedule and timestamps are
        // meaningless; the node starts its lifecycle over.
        if rtc.lost_power()? {
            warn!("RTC lost power, reverting to unpaired");
            node.config.reset_binding();
        }

        // A flag latched before an unplanned reset would otherwise fire
        // a phantom wake cycle.
        if !node.config.deployed && rtc.read_alarm_flag()? {
            rtc.clear_alarm_flag()?;
        }

        if let Err(err) = radio.add_peer(Mac::BROADCAST, RADIO_CHANNEL) {
            warn!("broadcast peer registration failed: {:?}", err);
        }
        if !node.config.coordinator_mac.is_unset() {
            if let Err(err) = radio.add_peer(node.config.coordinator_mac, RADIO_CHANNEL) {
                warn!("coordinator peer registration failed: {:?}", err);
            }
        }

        info!(
            "node {} boot #{} as {}",
            node.identity.node_id,
            node.config.boot_count,
            node.config.state()
        );
        node.config.save(&mut node.storage).await;
        Ok(node)
    }

    pub fn state(&self) -> NodeState {
        self.config.state()
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    fn addressed_to_us(&self, node_id: &str) -> bool {
        node_id == self.identity.node_id
    }

    fn from_coordinator(&self, sender: Mac) -> bool {
        !self.config.coordinator_mac.is_unset() && sender == self.config.coordinator_mac
    }

    async fn bind_coordinator<R: RadioLink>(&mut self, radio: &mut R, sender: Mac) {
        if self.config.coordinator_mac == sender {
            return;
        }
        if let Err(err) = radio.add_peer(sender, RADIO_CHANNEL) {
            warn!("peer registration for {} failed: {:?}", sender, err);
        }
        self.config.coordinator_mac = sender;
        info!("bound to coordinator {}", sender);
    }

    /// Process one received radio frame.
    pub async fn handle_frame<I2C: I2c, R: RadioLink, P: SensorSource>(
        &mut self,
        rtc: &mut Ds3231<I2C>,
        radio: &mut R,
        sensor: &mut P,
        sender: Mac,
        data: &[u8],
        now_ms: u64,
    ) -> Result<()> {
        let message = match decode_message(data) {
            Ok(message) => message,
            Err(err) => {
                debug!("undecodable frame from {}: {}", sender, err);
                return Ok(());
            }
        };

        match message {
            Message::DiscoveryResponse {
                mothership_id,
                acknowledged,
            } => {
                if acknowledged && self.state() == NodeState::Unpaired {
                    info!("discovered by {}", mothership_id);
                    self.bind_coordinator(radio, sender).await;
                    self.config.save(&mut self.storage).await;
                }
            }
            Message::DiscoveryScan { .. } => {
                if self.state() == NodeState::Unpaired {
                    self.announce(radio, now_ms).await?;
                }
            }
            Message::PairingResponse {
                node_id,
                paired,
                interval_minutes,
            } => {
                if self.addressed_to_us(&node_id) && paired {
                    self.bind_coordinator(radio, sender).await;
                    self.config.wake_interval_minutes = clamp_wake_interval(interval_minutes);
                    self.config.save(&mut self.storage).await;
                }
            }
            Message::PairingCommand {
                node_id,
                interval_minutes,
                mothership_id,
            } => {
                if self.addressed_to_us(&node_id) {
                    info!("paired by {}", mothership_id);
                    self.bind_coordinator(radio, sender).await;
                    self.config.wake_interval_minutes = clamp_wake_interval(interval_minutes);
                    // Pairing restarts the deployment sequence even when
                    // the node was already deployed.
                    self.config.deployed = false;
                    self.config.rtc_synced = false;
                    self.config.last_time_sync_epoch = 0;
                    self.config.save(&mut self.storage).await;
                }
            }
            Message::DeploymentCommand {
                node_id,
                clock,
                interval_minutes,
                ..
            } => {
                if !self.addressed_to_us(&node_id) {
                    return Ok(());
                }
                if !self.from_coordinator(sender) {
                    warn!("deployment from unknown coordinator {}", sender);
                    return Ok(());
                }
                rtc.set_datetime(&clock)?;
                self.config.rtc_synced = true;
                self.config.deployed = true;
                self.config.last_time_sync_epoch = clock.unix_timestamp().unwrap_or(0) as u32;
                self.config.wake_interval_minutes = clamp_wake_interval(interval_minutes);
                let boundary = arm_or_fallback(rtc, self.config.wake_interval_minutes)?;
                info!(
                    "deployed, clock {} set, first wake at {}",
                    clock, boundary
                );
                self.config.save(&mut self.storage).await;
                // First measurement goes out immediately so the fleet
                // sees data without waiting a full interval.
                self.transmit_reading(rtc, radio, sensor).await?;
            }
            Message::ScheduleCommand {
                interval_minutes, ..
            } => {
                if !self.from_coordinator(sender) {
                    return Ok(());
                }
                self.config.wake_interval_minutes = clamp_wake_interval(interval_minutes);
                if self.config.deployed {
                    let boundary = arm_or_fallback(rtc, self.config.wake_interval_minutes)?;
                    info!(
                        "interval now {} min, next wake at {}",
                        self.config.wake_interval_minutes, boundary
                    );
                }
                self.config.save(&mut self.storage).await;
            }
            Message::TimeSyncResponse { clock, .. } => {
                if !self.from_coordinator(sender) {
                    return Ok(());
                }
                rtc.set_datetime(&clock)?;
                self.config.rtc_synced = true;
                self.config.last_time_sync_epoch = clock.unix_timestamp().unwrap_or(0) as u32;
                // The armed alarm stays as-is; the next wake re-aligns
                // against the corrected clock anyway.
                self.config.save(&mut self.storage).await;
            }
            Message::UnpairCommand { node_id } => {
                if self.addressed_to_us(&node_id) && self.from_coordinator(sender) {
                    info!("unpaired by coordinator");
                    if let Err(err) = radio.remove_peer(self.config.coordinator_mac) {
                        debug!("peer removal failed: {:?}", err);
                    }
                    self.config.reset_binding();
                    self.config.save(&mut self.storage).await;
                }
            }
            other => {
                debug!("ignoring {:?}", other.node_id());
            }
        }
        Ok(())
    }

    async fn announce<R: RadioLink>(&mut self, radio: &mut R, now_ms: u64) -> Result<()> {
        self.last_discovery_ms = now_ms;
        send_frame(
            radio,
            Mac::BROADCAST,
            &Message::DiscoveryRequest {
                node_id: self.identity.node_id.clone(),
                node_type: self.identity.node_type.clone(),
                uptime_ms: now_ms as u32,
            },
        )
        .await
    }

    async fn request_time_sync<R: RadioLink>(&mut self, radio: &mut R, now_ms: u64) -> Result<()> {
        self.last_sync_request_ms = now_ms;
        send_frame(
            radio,
            self.config.coordinator_mac,
            &Message::TimeSyncRequest {
                node_id: self.identity.node_id.clone(),
                uptime_ms: now_ms as u32,
            },
        )
        .await
    }

    /// Periodic duties, called from the main loop with a monotonic
    /// millisecond clock.
    pub async fn poll<I2C: I2c, R: RadioLink, P: SensorSource>(
        &mut self,
        now_ms: u64,
        rtc: &mut Ds3231<I2C>,
        radio: &mut R,
        sensor: &mut P,
    ) -> Result<()> {
        match self.state() {
            NodeState::Unpaired => {
                if period_elapsed(self.last_discovery_ms, now_ms, DISCOVERY_PERIOD_MS) {
                    self.announce(radio, now_ms).await?;
                }
            }
            NodeState::Paired | NodeState::Deployed => {
                let needs_sync = if !self.config.rtc_synced {
                    true
                } else {
                    let epoch = rtc.read_datetime()?.unix_timestamp().unwrap_or(0) as u32;
                    epoch.saturating_sub(self.config.last_time_sync_epoch)
                        >= TIME_SYNC_MAX_AGE_SECS
                };
                if needs_sync
                    && period_elapsed(self.last_sync_request_ms, now_ms, TIME_SYNC_COOLDOWN_MS)
                {
                    self.request_time_sync(radio, now_ms).await?;
                }
            }
        }

        // Poll-mode alarm detection, for hardware without the interrupt
        // line routed.
        if self.config.deployed && rtc.read_alarm_flag()? {
            self.handle_alarm(rtc, radio, sensor).await?;
        }
        Ok(())
    }

    /// One alarm wake cycle: acknowledge the alarm, schedule the next
    /// one, then transmit. Arming before transmitting means a radio
    /// failure can never leave the node without a future wake.
    pub async fn handle_alarm<I2C: I2c, R: RadioLink, P: SensorSource>(
        &mut self,
        rtc: &mut Ds3231<I2C>,
        radio: &mut R,
        sensor: &mut P,
    ) -> Result<()> {
        rtc.clear_alarm_flag()?;
        Timer::after_millis(ALARM_SETTLE_MS).await;
        let boundary = arm_or_fallback(rtc, self.config.wake_interval_minutes)?;
        debug!("next wake at {}", boundary);
        self.transmit_reading(rtc, radio, sensor).await
    }

    async fn transmit_reading<I2C: I2c, R: RadioLink, P: SensorSource>(
        &mut self,
        rtc: &mut Ds3231<I2C>,
        radio: &mut R,
        sensor: &mut P,
    ) -> Result<()> {
        if self.state() != NodeState::Deployed || !self.config.rtc_synced {
            return Ok(());
        }
        let value = match sensor.sample() {
            Some(value) => value,
            None => {
                warn!("sensor read failed, skipping transmission");
                return Ok(());
            }
        };
        let timestamp = rtc.read_datetime()?.unix_timestamp().unwrap_or(0) as u32;
        send_frame(
            radio,
            self.config.coordinator_mac,
            &Message::SensorReading {
                node_id: self.identity.node_id.clone(),
                sensor_type: self.identity.node_type.to_string(),
                value,
                timestamp,
            },
        )
        .await
    }
}
