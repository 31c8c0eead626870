//! Persisted node configuration.
//!
//! One JSON document under a single key; lifecycle state is not stored
//! directly but derived from which fields are populated, so a partially
//! written record degrades to an earlier lifecycle stage instead of an
//! inconsistent one.

use log::warn;
use serde::{Deserialize, Serialize};
use terrasync_api::{DEFAULT_WAKE_INTERVAL_MINUTES, LocalStorage, Mac, NodeState};

/// Record-store key for the node's configuration document.
pub const CONFIG_KEY: &str = "node_cfg";

mod mac_hex {
    use alloc::string::String;
    use serde::{Deserialize, Deserializer, Serializer};
    use terrasync_api::Mac;

    pub fn serialize<S: Serializer>(mac: &Mac, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&mac.to_hex())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Mac, D::Error> {
        let hex = String::deserialize(deserializer)?;
        Ok(Mac::from_hex(&hex))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Bound coordinator, `Mac::UNSET` while unpaired.
    #[serde(with = "mac_hex")]
    pub coordinator_mac: Mac,
    pub wake_interval_minutes: u8,
    /// Whether the RTC has been set from a coordinator clock since the
    /// last oscillator stop.
    pub rtc_synced: bool,
    pub deployed: bool,
    /// Unix time of the last accepted clock, 0 if never synced.
    pub last_time_sync_epoch: u32,
    pub boot_count: u32,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            coordinator_mac: Mac::UNSET,
            wake_interval_minutes: DEFAULT_WAKE_INTERVAL_MINUTES,
            rtc_synced: false,
            deployed: false,
            last_time_sync_epoch: 0,
            boot_count: 0,
        }
    }
}

impl NodeConfig {
    /// Lifecycle state implied by the stored fields.
    pub fn state(&self) -> NodeState {
        if self.coordinator_mac.is_unset() {
            NodeState::Unpaired
        } else if !self.deployed {
            NodeState::Paired
        } else {
            NodeState::Deployed
        }
    }

    /// Drop back to factory state, keeping only the boot counter.
    pub fn reset_binding(&mut self) {
        let boot_count = self.boot_count;
        *self = Self::default();
        self.boot_count = boot_count;
    }

    /// Load from the record store. A missing, unreadable, or corrupt
    /// document yields the defaults; the node re-pairs rather than boot
    /// with half a configuration.
    pub async fn load<S: LocalStorage>(storage: &S) -> Self {
        match storage.get_item(CONFIG_KEY).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(config) => config,
                Err(err) => {
                    warn!("corrupt node config ({}), using defaults", err);
                    Self::default()
                }
            },
            Ok(None) => Self::default(),
            Err(err) => {
                warn!("config read failed ({:?}), using defaults", err);
                Self::default()
            }
        }
    }

    /// Persist. Failures are logged and swallowed: a node that cannot
    /// save still runs its current cycle and re-pairs after a reboot.
    pub async fn save<S: LocalStorage>(&self, storage: &mut S) {
        let raw = match serde_json::to_string(self) {
            Ok(raw) => raw,
            Err(err) => {
                warn!("config serialization failed: {}", err);
                return;
            }
        };
        if let Err(err) = storage.set_item(CONFIG_KEY, &raw).await {
            warn!("config write failed: {:?}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use terrasync_api::MemoryStorage;

    use super::*;

    #[test]
    fn state_is_derived_from_populated_fields() {
        let mut config = NodeConfig::default();
        assert_eq!(config.state(), NodeState::Unpaired);

        config.coordinator_mac = Mac([0xAA, 0xBB, 0xCC, 0x11, 0x22, 0x33]);
        assert_eq!(config.state(), NodeState::Paired);

        config.deployed = true;
        assert_eq!(config.state(), NodeState::Deployed);
    }

    #[tokio::test]
    async fn roundtrips_through_the_record_store() {
        let mut storage = MemoryStorage::new();
        let mut config = NodeConfig::default();
        config.coordinator_mac = Mac([0xAA, 0xBB, 0xCC, 0x11, 0x22, 0x33]);
        config.wake_interval_minutes = 10;
        config.rtc_synced = true;
        config.deployed = true;
        config.last_time_sync_epoch = 1_735_722_000;
        config.boot_count = 7;

        config.save(&mut storage).await;
        let loaded = NodeConfig::load(&storage).await;
        assert_eq!(loaded, config);
    }

    #[tokio::test]
    async fn missing_document_yields_defaults() {
        let storage = MemoryStorage::new();
        let loaded = NodeConfig::load(&storage).await;
        assert_eq!(loaded, NodeConfig::default());
    }

    #[tokio::test]
    async fn corrupt_document_yields_defaults() {
        let mut storage = MemoryStorage::new();
        storage.set_item(CONFIG_KEY, "{not json").await.unwrap();
        let loaded = NodeConfig::load(&storage).await;
        assert_eq!(loaded, NodeConfig::default());
    }

    #[test]
    fn mac_persists_as_hex() {
        let mut config = NodeConfig::default();
        config.coordinator_mac = Mac([0xAA, 0xBB, 0xCC, 0x11, 0x22, 0x33]);
        let raw = serde_json::to_string(&config).unwrap();
        assert!(raw.contains("AABBCC112233"));
    }

    #[test]
    fn reset_binding_keeps_boot_counter() {
        let mut config = NodeConfig::default();
        config.coordinator_mac = Mac([1, 2, 3, 4, 5, 6]);
        config.deployed = true;
        config.boot_count = 12;
        config.reset_binding();
        assert_eq!(config.state(), NodeState::Unpaired);
        assert_eq!(config.boot_count, 12);
    }
}
