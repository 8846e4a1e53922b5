use std::fmt;
use std::time::Duration;

use serde::{Serialize, Deserialize};

use super::{Error, Result};

/// 16-bit address of a node in the network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Address(pub u16);

impl Address {
    /// The invalid address, used to mean "no node"
    pub const NONE: Address = Address(0);

    /// Illegal destination carried by broadcast beacons
    pub const BROADCAST: Address = Address(0xFFFF);

    /// Returns whether this address may name a real node
    pub fn is_valid(&self) -> bool {
        *self != Self::NONE && *self != Self::BROADCAST
    }

    /// Big-endian wire representation
    pub fn to_be_bytes(self) -> [u8; 2] {
        self.0.to_be_bytes()
    }

    /// Builds an address from its big-endian wire representation
    pub fn from_be_bytes(bytes: [u8; 2]) -> Self {
        Address(u16::from_be_bytes(bytes))
    }
}

impl From<u16> for Address {
    fn from(value: u16) -> Self {
        Address(value)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04X}", self.0)
    }
}

/// Distance in edges from the hub
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HopLevel(pub u8);

impl HopLevel {
    /// Level of the hub
    pub const HUB: HopLevel = HopLevel(0);

    /// Level of a node that has not joined a network yet
    pub const UNATTACHED: HopLevel = HopLevel(0xFF);

    /// Returns the level of a child of a node at this level
    pub fn next(&self) -> Self {
        HopLevel(self.0.saturating_add(1))
    }

    /// Returns the level value
    pub fn level(&self) -> u8 {
        self.0
    }
}

/// Network group identifier shared by all nodes of a tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct GroupId(pub u16);

/// Random seed exchanged during the join handshake to coordinate later slots
pub type RandomSeed = u32;

/// Role a node plays on an operational link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkRole {
    /// This node is the parent end of the link
    Parent,
    /// This node is the child end of the link
    Child,
}

/// Configuration for a treenet node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Address of this node
    pub address: Address,
    /// Whether this node is the hub (root of the tree)
    pub is_hub: bool,
    /// Radio channel used for discovery traffic
    pub discovery_channel: u8,
    /// Number of beacons sent per discovery cycle
    pub beacons_per_cycle: u8,
    /// Weakest accepted beacon signal in dBm
    pub rssi_floor_dbm: i16,
    /// Ticks added to the measured beacon latency during clock sync
    pub latency_compensation: u16,
    /// Capacity of the routing edge table
    pub max_edges: usize,
    /// How often the discovery scheduler re-evaluates the discovery mode
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub discovery_poll_interval: Duration,
}

impl Config {
    /// Creates a default configuration for the given node
    pub fn for_node(address: Address, is_hub: bool) -> Self {
        Config {
            address,
            is_hub,
            ..Default::default()
        }
    }

    /// Checks that the configuration is consistent
    pub fn validate(&self) -> Result<()> {
        if !self.address.is_valid() {
            return Err(Error::config(format!("invalid node address {}", self.address)));
        }
        if self.beacons_per_cycle == 0 {
            return Err(Error::config("beacons_per_cycle must be at least 1"));
        }
        if self.max_edges == 0 || self.max_edges > super::MAX_RTJ_EDGES {
            return Err(Error::config(format!(
                "max_edges must be within 1..={}",
                super::MAX_RTJ_EDGES
            )));
        }
        if self.discovery_poll_interval.is_zero() {
            return Err(Error::config("discovery_poll_interval must be non-zero"));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            address: Address(1),
            is_hub: false,
            discovery_channel: super::DISCOVERY_CHANNEL,
            beacons_per_cycle: super::BEACONS_PER_CYCLE,
            rssi_floor_dbm: super::RSSI_FLOOR_DBM,
            latency_compensation: super::LATENCY_COMPENSATION,
            max_edges: super::MAX_EDGES,
            discovery_poll_interval: Duration::from_secs(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_validity() {
        assert!(!Address::NONE.is_valid());
        assert!(!Address::BROADCAST.is_valid());
        assert!(Address(0x1234).is_valid());
        assert_eq!(Address::from_be_bytes([0x12, 0x34]), Address(0x1234));
        assert_eq!(Address(0x00AB).to_string(), "00AB");
    }

    #[test]
    fn test_hop_level_next() {
        assert_eq!(HopLevel::HUB.next(), HopLevel(1));
        assert_eq!(HopLevel::UNATTACHED.next(), HopLevel::UNATTACHED);
        assert!(HopLevel::HUB < HopLevel::UNATTACHED);
    }

    #[test]
    fn test_config_validation() {
        assert!(Config::default().validate().is_ok());

        let config = Config { address: Address::NONE, ..Default::default() };
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let config = Config { max_edges: 0, ..Default::default() };
        assert!(config.validate().is_err());

        let config = Config { beacons_per_cycle: 0, ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_json_roundtrip() {
        let config = Config::for_node(Address(7), true);
        let json = serde_json::to_string(&config).unwrap();
        let decoded: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.address, Address(7));
        assert!(decoded.is_hub);
        assert_eq!(decoded.discovery_poll_interval, config.discovery_poll_interval);
        assert_eq!(decoded.rssi_floor_dbm, -90);
    }
}
