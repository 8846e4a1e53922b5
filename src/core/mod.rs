//! Core types and constants for treenet
//!
//! This module contains the fundamental building blocks used throughout the library.

pub mod error;
pub mod types;
pub mod serde;

pub use self::error::{Error, Result};
pub use self::types::{
    Address,
    Config,
    GroupId,
    HopLevel,
    LinkRole,
    RandomSeed,
};

/// Default capacity of the routing edge table
pub const MAX_EDGES: usize = 32;

/// Maximum number of edges carried in a REQUEST_TO_JOIN message
pub const MAX_RTJ_EDGES: usize = 32;

/// Radio channel used for discovery traffic
pub const DISCOVERY_CHANNEL: u8 = 0;

/// Number of beacons a parent sends per discovery cycle
pub const BEACONS_PER_CYCLE: u8 = 2;

/// Number of reply sub-slots within one link slot
pub const MAX_LINKS_PER_SLOT: usize = 3;

/// Weakest accepted beacon signal strength in dBm
pub const RSSI_FLOOR_DBM: i16 = -90;

/// Fixed tick compensation added to the measured beacon latency
pub const LATENCY_COMPENSATION: u16 = 0x69;
