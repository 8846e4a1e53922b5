//! Treenet: tree formation for low-power wireless sensor networks
//!
//! Nodes join a hub-rooted tree through a beacon / request-to-join
//! handshake. Each node keeps the edges of the subtree below it and reports
//! joins and drops upward so the hub can route to every node.

pub mod core;
pub mod network;
pub mod protocol;
pub mod routing;

// Re-export commonly used items
pub use crate::core::{Address, Config, Error, GroupId, HopLevel, Result};
pub use crate::network::{DiscoveryEngine, DiscoveryScheduler, Peripherals};
pub use crate::routing::RouteTable;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
