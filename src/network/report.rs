use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Serialize, Deserialize};
use tracing::{info, warn};

use crate::core::{Address, Error, Result};
use super::traits::ReportLogger;

/// Storage priority of a report event
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ReportPriority {
    Low,
    Normal,
    High,
}

/// Protocol events recorded in the node report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportEvent {
    /// Children that joined during one beacon cycle
    ChildJoined { children: Vec<Address> },
    /// A link was found stale and torn down before relinking
    LinkBroken { peer: Address },
    /// This node joined the network below `parent`
    JoinedNetwork { parent: Address },
}

impl ReportEvent {
    /// Source identifier of the event in the report data element
    pub fn source_id(&self) -> u8 {
        match self {
            ReportEvent::ChildJoined { .. } => 0x01,
            ReportEvent::LinkBroken { .. } => 0x02,
            ReportEvent::JoinedNetwork { .. } => 0x03,
        }
    }

    /// Priority the event is stored with by default
    pub fn default_priority(&self) -> ReportPriority {
        match self {
            ReportEvent::ChildJoined { .. } => ReportPriority::Normal,
            ReportEvent::LinkBroken { .. } => ReportPriority::High,
            ReportEvent::JoinedNetwork { .. } => ReportPriority::High,
        }
    }

    /// Report payload: source id, data length, then big-endian addresses
    pub fn payload(&self) -> Vec<u8> {
        let addresses: Vec<Address> = match self {
            ReportEvent::ChildJoined { children } => children.clone(),
            ReportEvent::LinkBroken { peer } => vec![*peer],
            ReportEvent::JoinedNetwork { parent } => vec![*parent],
        };

        let mut payload = Vec::with_capacity(2 + addresses.len() * 2);
        payload.push(self.source_id());
        payload.push((addresses.len() * 2) as u8);
        for addr in addresses {
            payload.extend_from_slice(&addr.to_be_bytes());
        }
        payload
    }
}

/// A stored report entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRecord {
    pub event: ReportEvent,
    pub priority: ReportPriority,
    /// Report data element as stored on the node
    pub data: Vec<u8>,
}

/// Report log keeping bincode-encoded records in memory
///
/// Clones share the same storage.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    records: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl EventLog {
    /// Creates an empty log
    pub fn new() -> Self {
        Self::default()
    }

    fn storage(&self) -> MutexGuard<'_, Vec<Vec<u8>>> {
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        self.storage().len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage().is_empty()
    }

    /// Decodes every stored record
    pub fn records(&self) -> Result<Vec<ReportRecord>> {
        self.storage()
            .iter()
            .map(|raw| {
                bincode::deserialize(raw)
                    .map_err(|e| Error::codec(format!("Failed to decode report record: {}", e)))
            })
            .collect()
    }

    /// Decoded events, in logging order
    pub fn events(&self) -> Result<Vec<ReportEvent>> {
        Ok(self.records()?.into_iter().map(|r| r.event).collect())
    }
}

impl ReportLogger for EventLog {
    fn log_event(&mut self, event: ReportEvent, priority: ReportPriority) {
        info!("Report event {:?} ({:?})", event, priority);
        let data = event.payload();
        let record = ReportRecord { event, priority, data };
        match bincode::serialize(&record) {
            Ok(raw) => self.storage().push(raw),
            Err(e) => warn!("Failed to encode report record: {}", e),
        }
    }
}
