//! Routing update buffer
//!
//! Layout: `[drop_byte_count][drop addresses, 2 bytes each][join_byte_count][join (src, dest), 4 bytes each]`.
//! A zero count byte means no entries of that kind.

use bytes::Buf;

use crate::core::{Address, Error, Result};
use super::edge::Edge;

/// Wire length of a join entry (parent and child address)
pub const JOIN_LEN: usize = 4;

/// Wire length of a drop entry (child address only)
pub const DROP_LEN: usize = 2;

/// Decoded contents of a routing update buffer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutingUpdate {
    /// Addresses of nodes that left the tree
    pub drops: Vec<Address>,
    /// Edges that were added to the tree
    pub joins: Vec<Edge>,
}

impl RoutingUpdate {
    /// Parses a routing update buffer
    ///
    /// The whole buffer is validated before anything is returned, so a
    /// truncated update is rejected as a unit.
    pub fn parse(mut buf: &[u8]) -> Result<Self> {
        let drop_bytes = read_section_len(&mut buf, DROP_LEN, "drop")?;
        let mut drops = Vec::with_capacity(drop_bytes / DROP_LEN);
        for _ in 0..drop_bytes / DROP_LEN {
            drops.push(Address(buf.get_u16()));
        }

        let join_bytes = read_section_len(&mut buf, JOIN_LEN, "join")?;
        let mut joins = Vec::with_capacity(join_bytes / JOIN_LEN);
        for _ in 0..join_bytes / JOIN_LEN {
            let mut raw = [0u8; JOIN_LEN];
            buf.copy_to_slice(&mut raw);
            joins.push(Edge::from_be_bytes(raw));
        }

        Ok(RoutingUpdate { drops, joins })
    }

    /// Returns whether the update carries no entries
    pub fn is_empty(&self) -> bool {
        self.drops.is_empty() && self.joins.is_empty()
    }
}

fn read_section_len(buf: &mut &[u8], entry_len: usize, section: &str) -> Result<usize> {
    if !buf.has_remaining() {
        return Err(Error::malformed_update(format!("missing {} count byte", section)));
    }
    let len = buf.get_u8() as usize;
    if len % entry_len != 0 {
        return Err(Error::malformed_update(format!(
            "{} section length {} is not a multiple of {}",
            section, len, entry_len
        )));
    }
    if buf.remaining() < len {
        return Err(Error::malformed_update(format!(
            "{} section needs {} bytes, {} left",
            section,
            len,
            buf.remaining()
        )));
    }
    Ok(len)
}
