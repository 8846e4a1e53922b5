use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use serde::{Serialize, Deserialize};

use crate::core::Address;

/// Status bits attached to an edge of the routing tree
///
/// Several bits may be set at the same time, e.g. an unjoined child edge
/// awaiting acknowledgment carries `DROP | ROOT | PENDING`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct EdgeFlags(u8);

impl EdgeFlags {
    /// Active edge, nothing to report
    pub const NONE: EdgeFlags = EdgeFlags(0x00);
    /// Edge was added and must be reported to the parent
    pub const JOIN: EdgeFlags = EdgeFlags(0x01);
    /// Edge was dropped and must be reported to the parent
    pub const DROP: EdgeFlags = EdgeFlags(0x02);
    /// Update was handed to the parent and awaits acknowledgment
    pub const PENDING: EdgeFlags = EdgeFlags(0x04);
    /// Incoming edge of the node that unjoined
    pub const ROOT: EdgeFlags = EdgeFlags(0x08);

    /// Returns the raw status byte
    pub const fn bits(&self) -> u8 {
        self.0
    }

    /// Returns whether every bit of `other` is set
    pub fn contains(&self, other: EdgeFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns whether any bit of `other` is set
    pub fn intersects(&self, other: EdgeFlags) -> bool {
        self.0 & other.0 != 0
    }

    /// Sets the bits of `other`
    pub fn insert(&mut self, other: EdgeFlags) {
        self.0 |= other.0;
    }

    /// Clears the bits of `other`
    pub fn remove(&mut self, other: EdgeFlags) {
        self.0 &= !other.0;
    }

    pub fn is_active(&self) -> bool {
        self.0 == 0
    }

    pub fn is_join(&self) -> bool {
        self.intersects(Self::JOIN)
    }

    pub fn is_drop(&self) -> bool {
        self.intersects(Self::DROP)
    }

    pub fn is_pending(&self) -> bool {
        self.intersects(Self::PENDING)
    }

    pub fn is_root(&self) -> bool {
        self.intersects(Self::ROOT)
    }
}

impl BitOr for EdgeFlags {
    type Output = EdgeFlags;

    fn bitor(self, rhs: EdgeFlags) -> EdgeFlags {
        EdgeFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for EdgeFlags {
    fn bitor_assign(&mut self, rhs: EdgeFlags) {
        self.insert(rhs);
    }
}

impl fmt::Display for EdgeFlags {
    /// Status words as printed in the edge dump
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_active() {
            return write!(f, "active");
        }

        let words = [
            (Self::ROOT, "root"),
            (Self::JOIN, "joined"),
            (Self::DROP, "droppd"),
            (Self::PENDING, "pendng"),
        ];
        let mut first = true;
        for (flag, word) in words {
            if self.intersects(flag) {
                if !first {
                    write!(f, " ")?;
                }
                write!(f, "{}", word)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Directed parent-to-child arc of the spanning tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    /// Parent address
    pub src: Address,
    /// Child address
    pub dest: Address,
    /// Update status
    pub flags: EdgeFlags,
}

impl Edge {
    /// Creates an edge with no status bits set
    pub fn new(src: Address, dest: Address) -> Self {
        Edge {
            src,
            dest,
            flags: EdgeFlags::NONE,
        }
    }

    /// Returns whether this edge connects `src` to `dest`
    pub fn connects(&self, src: Address, dest: Address) -> bool {
        self.src == src && self.dest == dest
    }

    /// Wire form used in join updates and REQUEST_TO_JOIN edge lists
    pub fn to_be_bytes(&self) -> [u8; 4] {
        let [s0, s1] = self.src.to_be_bytes();
        let [d0, d1] = self.dest.to_be_bytes();
        [s0, s1, d0, d1]
    }

    /// Parses an edge from its four wire bytes
    pub fn from_be_bytes(bytes: [u8; 4]) -> Self {
        Edge::new(
            Address::from_be_bytes([bytes[0], bytes[1]]),
            Address::from_be_bytes([bytes[2], bytes[3]]),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_combine() {
        let mut flags = EdgeFlags::DROP | EdgeFlags::ROOT;
        assert!(flags.is_drop());
        assert!(flags.is_root());
        assert!(!flags.is_pending());
        assert!(!flags.is_active());

        flags |= EdgeFlags::PENDING;
        assert!(flags.contains(EdgeFlags::DROP | EdgeFlags::PENDING));
        assert_eq!(flags.bits(), 0x0E);

        flags.remove(EdgeFlags::PENDING);
        assert!(!flags.is_pending());
        assert!(flags.is_drop());
    }

    #[test]
    fn test_flags_display() {
        assert_eq!(EdgeFlags::NONE.to_string(), "active");
        assert_eq!((EdgeFlags::DROP | EdgeFlags::PENDING).to_string(), "droppd pendng");
        assert_eq!((EdgeFlags::ROOT | EdgeFlags::DROP).to_string(), "root droppd");
    }

    #[test]
    fn test_edge_wire_form() {
        let edge = Edge::new(Address(0x0102), Address(0x0304));
        assert_eq!(edge.to_be_bytes(), [0x01, 0x02, 0x03, 0x04]);
        assert_eq!(Edge::from_be_bytes([0x01, 0x02, 0x03, 0x04]), edge);
    }
}
