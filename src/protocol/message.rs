use std::convert::TryFrom;

use serde::{Serialize, Deserialize};

use crate::core::{Address, Error, GroupId, HopLevel, RandomSeed};
use crate::routing::Edge;

/// Flags byte carried by discovery messages
pub const DEFAULT_FLAGS: u8 = 0x20;

/// Network header: destination address
pub const NET_HEADER_SIZE: usize = 2;

/// Message header: id, flags, sequence number, length
pub const MSG_HEADER_SIZE: usize = 5;

/// Trailing checksum
pub const CHECKSUM_SIZE: usize = 2;

/// Message length of a beacon (header and body)
pub const BEACON_LEN: usize = MSG_HEADER_SIZE + 11;

/// Message length of a request to join without edges
pub const RTJ_BASE_LEN: usize = MSG_HEADER_SIZE + 7;

/// Largest frame the radio buffer holds
pub const MAX_FRAME_SIZE: usize = 160;

/// Message type identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageId {
    /// Parent advertisement
    Beacon = 0x01,
    /// Child reply to a beacon
    RequestToJoin = 0x02,
}

impl TryFrom<u8> for MessageId {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(MessageId::Beacon),
            0x02 => Ok(MessageId::RequestToJoin),
            other => Err(Error::integrity(format!("unknown message id 0x{:02X}", other))),
        }
    }
}

/// Advertisement broadcast by a parent to invite children to join
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Beacon {
    /// Sender's hop level
    pub level: HopLevel,
    /// Sender's address
    pub source: Address,
    /// Network group of the sender
    pub group: GroupId,
    /// Sender's system time in seconds
    pub seconds: u32,
    /// Sender's sub-second counter
    pub sub_second: u16,
}

/// Reply sent by a prospective child after accepting a beacon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestToJoin {
    /// Joining node's address
    pub source: Address,
    /// Seed coordinating the next round of communication
    pub seed: RandomSeed,
    /// Edges of the joining node's subtree
    pub edges: Vec<Edge>,
}

/// Discovery protocol messages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    Beacon(Beacon),
    RequestToJoin(RequestToJoin),
}

impl Message {
    /// Returns the message type identifier
    pub fn id(&self) -> MessageId {
        match self {
            Message::Beacon(_) => MessageId::Beacon,
            Message::RequestToJoin(_) => MessageId::RequestToJoin,
        }
    }

    /// Returns the sender's address
    pub fn source(&self) -> Address {
        match self {
            Message::Beacon(b) => b.source,
            Message::RequestToJoin(r) => r.source,
        }
    }

    /// Value of the length field: message header plus body
    pub fn encoded_len(&self) -> usize {
        match self {
            Message::Beacon(_) => BEACON_LEN,
            Message::RequestToJoin(r) => RTJ_BASE_LEN + r.edges.len() * 4,
        }
    }
}

/// A message together with its network header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Destination address
    pub dest: Address,
    /// Flags byte
    pub flags: u8,
    /// Sequence number
    pub sequence: u16,
    /// Payload
    pub message: Message,
}

impl Frame {
    /// Creates a frame with default flags and a zero sequence number
    pub fn new(dest: Address, message: Message) -> Self {
        Frame {
            dest,
            flags: DEFAULT_FLAGS,
            sequence: 0,
            message,
        }
    }

    /// Size of the frame on the air
    pub fn wire_len(&self) -> usize {
        NET_HEADER_SIZE + self.message.encoded_len() + CHECKSUM_SIZE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_id_conversion() {
        assert_eq!(MessageId::try_from(0x01).unwrap(), MessageId::Beacon);
        assert_eq!(MessageId::try_from(0x02).unwrap(), MessageId::RequestToJoin);
        assert!(matches!(MessageId::try_from(0x7F), Err(Error::Integrity(_))));
    }

    #[test]
    fn test_message_lengths() {
        let beacon = Message::Beacon(Beacon {
            level: HopLevel::HUB,
            source: Address(1),
            group: GroupId(0x10),
            seconds: 0,
            sub_second: 0,
        });
        assert_eq!(beacon.encoded_len(), 16);
        assert_eq!(Frame::new(Address::BROADCAST, beacon).wire_len(), 20);

        let rtj = Message::RequestToJoin(RequestToJoin {
            source: Address(2),
            seed: 7,
            edges: vec![Edge::new(Address(2), Address(3))],
        });
        assert_eq!(rtj.encoded_len(), 16);
        assert_eq!(rtj.id(), MessageId::RequestToJoin);
        assert_eq!(rtj.source(), Address(2));
    }
}
