//! Protocol implementation module
//!
//! This module defines the discovery messages exchanged while a node joins
//! the network, their fixed wire layout and the frame checksum.

pub mod checksum;
pub mod codec;
pub mod message;

pub use self::checksum::{Checksum, Crc16};
pub use self::codec::FrameCodec;
pub use self::message::{
    Beacon, Frame, Message, MessageId, RequestToJoin,
    DEFAULT_FLAGS, MAX_FRAME_SIZE,
};
