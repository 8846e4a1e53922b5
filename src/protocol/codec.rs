use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::convert::TryFrom;
use tokio_util::codec::{Decoder, Encoder};

use crate::core::{Address, Error, GroupId, HopLevel, Result, MAX_RTJ_EDGES};
use crate::routing::Edge;
use super::checksum::{Checksum, Crc16};
use super::message::{
    Beacon, Frame, Message, MessageId, RequestToJoin,
    CHECKSUM_SIZE, MAX_FRAME_SIZE, MSG_HEADER_SIZE, NET_HEADER_SIZE,
};

/// Offset of the length byte within a frame
const LENGTH_OFFSET: usize = NET_HEADER_SIZE + 4;

/// Codec for fixed-layout discovery frames
///
/// Frames are self-delimiting through their length byte, so the same codec
/// decodes a single radio buffer or a stream of concatenated frames.
#[derive(Clone, Default)]
pub struct FrameCodec<C = Crc16> {
    checksum: C,
}

impl FrameCodec<Crc16> {
    /// Creates a codec using CRC-16
    pub fn new() -> Self {
        FrameCodec { checksum: Crc16 }
    }
}

impl<C: Checksum> FrameCodec<C> {
    /// Builds a broadcast beacon frame
    pub fn build_beacon(&mut self, beacon: Beacon) -> Result<Bytes> {
        self.build(Frame::new(Address::BROADCAST, Message::Beacon(beacon)))
    }

    /// Builds a request to join addressed to the beacon sender
    pub fn build_request_to_join(&mut self, dest: Address, request: RequestToJoin) -> Result<Bytes> {
        self.build(Frame::new(dest, Message::RequestToJoin(request)))
    }

    fn build(&mut self, frame: Frame) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(frame.wire_len());
        self.encode(frame, &mut buf)?;
        Ok(buf.freeze())
    }

    /// Decodes one received radio buffer
    pub fn decode_datagram(&mut self, data: &[u8]) -> Result<Frame> {
        let mut buf = BytesMut::from(data);
        match self.decode(&mut buf)? {
            Some(frame) => Ok(frame),
            None => Err(Error::integrity(format!("truncated frame of {} bytes", data.len()))),
        }
    }

    /// Decodes a received buffer and checks type and destination
    ///
    /// A `dest` of `None` skips the destination check, as done for broadcast
    /// beacons.
    pub fn check_integrity(
        &mut self,
        data: &[u8],
        expected: MessageId,
        dest: Option<Address>,
    ) -> Result<Frame> {
        let frame = self.decode_datagram(data)?;

        if frame.message.id() != expected {
            return Err(Error::integrity(format!(
                "expected {:?}, got {:?}",
                expected,
                frame.message.id()
            )));
        }
        if let Some(dest) = dest {
            if frame.dest != dest {
                return Err(Error::integrity(format!(
                    "frame addressed to {}, not {}",
                    frame.dest, dest
                )));
            }
        }
        Ok(frame)
    }

    fn parse_frame(&self, frame: &[u8]) -> Result<Frame> {
        if !self.checksum.verify(frame) {
            return Err(Error::integrity("checksum mismatch"));
        }

        let mut buf = &frame[..frame.len() - CHECKSUM_SIZE];
        let dest = Address(buf.get_u16());
        let id = buf.get_u8();
        let flags = buf.get_u8();
        let sequence = buf.get_u16();
        let _length = buf.get_u8();

        let message = match MessageId::try_from(id)? {
            MessageId::Beacon => {
                if buf.remaining() != 11 {
                    return Err(Error::codec(format!("beacon body of {} bytes", buf.remaining())));
                }
                Message::Beacon(Beacon {
                    level: HopLevel(buf.get_u8()),
                    source: Address(buf.get_u16()),
                    group: GroupId(buf.get_u16()),
                    seconds: buf.get_u32(),
                    sub_second: buf.get_u16(),
                })
            }
            MessageId::RequestToJoin => {
                if buf.remaining() < 7 {
                    return Err(Error::codec(format!("request to join body of {} bytes", buf.remaining())));
                }
                let source = Address(buf.get_u16());
                let seed = buf.get_u32();
                let count = buf.get_u8() as usize;
                if buf.remaining() != count * 4 {
                    return Err(Error::codec(format!(
                        "{} edges announced, {} bytes present",
                        count,
                        buf.remaining()
                    )));
                }
                let mut edges = Vec::with_capacity(count);
                for _ in 0..count {
                    let mut raw = [0u8; 4];
                    buf.copy_to_slice(&mut raw);
                    edges.push(Edge::from_be_bytes(raw));
                }
                Message::RequestToJoin(RequestToJoin { source, seed, edges })
            }
        };

        Ok(Frame {
            dest,
            flags,
            sequence,
            message,
        })
    }
}

impl<C: Checksum> Decoder for FrameCodec<C> {
    type Item = Frame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if src.len() <= LENGTH_OFFSET {
            // Need more data to read the length byte
            return Ok(None);
        }

        let length = src[LENGTH_OFFSET] as usize;
        if length < MSG_HEADER_SIZE {
            return Err(Error::codec(format!("length field {} below header size", length)));
        }

        let total = NET_HEADER_SIZE + length + CHECKSUM_SIZE;
        if src.len() < total {
            // Need more data to read the full frame
            return Ok(None);
        }

        let frame_bytes = src.split_to(total);
        self.parse_frame(&frame_bytes).map(Some)
    }
}

impl<C: Checksum> Encoder<Frame> for FrameCodec<C> {
    type Error = Error;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<()> {
        let length = item.message.encoded_len();
        let total = item.wire_len();
        if total > MAX_FRAME_SIZE || length > u8::MAX as usize {
            return Err(Error::codec(format!("frame of {} bytes exceeds {}", total, MAX_FRAME_SIZE)));
        }

        let start = dst.len();
        dst.reserve(total);

        dst.put_u16(item.dest.0);
        dst.put_u8(item.message.id() as u8);
        dst.put_u8(item.flags);
        dst.put_u16(item.sequence);
        dst.put_u8(length as u8);

        match &item.message {
            Message::Beacon(b) => {
                dst.put_u8(b.level.0);
                dst.put_u16(b.source.0);
                dst.put_u16(b.group.0);
                dst.put_u32(b.seconds);
                dst.put_u16(b.sub_second);
            }
            Message::RequestToJoin(r) => {
                if r.edges.len() > MAX_RTJ_EDGES {
                    dst.truncate(start);
                    return Err(Error::codec(format!(
                        "{} edges exceed the request to join limit of {}",
                        r.edges.len(),
                        MAX_RTJ_EDGES
                    )));
                }
                dst.put_u16(r.source.0);
                dst.put_u32(r.seed);
                dst.put_u8(r.edges.len() as u8);
                for edge in &r.edges {
                    dst.put_slice(&edge.to_be_bytes());
                }
            }
        }

        let crc = self.checksum.compute(&dst[start..]);
        dst.put_u16(crc);

        Ok(())
    }
}
