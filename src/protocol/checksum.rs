/// Frame checksum appended before transmission and validated on receive
pub trait Checksum: Send {
    /// Computes the checksum of `data`
    fn compute(&self, data: &[u8]) -> u16;

    /// Checks a frame whose last two bytes carry the big-endian checksum
    fn verify(&self, frame: &[u8]) -> bool {
        if frame.len() < 2 {
            return false;
        }
        let (data, tail) = frame.split_at(frame.len() - 2);
        self.compute(data) == u16::from_be_bytes([tail[0], tail[1]])
    }
}

/// CRC-16/CCITT-FALSE (polynomial 0x1021, initial value 0xFFFF)
#[derive(Debug, Clone, Copy, Default)]
pub struct Crc16;

impl Checksum for Crc16 {
    fn compute(&self, data: &[u8]) -> u16 {
        let mut crc: u16 = 0xFFFF;
        for &byte in data {
            crc ^= (byte as u16) << 8;
            for _ in 0..8 {
                crc = if crc & 0x8000 != 0 {
                    (crc << 1) ^ 0x1021
                } else {
                    crc << 1
                };
            }
        }
        crc
    }
}
