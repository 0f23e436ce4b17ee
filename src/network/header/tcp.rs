use super::{be16, be32};

pub const TCP_MIN_HEADER_LEN: usize = 20;

/// Borrowed view of a TCP header, options included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpHeader<'a>(&'a [u8]);

impl<'a> TcpHeader<'a> {
    /// Returns `None` when the data offset is invalid or the declared header
    /// does not fit in `data`.
    pub fn new(data: &'a [u8]) -> Option<Self> {
        if data.len() < TCP_MIN_HEADER_LEN {
            return None;
        }
        let header_len = usize::from(data[12] >> 4) * 4;
        if header_len < TCP_MIN_HEADER_LEN || data.len() < header_len {
            return None;
        }
        Some(TcpHeader(&data[..header_len]))
    }

    pub fn header_len(&self) -> usize {
        self.0.len()
    }

    pub fn src_port(&self) -> u16 {
        be16(self.0, 0)
    }

    pub fn dst_port(&self) -> u16 {
        be16(self.0, 2)
    }

    pub fn seq_num(&self) -> u32 {
        be32(self.0, 4)
    }

    pub fn ack_num(&self) -> u32 {
        be32(self.0, 8)
    }

    pub fn fin(&self) -> bool {
        self.0[13] & 0x01 != 0
    }

    pub fn syn(&self) -> bool {
        self.0[13] & 0x02 != 0
    }

    pub fn rst(&self) -> bool {
        self.0[13] & 0x04 != 0
    }

    pub fn psh(&self) -> bool {
        self.0[13] & 0x08 != 0
    }

    pub fn ack(&self) -> bool {
        self.0[13] & 0x10 != 0
    }

    pub fn urg(&self) -> bool {
        self.0[13] & 0x20 != 0
    }

    pub fn window(&self) -> u16 {
        be16(self.0, 14)
    }

    pub fn checksum(&self) -> u16 {
        be16(self.0, 16)
    }

    pub fn urgent_ptr(&self) -> u16 {
        be16(self.0, 18)
    }

    pub fn options(&self) -> &'a [u8] {
        &self.0[TCP_MIN_HEADER_LEN..]
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.0
    }
}
