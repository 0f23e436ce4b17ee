use super::be16;

pub const UDP_HEADER_LEN: usize = 8;

/// Borrowed view of a UDP header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdpHeader<'a>(&'a [u8]);

impl<'a> UdpHeader<'a> {
    pub fn new(data: &'a [u8]) -> Option<Self> {
        data.get(..UDP_HEADER_LEN).map(UdpHeader)
    }

    pub fn src_port(&self) -> u16 {
        be16(self.0, 0)
    }

    pub fn dst_port(&self) -> u16 {
        be16(self.0, 2)
    }

    /// Header plus datagram length as declared on the wire.
    pub fn length(&self) -> u16 {
        be16(self.0, 4)
    }

    pub fn checksum(&self) -> u16 {
        be16(self.0, 6)
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.0
    }
}
