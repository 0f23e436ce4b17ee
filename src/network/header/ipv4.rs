use super::{be16, be32};
use crate::error::{DivertError, Result};
use std::net::Ipv4Addr;

pub const IPV4_MIN_HEADER_LEN: usize = 20;

/// Borrowed view of an IPv4 header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Header<'a>(&'a [u8]);

impl<'a> Ipv4Header<'a> {
    /// Wraps `data`, which must start with an IPv4 header.
    ///
    /// # Arguments
    ///
    /// * `data` - Packet bytes starting at the IP version nibble
    ///
    /// # Returns
    ///
    /// The view limited to the header itself (options included), or
    /// `MalformedPacket` if the buffer cannot hold the declared header
    pub fn new(data: &'a [u8]) -> Result<Self> {
        if data.len() < IPV4_MIN_HEADER_LEN {
            return Err(DivertError::malformed(format!(
                "IPv4 header needs {} bytes, got {}",
                IPV4_MIN_HEADER_LEN,
                data.len()
            )));
        }
        if data[0] >> 4 != 4 {
            return Err(DivertError::malformed("not an IPv4 header"));
        }

        let header_len = usize::from(data[0] & 0x0F) * 4;
        if header_len < IPV4_MIN_HEADER_LEN {
            return Err(DivertError::malformed(format!(
                "IPv4 header length {} is below the minimum",
                header_len
            )));
        }
        if data.len() < header_len {
            return Err(DivertError::malformed(format!(
                "IPv4 header declares {} bytes, got {}",
                header_len,
                data.len()
            )));
        }

        Ok(Ipv4Header(&data[..header_len]))
    }

    pub fn header_len(&self) -> usize {
        self.0.len()
    }

    pub fn dscp(&self) -> u8 {
        self.0[1] >> 2
    }

    pub fn ecn(&self) -> u8 {
        self.0[1] & 0x03
    }

    /// Header plus payload, as declared on the wire.
    pub fn total_length(&self) -> u16 {
        be16(self.0, 2)
    }

    pub fn identification(&self) -> u16 {
        be16(self.0, 4)
    }

    pub fn dont_fragment(&self) -> bool {
        self.0[6] & 0x40 != 0
    }

    pub fn more_fragments(&self) -> bool {
        self.0[6] & 0x20 != 0
    }

    /// Fragment offset in 8-byte units.
    pub fn fragment_offset(&self) -> u16 {
        be16(self.0, 6) & 0x1FFF
    }

    pub fn is_fragment(&self) -> bool {
        self.more_fragments() || self.fragment_offset() != 0
    }

    pub fn ttl(&self) -> u8 {
        self.0[8]
    }

    pub fn protocol(&self) -> u8 {
        self.0[9]
    }

    pub fn checksum(&self) -> u16 {
        be16(self.0, 10)
    }

    pub fn src_addr(&self) -> Ipv4Addr {
        Ipv4Addr::from(be32(self.0, 12))
    }

    pub fn dst_addr(&self) -> Ipv4Addr {
        Ipv4Addr::from(be32(self.0, 16))
    }

    pub fn options(&self) -> &'a [u8] {
        &self.0[IPV4_MIN_HEADER_LEN..]
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ipv4_fields() {
        let mut raw = [0u8; 24];
        raw[0] = 0x46;
        raw[1] = 0xB8;
        raw[2..4].copy_from_slice(&24u16.to_be_bytes());
        raw[4..6].copy_from_slice(&0x1234u16.to_be_bytes());
        raw[6] = 0x40;
        raw[8] = 64;
        raw[9] = 17;
        raw[12..16].copy_from_slice(&[10, 0, 0, 1]);
        raw[16..20].copy_from_slice(&[10, 0, 0, 2]);

        let header = Ipv4Header::new(&raw).unwrap();
        assert_eq!(header.header_len(), 24);
        assert_eq!(header.dscp(), 46);
        assert_eq!(header.total_length(), 24);
        assert_eq!(header.identification(), 0x1234);
        assert!(header.dont_fragment());
        assert!(!header.is_fragment());
        assert_eq!(header.ttl(), 64);
        assert_eq!(header.protocol(), 17);
        assert_eq!(header.src_addr(), Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(header.dst_addr(), Ipv4Addr::new(10, 0, 0, 2));
        assert_eq!(header.options().len(), 4);
    }

    #[test]
    fn test_ipv4_declared_header_must_fit() {
        let mut raw = [0u8; 20];
        raw[0] = 0x4F;
        assert!(matches!(
            Ipv4Header::new(&raw),
            Err(DivertError::MalformedPacket(_))
        ));

        raw[0] = 0x44;
        assert!(Ipv4Header::new(&raw).is_err());
    }
}
