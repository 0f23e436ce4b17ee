use super::{be16, be32};
use crate::error::{DivertError, Result};
use std::net::Ipv6Addr;

pub const IPV6_HEADER_LEN: usize = 40;

/// Borrowed view of the fixed IPv6 header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv6Header<'a>(&'a [u8]);

impl<'a> Ipv6Header<'a> {
    pub fn new(data: &'a [u8]) -> Result<Self> {
        if data.len() < IPV6_HEADER_LEN {
            return Err(DivertError::malformed(format!(
                "IPv6 header needs {} bytes, got {}",
                IPV6_HEADER_LEN,
                data.len()
            )));
        }
        if data[0] >> 4 != 6 {
            return Err(DivertError::malformed("not an IPv6 header"));
        }
        Ok(Ipv6Header(&data[..IPV6_HEADER_LEN]))
    }

    pub fn traffic_class(&self) -> u8 {
        ((be16(self.0, 0) >> 4) & 0xFF) as u8
    }

    pub fn flow_label(&self) -> u32 {
        be32(self.0, 0) & 0x000F_FFFF
    }

    /// Length of everything after the fixed header, extension headers included.
    pub fn payload_length(&self) -> u16 {
        be16(self.0, 4)
    }

    pub fn next_header(&self) -> u8 {
        self.0[6]
    }

    pub fn hop_limit(&self) -> u8 {
        self.0[7]
    }

    pub fn src_addr(&self) -> Ipv6Addr {
        Ipv6Addr::from(octets(&self.0[8..24]))
    }

    pub fn dst_addr(&self) -> Ipv6Addr {
        Ipv6Addr::from(octets(&self.0[24..40]))
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.0
    }
}

fn octets(bytes: &[u8]) -> [u8; 16] {
    let mut out = [0u8; 16];
    out.copy_from_slice(bytes);
    out
}
