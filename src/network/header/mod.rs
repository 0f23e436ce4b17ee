//! Zero-copy decoding of IP and transport headers.
//!
//! [`decode`] never allocates: every view borrows the caller's buffer and
//! converts big-endian wire fields on access.

mod icmp;
mod ipv4;
mod ipv6;
mod tcp;
mod udp;

pub use icmp::{Icmpv6Header, IcmpHeader, ICMP_HEADER_LEN};
pub use ipv4::{Ipv4Header, IPV4_MIN_HEADER_LEN};
pub use ipv6::{Ipv6Header, IPV6_HEADER_LEN};
pub use tcp::{TcpHeader, TCP_MIN_HEADER_LEN};
pub use udp::{UdpHeader, UDP_HEADER_LEN};

use crate::error::{DivertError, Result};
use std::net::IpAddr;

pub const IPPROTO_ICMP: u8 = 1;
pub const IPPROTO_TCP: u8 = 6;
pub const IPPROTO_UDP: u8 = 17;
pub const IPPROTO_ICMPV6: u8 = 58;

const IPV6_HOP_BY_HOP: u8 = 0;
const IPV6_ROUTING: u8 = 43;
const IPV6_FRAGMENT: u8 = 44;
const IPV6_AUTH: u8 = 51;
const IPV6_DEST_OPTS: u8 = 60;

pub(crate) fn be16(data: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([data[offset], data[offset + 1]])
}

pub(crate) fn be32(data: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpHeader<'a> {
    V4(Ipv4Header<'a>),
    V6(Ipv6Header<'a>),
}

impl IpHeader<'_> {
    pub fn src_addr(&self) -> IpAddr {
        match self {
            IpHeader::V4(h) => IpAddr::V4(h.src_addr()),
            IpHeader::V6(h) => IpAddr::V6(h.src_addr()),
        }
    }

    pub fn dst_addr(&self) -> IpAddr {
        match self {
            IpHeader::V4(h) => IpAddr::V4(h.dst_addr()),
            IpHeader::V6(h) => IpAddr::V6(h.dst_addr()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportHeader<'a> {
    Icmp(IcmpHeader<'a>),
    Icmpv6(Icmpv6Header<'a>),
    Tcp(TcpHeader<'a>),
    Udp(UdpHeader<'a>),
}

impl TransportHeader<'_> {
    pub fn protocol(&self) -> u8 {
        match self {
            TransportHeader::Icmp(_) => IPPROTO_ICMP,
            TransportHeader::Icmpv6(_) => IPPROTO_ICMPV6,
            TransportHeader::Tcp(_) => IPPROTO_TCP,
            TransportHeader::Udp(_) => IPPROTO_UDP,
        }
    }

    pub fn header_len(&self) -> usize {
        match self {
            TransportHeader::Icmp(h) => h.as_bytes().len(),
            TransportHeader::Icmpv6(h) => h.as_bytes().len(),
            TransportHeader::Tcp(h) => h.header_len(),
            TransportHeader::Udp(h) => h.as_bytes().len(),
        }
    }
}

/// The headers found at the front of one packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedHeaders<'a> {
    ip: IpHeader<'a>,
    transport: Option<TransportHeader<'a>>,
    payload: &'a [u8],
}

impl<'a> ParsedHeaders<'a> {
    pub fn ip(&self) -> &IpHeader<'a> {
        &self.ip
    }

    pub fn transport(&self) -> Option<&TransportHeader<'a>> {
        self.transport.as_ref()
    }

    /// Bytes after the last recognised header, up to the IP-declared end.
    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }

    pub fn ipv4(&self) -> Option<&Ipv4Header<'a>> {
        match &self.ip {
            IpHeader::V4(h) => Some(h),
            IpHeader::V6(_) => None,
        }
    }

    pub fn ipv6(&self) -> Option<&Ipv6Header<'a>> {
        match &self.ip {
            IpHeader::V6(h) => Some(h),
            IpHeader::V4(_) => None,
        }
    }

    pub fn tcp(&self) -> Option<&TcpHeader<'a>> {
        match &self.transport {
            Some(TransportHeader::Tcp(h)) => Some(h),
            _ => None,
        }
    }

    pub fn udp(&self) -> Option<&UdpHeader<'a>> {
        match &self.transport {
            Some(TransportHeader::Udp(h)) => Some(h),
            _ => None,
        }
    }

    pub fn icmp(&self) -> Option<&IcmpHeader<'a>> {
        match &self.transport {
            Some(TransportHeader::Icmp(h)) => Some(h),
            _ => None,
        }
    }

    pub fn icmpv6(&self) -> Option<&Icmpv6Header<'a>> {
        match &self.transport {
            Some(TransportHeader::Icmpv6(h)) => Some(h),
            _ => None,
        }
    }

    pub fn src_addr(&self) -> IpAddr {
        self.ip.src_addr()
    }

    pub fn dst_addr(&self) -> IpAddr {
        self.ip.dst_addr()
    }

    /// Source port for TCP and UDP, `None` otherwise.
    pub fn src_port(&self) -> Option<u16> {
        match &self.transport {
            Some(TransportHeader::Tcp(h)) => Some(h.src_port()),
            Some(TransportHeader::Udp(h)) => Some(h.src_port()),
            _ => None,
        }
    }

    /// Destination port for TCP and UDP, `None` otherwise.
    pub fn dst_port(&self) -> Option<u16> {
        match &self.transport {
            Some(TransportHeader::Tcp(h)) => Some(h.dst_port()),
            Some(TransportHeader::Udp(h)) => Some(h.dst_port()),
            _ => None,
        }
    }
}

/// Decodes the IP header and, when present, the transport header of the
/// packet at the front of `buffer`.
///
/// # Arguments
///
/// * `buffer` - Packet bytes starting at the IP header
///
/// # Returns
///
/// The parsed header views, or `MalformedPacket` when the buffer is empty,
/// the version is neither 4 nor 6, or the IP header does not fit
pub fn decode(buffer: &[u8]) -> Result<ParsedHeaders<'_>> {
    let first = buffer
        .first()
        .ok_or_else(|| DivertError::malformed("empty buffer"))?;

    match first >> 4 {
        4 => decode_ipv4(buffer),
        6 => decode_ipv6(buffer),
        version => Err(DivertError::malformed(format!(
            "unknown IP version {}",
            version
        ))),
    }
}

/// Total on-wire length of the IP packet at the front of `buffer`.
///
/// Used to split a concatenated batch when the driver does not report
/// per-packet lengths.
pub fn ip_packet_len(buffer: &[u8]) -> Result<usize> {
    let first = buffer
        .first()
        .ok_or_else(|| DivertError::malformed("empty buffer"))?;

    match first >> 4 {
        4 => {
            let ip = Ipv4Header::new(buffer)?;
            let total = usize::from(ip.total_length());
            if total < ip.header_len() {
                return Err(DivertError::malformed(format!(
                    "IPv4 total length {} is below header length {}",
                    total,
                    ip.header_len()
                )));
            }
            Ok(total)
        }
        6 => {
            let ip = Ipv6Header::new(buffer)?;
            Ok(IPV6_HEADER_LEN + usize::from(ip.payload_length()))
        }
        version => Err(DivertError::malformed(format!(
            "unknown IP version {}",
            version
        ))),
    }
}

fn decode_ipv4(buffer: &[u8]) -> Result<ParsedHeaders<'_>> {
    let ip = Ipv4Header::new(buffer)?;
    let header_len = ip.header_len();
    let total = usize::from(ip.total_length());
    if total < header_len {
        return Err(DivertError::malformed(format!(
            "IPv4 total length {} is below header length {}",
            total, header_len
        )));
    }

    let body = &buffer[header_len..total.min(buffer.len())];
    let (transport, payload) = if ip.fragment_offset() != 0 {
        (None, body)
    } else {
        decode_transport(ip.protocol(), body)
    };

    Ok(ParsedHeaders {
        ip: IpHeader::V4(ip),
        transport,
        payload,
    })
}

fn decode_ipv6(buffer: &[u8]) -> Result<ParsedHeaders<'_>> {
    let ip = Ipv6Header::new(buffer)?;
    let end = (IPV6_HEADER_LEN + usize::from(ip.payload_length())).min(buffer.len());
    let packet = &buffer[..end];

    let mut next = ip.next_header();
    let mut offset = IPV6_HEADER_LEN;
    let mut later_fragment = false;

    loop {
        let ext_len = match next {
            IPV6_HOP_BY_HOP | IPV6_ROUTING | IPV6_DEST_OPTS => packet
                .get(offset + 1)
                .map(|len| (usize::from(*len) + 1) * 8),
            IPV6_FRAGMENT => {
                if offset + 8 <= packet.len() {
                    later_fragment = be16(packet, offset + 2) >> 3 != 0;
                    Some(8)
                } else {
                    None
                }
            }
            IPV6_AUTH => packet
                .get(offset + 1)
                .map(|len| (usize::from(*len) + 2) * 4),
            _ => break,
        };

        match ext_len {
            Some(len) if offset + len <= packet.len() => {
                next = packet[offset];
                offset += len;
            }
            // Truncated extension header: stop here and report no transport.
            _ => {
                return Ok(ParsedHeaders {
                    ip: IpHeader::V6(ip),
                    transport: None,
                    payload: &packet[offset..],
                })
            }
        }
    }

    let body = &packet[offset..];
    let (transport, payload) = if later_fragment {
        (None, body)
    } else {
        decode_transport(next, body)
    };

    Ok(ParsedHeaders {
        ip: IpHeader::V6(ip),
        transport,
        payload,
    })
}

fn decode_transport(protocol: u8, body: &[u8]) -> (Option<TransportHeader<'_>>, &[u8]) {
    let transport = match protocol {
        IPPROTO_TCP => TcpHeader::new(body).map(TransportHeader::Tcp),
        IPPROTO_UDP => UdpHeader::new(body).map(TransportHeader::Udp),
        IPPROTO_ICMP => IcmpHeader::new(body).map(TransportHeader::Icmp),
        IPPROTO_ICMPV6 => Icmpv6Header::new(body).map(TransportHeader::Icmpv6),
        _ => None,
    };

    match transport {
        Some(header) => (Some(header), &body[header.header_len()..]),
        None => (None, body),
    }
}
