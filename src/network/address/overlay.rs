//! Layer-specific interpretations of the 64 byte overlay region.
//!
//! Every variant is `repr(C)`, exactly 64 bytes and made only of integer
//! fields, so any byte pattern the driver writes is a valid value. Which
//! variant is meaningful is decided by the record's layer tag.

use crate::network::types::{Layer, OpenFlags};
use std::mem::size_of;
use std::net::{IpAddr, Ipv6Addr};

pub(crate) const OVERLAY_LEN: usize = 64;

/// Raw overlay storage, aligned for the widest variant field.
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(C, align(8))]
pub(crate) struct OverlayBytes(pub(crate) [u8; OVERLAY_LEN]);

impl OverlayBytes {
    pub(crate) const fn zeroed() -> Self {
        OverlayBytes([0; OVERLAY_LEN])
    }
}

mod sealed {
    pub trait Sealed {}
}

/// A typed view of the overlay region, tagged by the layer it belongs to.
///
/// This trait is sealed: only the variants in this module implement it.
pub trait OverlayKind: sealed::Sealed + Copy + 'static {
    /// The layer that primarily owns this variant.
    const LAYER: Layer;

    /// Whether a record on `layer` may be read as this variant.
    fn accepts(layer: Layer) -> bool {
        layer == Self::LAYER
    }
}

/// Decodes the driver's endpoint representation: four host-order words,
/// least significant first, with IPv4 stored IPv4-mapped.
fn decode_endpoint(raw: &[u8; 16]) -> IpAddr {
    let mut octets = [0u8; 16];
    for (i, word) in raw.chunks_exact(4).enumerate() {
        let value = u32::from_ne_bytes([word[0], word[1], word[2], word[3]]);
        let start = (3 - i) * 4;
        octets[start..start + 4].copy_from_slice(&value.to_be_bytes());
    }

    let v6 = Ipv6Addr::from(octets);
    match v6.to_ipv4_mapped() {
        Some(v4) => IpAddr::V4(v4),
        None => IpAddr::V6(v6),
    }
}

fn encode_endpoint(addr: IpAddr) -> [u8; 16] {
    let octets = match addr {
        IpAddr::V4(v4) => v4.to_ipv6_mapped().octets(),
        IpAddr::V6(v6) => v6.octets(),
    };

    let mut raw = [0u8; 16];
    for i in 0..4 {
        let start = (3 - i) * 4;
        let value = u32::from_be_bytes([
            octets[start],
            octets[start + 1],
            octets[start + 2],
            octets[start + 3],
        ]);
        raw[i * 4..i * 4 + 4].copy_from_slice(&value.to_ne_bytes());
    }
    raw
}

macro_rules! interface_overlay {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        #[repr(C)]
        pub struct $name {
            pub interface_index: u32,
            pub sub_interface_index: u32,
            _reserved: [u8; 56],
        }

        impl sealed::Sealed for $name {}

        impl OverlayKind for $name {
            const LAYER: Layer = Layer::Network;

            fn accepts(layer: Layer) -> bool {
                layer.carries_packets()
            }
        }

        const _: () = assert!(size_of::<$name>() == OVERLAY_LEN);
    };
}

macro_rules! endpoint_overlay {
    ($(#[$doc:meta])* $name:ident, $layer:expr) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        #[repr(C)]
        pub struct $name {
            pub endpoint_id: u64,
            pub parent_endpoint_id: u64,
            pub process_id: u32,
            local_addr: [u8; 16],
            remote_addr: [u8; 16],
            pub local_port: u16,
            pub remote_port: u16,
            pub protocol: u8,
            _reserved: [u8; 7],
        }

        impl $name {
            pub fn local_address(&self) -> IpAddr {
                decode_endpoint(&self.local_addr)
            }

            pub fn remote_address(&self) -> IpAddr {
                decode_endpoint(&self.remote_addr)
            }

            pub fn set_local_address(&mut self, addr: IpAddr) {
                self.local_addr = encode_endpoint(addr);
            }

            pub fn set_remote_address(&mut self, addr: IpAddr) {
                self.remote_addr = encode_endpoint(addr);
            }

            /// The local address exactly as the driver stored it.
            pub fn raw_local_address(&self) -> &[u8; 16] {
                &self.local_addr
            }

            /// The remote address exactly as the driver stored it.
            pub fn raw_remote_address(&self) -> &[u8; 16] {
                &self.remote_addr
            }
        }

        impl sealed::Sealed for $name {}

        impl OverlayKind for $name {
            const LAYER: Layer = $layer;
        }

        const _: () = assert!(size_of::<$name>() == OVERLAY_LEN);
    };
}

interface_overlay! {
    /// Interface indices for Ethernet frame events.
    EthernetData
}

interface_overlay! {
    /// Interface indices for packets on the network layers.
    NetworkData
}

endpoint_overlay! {
    /// Socket operation details: endpoint, owning process and 5-tuple.
    SocketData, Layer::Socket
}

endpoint_overlay! {
    /// Flow details: endpoint, owning process and 5-tuple.
    FlowData, Layer::Flow
}

/// Details about another handle being opened or closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct ReflectData {
    /// Handle open time
    pub timestamp: i64,
    /// Process that opened the handle
    pub process_id: u32,
    layer: u32,
    flags: u64,
    pub priority: i16,
    _reserved: [u8; 38],
}

impl ReflectData {
    /// The layer the reflected handle was opened on, if it is a known one.
    pub fn layer(&self) -> Option<Layer> {
        u8::try_from(self.layer)
            .ok()
            .and_then(|raw| Layer::try_from(raw).ok())
    }

    pub fn set_layer(&mut self, layer: Layer) {
        self.layer = u32::from(layer.as_raw());
    }

    /// The open flags of the reflected handle; unknown bits are dropped.
    pub fn flags(&self) -> OpenFlags {
        OpenFlags::from_bits_truncate(self.flags)
    }

    pub fn set_flags(&mut self, flags: OpenFlags) {
        self.flags = flags.bits();
    }
}

impl sealed::Sealed for ReflectData {}

impl OverlayKind for ReflectData {
    const LAYER: Layer = Layer::Reflect;
}

const _: () = assert!(size_of::<ReflectData>() == OVERLAY_LEN);

/// The overlay variant selected by a record's layer tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overlay<'a> {
    Ethernet(&'a EthernetData),
    Network(&'a NetworkData),
    Flow(&'a FlowData),
    Socket(&'a SocketData),
    Reflect(&'a ReflectData),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    #[test]
    fn test_endpoint_ipv4_round_trip() {
        let addr = IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20));
        assert_eq!(decode_endpoint(&encode_endpoint(addr)), addr);
    }

    #[test]
    fn test_endpoint_ipv6_round_trip() {
        let addr = IpAddr::V6(Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0xdead, 0xbeef));
        assert_eq!(decode_endpoint(&encode_endpoint(addr)), addr);
    }

    #[test]
    fn test_endpoint_word_order() {
        // 10.0.0.1 lives in the least significant word, which the driver stores first.
        let raw = encode_endpoint(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)));
        assert_eq!(&raw[0..4], &0x0a00_0001u32.to_ne_bytes());
        assert_eq!(&raw[4..8], &0x0000_ffffu32.to_ne_bytes());
        assert_eq!(&raw[8..16], &[0u8; 8]);
    }

    #[test]
    fn test_overlay_acceptance() {
        assert!(NetworkData::accepts(Layer::Network));
        assert!(NetworkData::accepts(Layer::NetworkForward));
        assert!(EthernetData::accepts(Layer::Network));
        assert!(!NetworkData::accepts(Layer::Flow));
        assert!(FlowData::accepts(Layer::Flow));
        assert!(!FlowData::accepts(Layer::Socket));
        assert!(SocketData::accepts(Layer::Socket));
        assert!(ReflectData::accepts(Layer::Reflect));
    }
}
