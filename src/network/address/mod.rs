//! The per-event metadata record exchanged with the driver.
//!
//! [`Address`] has the exact in-memory layout of `WINDIVERT_ADDRESS`, so
//! slices of it are handed to the driver without any translation. Fields are
//! private; accessors keep the bit-packed parts (flags byte, length word)
//! consistent.

mod overlay;

pub use overlay::{
    EthernetData, FlowData, NetworkData, Overlay, OverlayKind, ReflectData, SocketData,
};

use crate::error::{DivertError, Result};
use crate::network::types::{AddressFlags, Event, Layer};
use overlay::OverlayBytes;
use std::fmt;
use std::mem::{align_of, size_of};

/// Size of one record as the driver lays it out.
pub const ADDRESS_SIZE: usize = 80;

/// Largest packet length representable in the length word.
pub const LENGTH_MAX: usize = 0xF_FFFF;

const LENGTH_SHIFT: u32 = 12;
const LENGTH_RESERVED_MASK: u32 = (1 << LENGTH_SHIFT) - 1;

/// Metadata the driver attaches to every captured packet or event.
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct Address {
    timestamp: i64,
    layer: u8,
    event: u8,
    flags: u8,
    reserved1: u8,
    length_word: u32,
    overlay: OverlayBytes,
}

const _: () = assert!(size_of::<Address>() == ADDRESS_SIZE);
const _: () = assert!(align_of::<Address>() == 8);

macro_rules! flag_accessors {
    ($($flag:ident => $get:ident, $set:ident, $clear:ident;)*) => {
        $(
            pub fn $get(&self) -> bool {
                self.flags().contains(AddressFlags::$flag)
            }

            pub fn $set(&mut self) {
                self.flags |= AddressFlags::$flag.bits();
            }

            pub fn $clear(&mut self) {
                self.flags &= !AddressFlags::$flag.bits();
            }
        )*
    };
}

impl Address {
    /// Creates a zeroed record on `layer` carrying the layer's default event.
    pub fn new(layer: Layer) -> Self {
        Address {
            timestamp: 0,
            layer: layer.as_raw(),
            event: layer.default_event().as_raw(),
            flags: 0,
            reserved1: 0,
            length_word: 0,
            overlay: OverlayBytes::zeroed(),
        }
    }

    /// Creates a zeroed record with an explicit event, rejecting pairs the
    /// driver never reports.
    pub fn with_event(layer: Layer, event: Event) -> Result<Self> {
        let mut address = Address::new(layer);
        address.set_event(event)?;
        Ok(address)
    }

    /// Rebuilds a record from its raw driver bytes.
    ///
    /// Every byte pattern is a structurally valid record; call
    /// [`Address::validate`] before trusting the tags.
    pub fn from_bytes(bytes: &[u8; ADDRESS_SIZE]) -> Self {
        let mut overlay = OverlayBytes::zeroed();
        overlay.0.copy_from_slice(&bytes[16..]);
        Address {
            timestamp: i64::from_ne_bytes(bytes[0..8].try_into().unwrap_or_default()),
            layer: bytes[8],
            event: bytes[9],
            flags: bytes[10],
            reserved1: bytes[11],
            length_word: u32::from_ne_bytes(bytes[12..16].try_into().unwrap_or_default()),
            overlay,
        }
    }

    /// The record's raw driver representation.
    pub fn as_bytes(&self) -> &[u8; ADDRESS_SIZE] {
        // SAFETY: Address is repr(C), 80 bytes, has no padding and only
        // integer fields, so every byte is initialised.
        unsafe { &*(self as *const Address as *const [u8; ADDRESS_SIZE]) }
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn set_timestamp(&mut self, timestamp: i64) {
        self.timestamp = timestamp;
    }

    /// The layer tag. Unknown raw tags read as [`Layer::Network`]; use
    /// [`Address::validate`] to reject them.
    pub fn layer(&self) -> Layer {
        Layer::try_from(self.layer).unwrap_or_default()
    }

    pub fn raw_layer(&self) -> u8 {
        self.layer
    }

    /// Changes the layer tag. The event is reset to the layer's default when
    /// the current one cannot occur on the new layer.
    pub fn set_layer(&mut self, layer: Layer) {
        self.layer = layer.as_raw();
        let keeps_event = Event::try_from(self.event)
            .map(|event| event.is_valid_for(layer))
            .unwrap_or(false);
        if !keeps_event {
            self.event = layer.default_event().as_raw();
        }
    }

    /// The event tag. Unknown raw values read as the layer's default event.
    pub fn event(&self) -> Event {
        Event::try_from(self.event).unwrap_or_else(|_| self.layer().default_event())
    }

    pub fn raw_event(&self) -> u8 {
        self.event
    }

    pub fn set_event(&mut self, event: Event) -> Result<()> {
        let layer = self.layer();
        if !event.is_valid_for(layer) {
            return Err(DivertError::InvalidRecord {
                index: 0,
                reason: format!("event {} cannot occur on layer {}", event, layer),
            });
        }
        self.event = event.as_raw();
        Ok(())
    }

    pub fn flags(&self) -> AddressFlags {
        AddressFlags::from_bits_retain(self.flags)
    }

    pub fn set_flags(&mut self, flags: AddressFlags) {
        self.flags = flags.bits();
    }

    flag_accessors! {
        SNIFFED => is_sniffed, set_sniffed, clear_sniffed;
        OUTBOUND => is_outbound, set_outbound, clear_outbound;
        LOOPBACK => is_loopback, set_loopback, clear_loopback;
        IMPOSTOR => is_impostor, set_impostor, clear_impostor;
        IPV6 => is_ipv6, set_ipv6, clear_ipv6;
        IP_CHECKSUM => has_ip_checksum, set_ip_checksum, clear_ip_checksum;
        TCP_CHECKSUM => has_tcp_checksum, set_tcp_checksum, clear_tcp_checksum;
        UDP_CHECKSUM => has_udp_checksum, set_udp_checksum, clear_udp_checksum;
    }

    /// Length in bytes of the packet this record describes.
    pub fn length(&self) -> usize {
        (self.length_word >> LENGTH_SHIFT) as usize
    }

    /// Stores the packet length, keeping the reserved low bits.
    pub fn set_length(&mut self, length: usize) -> Result<()> {
        if length > LENGTH_MAX {
            return Err(DivertError::malformed(format!(
                "packet length {} exceeds {}",
                length, LENGTH_MAX
            )));
        }
        self.length_word =
            ((length as u32) << LENGTH_SHIFT) | (self.length_word & LENGTH_RESERVED_MASK);
        Ok(())
    }

    /// Checks the raw layer tag, the raw event and that the pair can occur.
    pub fn validate(&self) -> Result<()> {
        let layer = Layer::try_from(self.layer)?;
        let event = Event::try_from(self.event)?;
        if !event.is_valid_for(layer) {
            return Err(DivertError::InvalidRecord {
                index: 0,
                reason: format!("event {} cannot occur on layer {}", event, layer),
            });
        }
        Ok(())
    }

    /// Reads the overlay as `T`, failing if the record's layer does not own it.
    pub fn overlay_as<T: OverlayKind>(&self) -> Result<&T> {
        self.check_overlay::<T>()?;
        // SAFETY: layer checked above.
        Ok(unsafe { self.overlay_unchecked::<T>() })
    }

    pub fn overlay_as_mut<T: OverlayKind>(&mut self) -> Result<&mut T> {
        self.check_overlay::<T>()?;
        // SAFETY: see `overlay_unchecked`; the pointer comes from a unique borrow.
        Ok(unsafe { &mut *(self.overlay.0.as_mut_ptr() as *mut T) })
    }

    /// Reads the overlay as `T` without checking the layer tag.
    ///
    /// # Safety
    ///
    /// Every overlay variant is valid for any bit pattern, so this cannot
    /// produce undefined behaviour by itself, but the caller must have
    /// verified that `T::accepts(self.layer())` or the fields are garbage.
    pub unsafe fn overlay_unchecked<T: OverlayKind>(&self) -> &T {
        // Variants are 64 bytes with alignment <= 8, matching OverlayBytes.
        &*(self.overlay.0.as_ptr() as *const T)
    }

    /// The overlay variant selected by the layer tag and event.
    pub fn overlay(&self) -> Overlay<'_> {
        // SAFETY: each arm reads the variant owned by the matched layer.
        unsafe {
            match self.layer() {
                Layer::Network | Layer::NetworkForward => {
                    if self.event == Event::EthernetFrame.as_raw() {
                        Overlay::Ethernet(self.overlay_unchecked())
                    } else {
                        Overlay::Network(self.overlay_unchecked())
                    }
                }
                Layer::Flow => Overlay::Flow(self.overlay_unchecked()),
                Layer::Socket => Overlay::Socket(self.overlay_unchecked()),
                Layer::Reflect => Overlay::Reflect(self.overlay_unchecked()),
            }
        }
    }

    pub fn network(&self) -> Option<&NetworkData> {
        self.overlay_as().ok()
    }

    pub fn flow(&self) -> Option<&FlowData> {
        self.overlay_as().ok()
    }

    pub fn socket(&self) -> Option<&SocketData> {
        self.overlay_as().ok()
    }

    pub fn reflect(&self) -> Option<&ReflectData> {
        self.overlay_as().ok()
    }

    fn check_overlay<T: OverlayKind>(&self) -> Result<()> {
        let actual = Layer::try_from(self.layer)?;
        if T::accepts(actual) {
            Ok(())
        } else {
            Err(DivertError::LayerMismatch {
                expected: T::LAYER,
                actual,
            })
        }
    }
}

impl Default for Address {
    fn default() -> Self {
        Address::new(Layer::Network)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Address")
            .field("timestamp", &self.timestamp)
            .field("layer", &self.layer())
            .field("event", &self.event())
            .field("flags", &self.flags())
            .field("length", &self.length())
            .field("overlay", &self.overlay())
            .finish()
    }
}
