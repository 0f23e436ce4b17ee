use crate::error::Result;
use crate::network::address::Address;
use crate::network::header::{self, ParsedHeaders};
use std::time::{Duration, Instant};

/// An owned packet together with its metadata record.
///
/// Received batches borrow the caller's buffer; `Packet` copies one entry
/// out so it can be queued, inspected later or sent back on its own.
#[derive(Debug, Clone)]
pub struct Packet {
    /// Raw packet bytes, starting at the IP header
    pub data: Vec<u8>,

    /// Metadata reported by the driver
    pub address: Address,

    /// Timestamp when the packet was captured
    pub arrival_time: Instant,
}

impl Packet {
    /// Creates a packet, recording the current time as arrival time.
    pub fn new(data: Vec<u8>, address: Address) -> Self {
        Packet {
            data,
            address,
            arrival_time: Instant::now(),
        }
    }

    /// Returns the size of the packet in bytes
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Returns the time elapsed since the packet was captured
    pub fn age(&self) -> Duration {
        self.arrival_time.elapsed()
    }

    /// Decodes the packet's IP and transport headers.
    pub fn headers(&self) -> Result<ParsedHeaders<'_>> {
        header::decode(&self.data)
    }
}

impl From<(&Address, &[u8])> for Packet {
    fn from((address, data): (&Address, &[u8])) -> Self {
        Packet::new(data.to_vec(), *address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::header::testing::udp_ipv4_packet;

    #[test]
    fn test_packet_creation() {
        let data = udp_ipv4_packet(64, 5000, 6000);
        let packet = Packet::new(data.clone(), Address::default());

        assert_eq!(packet.data, data);
        assert_eq!(packet.size(), 64);
        assert!(packet.age().as_secs() < 1);
        assert_eq!(packet.headers().unwrap().dst_port(), Some(6000));
    }

    #[test]
    fn test_packet_from_batch_entry() {
        let address = Address::default();
        let packet = Packet::from((&address, &[0x60u8, 0, 0][..]));
        assert_eq!(packet.size(), 3);
        assert!(packet.headers().is_err());
    }
}
