//! Batch framing between caller buffers and the driver.
//!
//! A batch is one concatenated packet buffer plus one [`Address`] per event,
//! where each record's length says how many bytes of the buffer belong to it.

use crate::error::{DivertError, Result};
use crate::network::address::Address;
use crate::network::driver::Driver;
use crate::network::types::{Layer, BATCH_MAX, MTU_MAX};
use log::debug;
use std::slice;

/// Per-handle working memory, reused across calls under the handle's lock.
pub(crate) struct Scratch {
    addresses: Vec<Address>,
    send_buffer: Vec<u8>,
}

impl Scratch {
    pub(crate) fn new() -> Self {
        Scratch {
            addresses: vec![Address::default(); BATCH_MAX],
            send_buffer: Vec::new(),
        }
    }
}

fn invalid(index: usize, reason: impl Into<String>) -> DivertError {
    DivertError::InvalidRecord {
        index,
        reason: reason.into(),
    }
}

/// Checks what the driver returned before any of it reaches the caller.
fn validate_records(records: &[Address], layer: Layer, bytes_read: usize) -> Result<()> {
    let mut total = 0usize;
    for (index, record) in records.iter().enumerate() {
        if let Err(err) = record.validate() {
            return Err(match err {
                DivertError::InvalidRecord { reason, .. } => invalid(index, reason),
                other => other,
            });
        }
        if record.layer() != layer {
            return Err(invalid(
                index,
                format!("{} record on a {} handle", record.layer(), layer),
            ));
        }
        total += record.length();
    }

    if total != bytes_read {
        return Err(invalid(
            records.len().saturating_sub(1),
            format!("lengths sum to {} but {} bytes were read", total, bytes_read),
        ));
    }
    Ok(())
}

/// Receives up to `min(addresses.len(), max_events, BATCH_MAX)` events.
///
/// The driver fills `scratch`; only a fully validated batch is copied into
/// `addresses`, so on error the caller's records are unchanged.
pub(crate) fn recv_batch(
    driver: &dyn Driver,
    scratch: &mut Scratch,
    layer: Layer,
    buffer: &mut [u8],
    addresses: &mut [Address],
    max_events: usize,
) -> Result<(usize, usize)> {
    if buffer.is_empty() || addresses.is_empty() || max_events == 0 {
        return Err(DivertError::EmptyBuffer);
    }

    let limit = addresses.len().min(max_events).min(BATCH_MAX);
    let (bytes, events) = driver.recv_ex(buffer, &mut scratch.addresses[..limit])?;
    if events > limit || bytes > buffer.len() {
        return Err(invalid(
            0,
            format!(
                "driver reported {} events and {} bytes for {} slots and {} bytes",
                events,
                bytes,
                limit,
                buffer.len()
            ),
        ));
    }

    validate_records(&scratch.addresses[..events], layer, bytes)?;
    addresses[..events].copy_from_slice(&scratch.addresses[..events]);

    debug!("received batch of {} events ({} bytes)", events, bytes);
    Ok((bytes, events))
}

/// Sends one packet per record. Lengths are stamped into copies of the
/// records; the caller's records are not modified.
pub(crate) fn send_batch(
    driver: &dyn Driver,
    scratch: &mut Scratch,
    layer: Layer,
    packets: &[&[u8]],
    addresses: &[Address],
) -> Result<usize> {
    if packets.len() != addresses.len() {
        return Err(DivertError::CountMismatch {
            packets: packets.len(),
            addresses: addresses.len(),
        });
    }
    if packets.is_empty() {
        return Err(DivertError::EmptyBuffer);
    }
    if packets.len() > BATCH_MAX {
        return Err(DivertError::BatchTooLarge(packets.len()));
    }

    for (index, (packet, address)) in packets.iter().zip(addresses).enumerate() {
        if packet.is_empty() {
            return Err(DivertError::EmptyBuffer);
        }
        if packet.len() > MTU_MAX {
            return Err(DivertError::malformed(format!(
                "packet {} is {} bytes, above the {} byte maximum",
                index,
                packet.len(),
                MTU_MAX
            )));
        }
        let actual = Layer::try_from(address.raw_layer()).map_err(|_| {
            invalid(index, format!("unknown layer tag {}", address.raw_layer()))
        })?;
        if actual != layer {
            return Err(DivertError::LayerMismatch {
                expected: layer,
                actual,
            });
        }
    }

    scratch.send_buffer.clear();
    for (index, (packet, address)) in packets.iter().zip(addresses).enumerate() {
        scratch.send_buffer.extend_from_slice(packet);
        let record = &mut scratch.addresses[index];
        *record = *address;
        record.set_length(packet.len())?;
    }

    let written = driver.send_ex(&scratch.send_buffer, &scratch.addresses[..packets.len()])?;
    debug!("sent batch of {} packets ({} bytes)", packets.len(), written);
    Ok(written)
}

/// Iterator over the packets of a received batch.
///
/// Yields each record with its slice of the concatenated buffer. A record
/// whose length runs past the buffer gets the truncated remainder.
#[derive(Debug, Clone)]
pub struct Packets<'a> {
    buffer: &'a [u8],
    addresses: slice::Iter<'a, Address>,
    offset: usize,
}

impl<'a> Iterator for Packets<'a> {
    type Item = (&'a Address, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        let address = self.addresses.next()?;
        let start = self.offset.min(self.buffer.len());
        let end = (start + address.length()).min(self.buffer.len());
        self.offset = end;
        Some((address, &self.buffer[start..end]))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.addresses.size_hint()
    }
}

impl ExactSizeIterator for Packets<'_> {}

/// Splits a received batch into `(record, packet)` pairs.
///
/// Pass the filled prefixes, i.e. `&buffer[..bytes_read]` and
/// `&addresses[..events_read]`.
pub fn packets<'a>(buffer: &'a [u8], addresses: &'a [Address]) -> Packets<'a> {
    Packets {
        buffer,
        addresses: addresses.iter(),
        offset: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::driver::{Backend, MemoryBackend};
    use crate::network::header::testing::udp_ipv4_packet;
    use crate::network::types::OpenFlags;

    fn setup() -> (MemoryBackend, Box<dyn Driver>, Scratch) {
        let backend = MemoryBackend::new().non_blocking();
        let driver = backend
            .open("true", Layer::Network, 0, OpenFlags::empty())
            .unwrap();
        (backend, Box::new(driver), Scratch::new())
    }

    #[test]
    fn test_recv_rejects_empty_buffers() {
        let (_backend, driver, mut scratch) = setup();
        let mut buffer = [0u8; 16];
        let mut addresses = [Address::default(); 2];

        for (buf_len, slots, max) in [(0, 2, 2), (16, 0, 2), (16, 2, 0)] {
            assert!(matches!(
                recv_batch(
                    driver.as_ref(),
                    &mut scratch,
                    Layer::Network,
                    &mut buffer[..buf_len],
                    &mut addresses[..slots],
                    max
                ),
                Err(DivertError::EmptyBuffer)
            ));
        }
    }

    #[test]
    fn test_recv_limits_batch_to_max_events() {
        let (backend, driver, mut scratch) = setup();
        for port in 1..=3 {
            backend
                .inject(&udp_ipv4_packet(60, port, 80), Address::default())
                .unwrap();
        }

        let mut buffer = vec![0u8; 1024];
        let mut addresses = [Address::default(); 8];
        let (bytes, events) = recv_batch(
            driver.as_ref(),
            &mut scratch,
            Layer::Network,
            &mut buffer,
            &mut addresses,
            2,
        )
        .unwrap();
        assert_eq!((bytes, events), (120, 2));
        assert_eq!(backend.pending(), 1);
    }

    #[test]
    fn test_recv_is_atomic_on_bad_record() {
        let (backend, driver, mut scratch) = setup();
        let mut wrong_length = Address::default();
        wrong_length.set_length(10).unwrap();
        backend.inject_raw(vec![0x45; 60], wrong_length);

        let mut buffer = vec![0u8; 256];
        let mut addresses = [Address::new(Layer::Reflect); 4];
        let before = addresses;
        match recv_batch(
            driver.as_ref(),
            &mut scratch,
            Layer::Network,
            &mut buffer,
            &mut addresses,
            4,
        ) {
            Err(DivertError::InvalidRecord { index, .. }) => assert_eq!(index, 0),
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(addresses, before);
    }

    #[test]
    fn test_recv_rejects_bad_event_pairing() {
        let (backend, driver, mut scratch) = setup();
        let mut bytes = *Address::default().as_bytes();
        bytes[9] = 7;
        backend.inject_raw(Vec::new(), Address::from_bytes(&bytes));

        let mut buffer = vec![0u8; 64];
        let mut addresses = [Address::default(); 1];
        assert!(matches!(
            recv_batch(
                driver.as_ref(),
                &mut scratch,
                Layer::Network,
                &mut buffer,
                &mut addresses,
                1
            ),
            Err(DivertError::InvalidRecord { .. })
        ));
    }

    #[test]
    fn test_send_validation() {
        let (_backend, driver, mut scratch) = setup();
        let packet = udp_ipv4_packet(40, 1, 2);
        let address = Address::default();

        let result = send_batch(driver.as_ref(), &mut scratch, Layer::Network, &[packet.as_slice()], &[]);
        assert!(matches!(
            result,
            Err(DivertError::CountMismatch { packets: 1, addresses: 0 })
        ));

        let result = send_batch(driver.as_ref(), &mut scratch, Layer::Network, &[], &[]);
        assert!(matches!(result, Err(DivertError::EmptyBuffer)));

        let result = send_batch(driver.as_ref(), &mut scratch, Layer::Network, &[&[]], &[address]);
        assert!(matches!(result, Err(DivertError::EmptyBuffer)));

        let huge = vec![0x45u8; MTU_MAX + 1];
        let result = send_batch(driver.as_ref(), &mut scratch, Layer::Network, &[huge.as_slice()], &[address]);
        assert!(matches!(result, Err(DivertError::MalformedPacket(_))));

        let flow = Address::new(Layer::Flow);
        let result = send_batch(driver.as_ref(), &mut scratch, Layer::Network, &[packet.as_slice()], &[flow]);
        assert!(matches!(
            result,
            Err(DivertError::LayerMismatch { expected: Layer::Network, actual: Layer::Flow })
        ));

        let many: Vec<&[u8]> = vec![packet.as_slice(); BATCH_MAX + 1];
        let addresses = vec![address; BATCH_MAX + 1];
        let result = send_batch(driver.as_ref(), &mut scratch, Layer::Network, &many, &addresses);
        assert!(matches!(result, Err(DivertError::BatchTooLarge(256))));
    }

    #[test]
    fn test_send_stamps_lengths_on_copies() {
        let (backend, driver, mut scratch) = setup();
        let first = udp_ipv4_packet(40, 1, 2);
        let second = udp_ipv4_packet(52, 3, 4);
        let addresses = [Address::default(); 2];

        let written = send_batch(
            driver.as_ref(),
            &mut scratch,
            Layer::Network,
            &[first.as_slice(), second.as_slice()],
            &addresses,
        )
        .unwrap();
        assert_eq!(written, 92);
        assert_eq!(addresses[0].length(), 0);

        let sent = backend.take_sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].0, first);
        assert_eq!(sent[1].1.length(), 52);
    }

    #[test]
    fn test_packets_splits_by_length() {
        let mut a = Address::default();
        a.set_length(3).unwrap();
        let mut b = Address::default();
        b.set_length(2).unwrap();
        let addresses = [a, b];
        let buffer = [1u8, 2, 3, 4, 5];

        let split: Vec<_> = packets(&buffer, &addresses).map(|(_, data)| data.to_vec()).collect();
        assert_eq!(split, vec![vec![1, 2, 3], vec![4, 5]]);
        assert_eq!(packets(&buffer, &addresses).len(), 2);
    }

    #[test]
    fn test_packets_truncates_overrun() {
        let mut a = Address::default();
        a.set_length(10).unwrap();
        let addresses = [a, a];
        let buffer = [0u8; 6];

        let lengths: Vec<_> = packets(&buffer, &addresses).map(|(_, data)| data.len()).collect();
        assert_eq!(lengths, vec![6, 0]);
    }
}
