use divert::network::header::{IPPROTO_UDP, IPV4_MIN_HEADER_LEN, UDP_HEADER_LEN};
use divert::prelude::*;
use rand::Rng;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Builds an IPv4/UDP packet of exactly `total_len` bytes with a random payload.
fn udp_packet(total_len: usize, src_port: u16, dst_port: u16) -> Vec<u8> {
    let udp_len = total_len - IPV4_MIN_HEADER_LEN;
    let mut packet = vec![0u8; total_len];

    packet[0] = 0x45;
    packet[2..4].copy_from_slice(&(total_len as u16).to_be_bytes());
    packet[8] = 64;
    packet[9] = IPPROTO_UDP;
    packet[12..16].copy_from_slice(&[10, 0, 0, 2]);
    packet[16..20].copy_from_slice(&[10, 0, 0, 1]);

    let udp = &mut packet[IPV4_MIN_HEADER_LEN..];
    udp[0..2].copy_from_slice(&src_port.to_be_bytes());
    udp[2..4].copy_from_slice(&dst_port.to_be_bytes());
    udp[4..6].copy_from_slice(&(udp_len as u16).to_be_bytes());
    rand::rng().fill(&mut udp[UDP_HEADER_LEN..]);

    packet
}

fn sniffing_handle(backend: &MemoryBackend) -> Handle {
    let context = Context::new(backend.clone()).unwrap();
    context
        .open(HandleConfig::with_filter("true").layer(Layer::Network).sniff())
        .unwrap()
}

#[test]
fn test_sniff_udp_packet() {
    let backend = MemoryBackend::new();
    let handle = sniffing_handle(&backend);

    let packet = udp_packet(1234, 40000, 53);
    backend.inject(&packet, Address::new(Layer::Network)).unwrap();

    let mut buffer = vec![0u8; 2048];
    let (len, address) = handle.recv(&mut buffer).unwrap();

    assert_eq!(len, 1234);
    assert_eq!(address.layer(), Layer::Network);
    assert_eq!(address.event(), Event::NetworkPacket);
    assert_eq!(address.length(), 1234);
    assert_eq!(&buffer[..len], packet.as_slice());

    let headers = decode(&buffer[..len]).unwrap();
    assert!(headers.ipv4().is_some());
    let udp = headers.udp().unwrap();
    assert_eq!(udp.src_port(), 40000);
    assert_eq!(udp.dst_port(), 53);
    assert_eq!(headers.payload().len(), 1234 - 28);
    assert_eq!(headers.src_addr(), IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)));
}

#[test]
fn test_batch_and_single_receive_agree() {
    let sizes = [60, 1234, 576, 1500];
    let packets: Vec<Vec<u8>> = sizes
        .iter()
        .enumerate()
        .map(|(i, &size)| udp_packet(size, 5000 + i as u16, 443))
        .collect();

    let batched = MemoryBackend::new();
    let single = MemoryBackend::new();
    for packet in &packets {
        batched.inject(packet, Address::new(Layer::Network)).unwrap();
        single.inject(packet, Address::new(Layer::Network)).unwrap();
    }

    let handle = sniffing_handle(&batched);
    let mut buffer = vec![0u8; 8192];
    let mut addresses = vec![Address::default(); 8];
    let (bytes, events) = handle.recv_ex(&mut buffer, &mut addresses, 8).unwrap();
    assert_eq!(events, packets.len());
    let from_batch: Vec<(Address, Vec<u8>)> = divert::network::core::packets(
        &buffer[..bytes],
        &addresses[..events],
    )
    .map(|(a, p)| (*a, p.to_vec()))
    .collect();

    let handle = sniffing_handle(&single);
    let mut from_single = Vec::new();
    for _ in 0..packets.len() {
        let mut buffer = vec![0u8; 2048];
        let (len, address) = handle.recv(&mut buffer).unwrap();
        from_single.push((address, buffer[..len].to_vec()));
    }

    assert_eq!(from_batch, from_single);
    for ((_, data), expected) in from_batch.iter().zip(&packets) {
        assert_eq!(data, expected);
    }
}

#[test]
fn test_batch_and_single_send_agree() {
    let packets: Vec<Vec<u8>> = (0..3).map(|i| udp_packet(100 + i * 50, 7000, 7001)).collect();
    let mut address = Address::new(Layer::Network);
    address.set_outbound();
    let addresses = vec![address; packets.len()];

    let batched = MemoryBackend::new();
    let handle = Context::new(batched.clone())
        .unwrap()
        .open(HandleConfig::default())
        .unwrap();
    let slices: Vec<&[u8]> = packets.iter().map(|p| p.as_slice()).collect();
    let written = handle.send_ex(&slices, &addresses).unwrap();
    assert_eq!(written, 300 + 50 * 3);

    let single = MemoryBackend::new();
    let handle = Context::new(single.clone())
        .unwrap()
        .open(HandleConfig::default())
        .unwrap();
    for (packet, address) in packets.iter().zip(&addresses) {
        handle.send(packet, address).unwrap();
    }

    let batched_sent = batched.take_sent();
    assert_eq!(batched_sent, single.take_sent());
    assert_eq!(batched_sent.len(), 3);
    assert_eq!(batched_sent[1].1.length(), 150);
    assert!(batched_sent[1].1.is_outbound());
}

#[test]
fn test_passthru_reinjects_unchanged() {
    let backend = MemoryBackend::new();
    let handle = Context::new(backend.clone())
        .unwrap()
        .open(HandleConfig::with_filter("udp"))
        .unwrap();

    let packets: Vec<Vec<u8>> = (0..5).map(|i| udp_packet(200 + i, 9000, 9001)).collect();
    for packet in &packets {
        backend.inject(packet, Address::new(Layer::Network)).unwrap();
    }

    let received = handle.recv_packets(&mut vec![0u8; 4096], 16).unwrap();
    assert_eq!(received.len(), 5);
    handle.send_packets(&received).unwrap();

    let sent: Vec<Vec<u8>> = backend.take_sent().into_iter().map(|(p, _)| p).collect();
    assert_eq!(sent, packets);
}

#[test]
fn test_shutdown_unblocks_receiver() {
    let backend = MemoryBackend::new();
    let handle = Arc::new(sniffing_handle(&backend));

    let receiver = {
        let handle = Arc::clone(&handle);
        thread::spawn(move || {
            let mut buffer = vec![0u8; 2048];
            handle.recv(&mut buffer)
        })
    };

    thread::sleep(Duration::from_millis(50));
    handle.shutdown(ShutdownMode::Recv).unwrap();

    let result = receiver.join().unwrap();
    assert!(matches!(result, Err(DivertError::Disconnected)));
    handle.close().unwrap();
}

#[test]
fn test_flow_events_filtered_by_process() {
    let backend = MemoryBackend::new();
    let handle = Context::new(backend.clone())
        .unwrap()
        .open(HandleConfig::flow("tcp"))
        .unwrap();

    for (pid, remote) in [(100, [10, 1, 2, 3]), (200, [10, 1, 2, 4]), (100, [192, 0, 2, 1])] {
        let mut address = Address::with_event(Layer::Flow, Event::FlowEstablished).unwrap();
        let flow = address.overlay_as_mut::<FlowData>().unwrap();
        flow.process_id = pid;
        flow.protocol = 6;
        flow.set_remote_address(IpAddr::V4(Ipv4Addr::from(remote)));
        backend.inject(&[], address).unwrap();
    }

    let pids: PidSet = [100].into_iter().collect();
    let remotes = IpTrie::new();
    remotes.insert_cidr("10.0.0.0/8").unwrap();
    let filter = EndpointFilter::new(pids, remotes);

    let mut buffer = [0u8; 1];
    let mut addresses = vec![Address::default(); 8];
    let (bytes, events) = handle.recv_ex(&mut buffer, &mut addresses, 8).unwrap();
    assert_eq!((bytes, events), (0, 3));

    let matched: Vec<u32> = addresses[..events]
        .iter()
        .filter(|a| filter.matches(a))
        .map(|a| a.flow().unwrap().process_id)
        .collect();
    assert_eq!(matched, vec![100]);
}
