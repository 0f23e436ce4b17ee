//! Utility functions for reporting.
//!
//! This module contains shared helpers used by the command-line tool.

use crate::network::address::{Address, Overlay};
use crate::network::header;
use log::info;

/// Logs packet statistics including received count, reinjected count, and
/// the share that was not reinjected.
///
/// # Arguments
///
/// * `received` - Number of packets received
/// * `reinjected` - Number of packets sent back to the driver
pub fn log_statistics(received: usize, reinjected: usize) {
    let dropped = received.saturating_sub(reinjected);
    let dropped_percentage = if received == 0 {
        0.0
    } else {
        (dropped as f64 / received as f64) * 100.0
    };

    info!(
        "Received Packets: {}, Reinjected Packets: {}, Lost Packets: {} - {:.2}%",
        received, reinjected, dropped, dropped_percentage
    );
}

/// Renders a one-line summary of a record: event, direction, and the
/// layer-specific details.
pub fn format_address(address: &Address) -> String {
    let direction = if address.is_outbound() { "out" } else { "in" };
    let mut line = format!("{} {}", address.event(), direction);
    if address.is_loopback() {
        line.push_str(" loopback");
    }
    if address.is_impostor() {
        line.push_str(" impostor");
    }

    match address.overlay() {
        Overlay::Network(data) => {
            line.push_str(&format!(
                " if={}.{} len={}",
                data.interface_index,
                data.sub_interface_index,
                address.length()
            ));
        }
        Overlay::Ethernet(data) => {
            line.push_str(&format!(
                " if={}.{} len={}",
                data.interface_index,
                data.sub_interface_index,
                address.length()
            ));
        }
        Overlay::Flow(data) => {
            line.push_str(&format!(
                " pid={} proto={} {}:{} -> {}:{}",
                data.process_id,
                data.protocol,
                data.local_address(),
                data.local_port,
                data.remote_address(),
                data.remote_port
            ));
        }
        Overlay::Socket(data) => {
            line.push_str(&format!(
                " pid={} proto={} {}:{} -> {}:{}",
                data.process_id,
                data.protocol,
                data.local_address(),
                data.local_port,
                data.remote_address(),
                data.remote_port
            ));
        }
        Overlay::Reflect(data) => {
            let layer = data
                .layer()
                .map(|l| l.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            line.push_str(&format!(
                " pid={} layer={} priority={} flags={:?}",
                data.process_id,
                layer,
                data.priority,
                data.flags()
            ));
        }
    }
    line
}

/// Renders the decoded headers of a packet, or the decode error.
pub fn format_packet(packet: &[u8]) -> String {
    match header::decode(packet) {
        Ok(headers) => {
            let protocol = headers
                .transport()
                .map(|t| t.protocol())
                .unwrap_or_default();
            match (headers.src_port(), headers.dst_port()) {
                (Some(sport), Some(dport)) => format!(
                    "{}:{} -> {}:{} proto={} payload={}",
                    headers.src_addr(),
                    sport,
                    headers.dst_addr(),
                    dport,
                    protocol,
                    headers.payload().len()
                ),
                _ => format!(
                    "{} -> {} proto={} payload={}",
                    headers.src_addr(),
                    headers.dst_addr(),
                    protocol,
                    headers.payload().len()
                ),
            }
        }
        Err(e) => format!("undecodable ({})", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::address::FlowData;
    use crate::network::header::testing::udp_ipv4_packet;
    use crate::network::types::{Event, Layer};
    use std::net::{IpAddr, Ipv4Addr};

    #[test]
    fn test_format_network_address() {
        let mut address = Address::new(Layer::Network);
        address.set_outbound();
        address.set_length(60).unwrap();
        assert_eq!(format_address(&address), "packet out if=0.0 len=60");
    }

    #[test]
    fn test_format_flow_address() {
        let mut address = Address::with_event(Layer::Flow, Event::FlowEstablished).unwrap();
        {
            let flow = address.overlay_as_mut::<FlowData>().unwrap();
            flow.process_id = 4242;
            flow.protocol = 6;
            flow.local_port = 50000;
            flow.remote_port = 443;
            flow.set_local_address(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)));
            flow.set_remote_address(IpAddr::V4(Ipv4Addr::new(93, 184, 216, 34)));
        }
        let line = format_address(&address);
        assert!(line.contains("pid=4242"));
        assert!(line.contains("10.0.0.2:50000 -> 93.184.216.34:443"));
    }

    #[test]
    fn test_format_packet() {
        let packet = udp_ipv4_packet(64, 5353, 53);
        let line = format_packet(&packet);
        assert!(line.contains(":5353 -> "));
        assert!(line.contains("proto=17"));
        assert!(format_packet(&[]).starts_with("undecodable"));
    }
}
