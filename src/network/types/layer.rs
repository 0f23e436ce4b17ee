use crate::error::{DivertError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The interception point in the network stack a handle is opened against.
///
/// The discriminants are the driver's `WINDIVERT_LAYER` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[repr(u8)]
pub enum Layer {
    #[default]
    Network = 0,
    NetworkForward = 1,
    Flow = 2,
    Socket = 3,
    Reflect = 4,
}

impl Layer {
    /// All layers in driver order.
    pub const ALL: [Layer; 5] = [
        Layer::Network,
        Layer::NetworkForward,
        Layer::Flow,
        Layer::Socket,
        Layer::Reflect,
    ];

    /// Returns the raw driver value.
    pub fn as_raw(self) -> u8 {
        self as u8
    }

    /// Returns true for the two layers that carry whole IP packets.
    pub fn carries_packets(self) -> bool {
        matches!(self, Layer::Network | Layer::NetworkForward)
    }

    /// The event a freshly created record on this layer reports.
    pub fn default_event(self) -> Event {
        match self {
            Layer::Network | Layer::NetworkForward => Event::NetworkPacket,
            Layer::Flow => Event::FlowEstablished,
            Layer::Socket => Event::SocketBind,
            Layer::Reflect => Event::ReflectOpen,
        }
    }
}

impl TryFrom<u8> for Layer {
    type Error = DivertError;

    fn try_from(raw: u8) -> Result<Self> {
        match raw {
            0 => Ok(Layer::Network),
            1 => Ok(Layer::NetworkForward),
            2 => Ok(Layer::Flow),
            3 => Ok(Layer::Socket),
            4 => Ok(Layer::Reflect),
            other => Err(DivertError::InvalidRecord {
                index: 0,
                reason: format!("unknown layer tag {}", other),
            }),
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Layer::Network => "network",
            Layer::NetworkForward => "network-forward",
            Layer::Flow => "flow",
            Layer::Socket => "socket",
            Layer::Reflect => "reflect",
        };
        f.write_str(name)
    }
}

impl FromStr for Layer {
    type Err = DivertError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "network" => Ok(Layer::Network),
            "network-forward" | "forward" => Ok(Layer::NetworkForward),
            "flow" => Ok(Layer::Flow),
            "socket" => Ok(Layer::Socket),
            "reflect" => Ok(Layer::Reflect),
            _ => Err(DivertError::InvalidConfig(format!("unknown layer '{}'", s))),
        }
    }
}

/// The specific occurrence reported for a captured item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[repr(u8)]
pub enum Event {
    #[default]
    NetworkPacket = 0,
    FlowEstablished = 1,
    FlowDeleted = 2,
    SocketBind = 3,
    SocketConnect = 4,
    SocketListen = 5,
    SocketAccept = 6,
    SocketClose = 7,
    ReflectOpen = 8,
    ReflectClose = 9,
    EthernetFrame = 10,
}

impl Event {
    /// Returns the raw driver value.
    pub fn as_raw(self) -> u8 {
        self as u8
    }

    /// Whether the driver can report this event on `layer`.
    pub fn is_valid_for(self, layer: Layer) -> bool {
        match layer {
            Layer::Network | Layer::NetworkForward => {
                matches!(self, Event::NetworkPacket | Event::EthernetFrame)
            }
            Layer::Flow => matches!(self, Event::FlowEstablished | Event::FlowDeleted),
            Layer::Socket => matches!(
                self,
                Event::SocketBind
                    | Event::SocketConnect
                    | Event::SocketListen
                    | Event::SocketAccept
                    | Event::SocketClose
            ),
            Layer::Reflect => matches!(self, Event::ReflectOpen | Event::ReflectClose),
        }
    }
}

impl TryFrom<u8> for Event {
    type Error = DivertError;

    fn try_from(raw: u8) -> Result<Self> {
        let event = match raw {
            0 => Event::NetworkPacket,
            1 => Event::FlowEstablished,
            2 => Event::FlowDeleted,
            3 => Event::SocketBind,
            4 => Event::SocketConnect,
            5 => Event::SocketListen,
            6 => Event::SocketAccept,
            7 => Event::SocketClose,
            8 => Event::ReflectOpen,
            9 => Event::ReflectClose,
            10 => Event::EthernetFrame,
            other => {
                return Err(DivertError::InvalidRecord {
                    index: 0,
                    reason: format!("unknown event {}", other),
                })
            }
        };
        Ok(event)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Event::NetworkPacket => "packet",
            Event::FlowEstablished => "flow-established",
            Event::FlowDeleted => "flow-deleted",
            Event::SocketBind => "bind",
            Event::SocketConnect => "connect",
            Event::SocketListen => "listen",
            Event::SocketAccept => "accept",
            Event::SocketClose => "close",
            Event::ReflectOpen => "reflect-open",
            Event::ReflectClose => "reflect-close",
            Event::EthernetFrame => "ethernet",
        };
        f.write_str(name)
    }
}

/// Which direction(s) of a handle to shut down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ShutdownMode {
    Recv = 0,
    Send = 1,
    Both = 2,
}

impl ShutdownMode {
    pub fn closes_recv(self) -> bool {
        matches!(self, ShutdownMode::Recv | ShutdownMode::Both)
    }

    pub fn closes_send(self) -> bool {
        matches!(self, ShutdownMode::Send | ShutdownMode::Both)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_raw_round_trip() {
        for layer in Layer::ALL {
            assert_eq!(Layer::try_from(layer.as_raw()).unwrap(), layer);
        }
        assert!(Layer::try_from(5).is_err());
    }

    #[test]
    fn test_layer_from_str() {
        assert_eq!("network".parse::<Layer>().unwrap(), Layer::Network);
        assert_eq!("NETWORK_FORWARD".parse::<Layer>().unwrap(), Layer::NetworkForward);
        assert_eq!("flow".parse::<Layer>().unwrap(), Layer::Flow);
        assert!("ethernet".parse::<Layer>().is_err());
    }

    #[test]
    fn test_flow_layer_events() {
        assert!(Event::FlowEstablished.is_valid_for(Layer::Flow));
        assert!(Event::FlowDeleted.is_valid_for(Layer::Flow));
        assert!(!Event::NetworkPacket.is_valid_for(Layer::Flow));
        assert!(!Event::SocketConnect.is_valid_for(Layer::Flow));
    }

    #[test]
    fn test_default_events_are_valid() {
        for layer in Layer::ALL {
            assert!(layer.default_event().is_valid_for(layer));
        }
    }

    #[test]
    fn test_event_raw_round_trip() {
        for raw in 0..=10u8 {
            assert_eq!(Event::try_from(raw).unwrap().as_raw(), raw);
        }
        assert!(Event::try_from(11).is_err());
    }
}
