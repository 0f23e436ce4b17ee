//! User-space filtering: process ID sets, address prefix tries and
//! filter-expression checks.

pub mod expression;
pub mod ip_trie;
pub mod pid_set;

pub use expression::{validate_filter, validate_filter_with_docs, FilterError};
pub use ip_trie::IpTrie;
pub use pid_set::PidSet;

use crate::network::address::Address;
use std::net::IpAddr;

/// Combines a [`PidSet`] and an [`IpTrie`] into one policy question for
/// Flow and Socket events.
///
/// An empty set or trie places no restriction on its dimension.
#[derive(Debug, Default)]
pub struct EndpointFilter {
    pids: PidSet,
    remotes: IpTrie,
}

impl EndpointFilter {
    pub fn new(pids: PidSet, remotes: IpTrie) -> Self {
        EndpointFilter { pids, remotes }
    }

    pub fn pids(&self) -> &PidSet {
        &self.pids
    }

    pub fn remotes(&self) -> &IpTrie {
        &self.remotes
    }

    pub fn allows(&self, process_id: u32, remote: IpAddr) -> bool {
        (self.pids.is_empty() || self.pids.contains(process_id))
            && (self.remotes.is_empty() || self.remotes.contains(remote))
    }

    /// Whether the event described by `address` is of interest. Records on
    /// layers without endpoint data never match.
    pub fn matches(&self, address: &Address) -> bool {
        if let Some(flow) = address.flow() {
            return self.allows(flow.process_id, flow.remote_address());
        }
        if let Some(socket) = address.socket() {
            return self.allows(socket.process_id, socket.remote_address());
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::address::FlowData;
    use crate::network::types::Layer;
    use std::net::Ipv4Addr;

    fn flow(pid: u32, remote: Ipv4Addr) -> Address {
        let mut address = Address::new(Layer::Flow);
        let data = address.overlay_as_mut::<FlowData>().unwrap();
        data.process_id = pid;
        data.set_remote_address(IpAddr::V4(remote));
        address
    }

    #[test]
    fn test_empty_filter_matches_all_endpoints() {
        let filter = EndpointFilter::default();
        assert!(filter.matches(&flow(1, Ipv4Addr::new(1, 1, 1, 1))));
        assert!(!filter.matches(&Address::default()));
    }

    #[test]
    fn test_pid_and_remote_restrictions() {
        let pids: PidSet = [100].into_iter().collect();
        let remotes = IpTrie::new();
        remotes.insert_cidr("10.0.0.0/8").unwrap();
        let filter = EndpointFilter::new(pids, remotes);

        assert!(filter.matches(&flow(100, Ipv4Addr::new(10, 9, 8, 7))));
        assert!(!filter.matches(&flow(101, Ipv4Addr::new(10, 9, 8, 7))));
        assert!(!filter.matches(&flow(100, Ipv4Addr::new(11, 0, 0, 1))));
    }

    #[test]
    fn test_socket_events_use_socket_overlay() {
        let filter = EndpointFilter::new([7].into_iter().collect(), IpTrie::new());
        let mut address = Address::new(Layer::Socket);
        address
            .overlay_as_mut::<crate::network::address::SocketData>()
            .unwrap()
            .process_id = 7;
        assert!(filter.matches(&address));
    }
}
