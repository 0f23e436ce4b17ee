use bitflags::bitflags;

bitflags! {
    /// Per-event flag bits stored in the address record.
    ///
    /// Bit positions are fixed by the driver ABI.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct AddressFlags: u8 {
        /// Packet was sniffed (not diverted)
        const SNIFFED = 1 << 0;
        /// Packet is outbound
        const OUTBOUND = 1 << 1;
        /// Packet is loopback
        const LOOPBACK = 1 << 2;
        /// Packet was injected by another handle
        const IMPOSTOR = 1 << 3;
        /// Packet is IPv6
        const IPV6 = 1 << 4;
        /// IPv4 checksum is valid
        const IP_CHECKSUM = 1 << 5;
        /// TCP checksum is valid
        const TCP_CHECKSUM = 1 << 6;
        /// UDP checksum is valid
        const UDP_CHECKSUM = 1 << 7;
    }
}

bitflags! {
    /// Flags passed when opening a handle.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct OpenFlags: u64 {
        const SNIFF = 1;
        const DROP = 2;
        const DEBUG = 4;
        const RECV_ONLY = 8;
        const SEND_ONLY = 16;
        const NO_INSTALL = 32;
        const FRAGMENTS = 64;
    }
}

bitflags! {
    /// Which checksums the driver helper should leave alone.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ChecksumFlags: u64 {
        const NO_IP_CHECKSUM = 1;
        const NO_ICMP_CHECKSUM = 2;
        const NO_ICMPV6_CHECKSUM = 4;
        const NO_TCP_CHECKSUM = 8;
        const NO_UDP_CHECKSUM = 16;
    }
}
