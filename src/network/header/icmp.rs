use super::{be16, be32};

pub const ICMP_HEADER_LEN: usize = 8;

macro_rules! icmp_view {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct $name<'a>(&'a [u8]);

        impl<'a> $name<'a> {
            /// Returns `None` when `data` cannot hold the 8 byte header.
            pub fn new(data: &'a [u8]) -> Option<Self> {
                data.get(..ICMP_HEADER_LEN).map($name)
            }

            pub fn msg_type(&self) -> u8 {
                self.0[0]
            }

            pub fn code(&self) -> u8 {
                self.0[1]
            }

            pub fn checksum(&self) -> u16 {
                be16(self.0, 2)
            }

            /// The type-specific second word (identifier/sequence for echo).
            pub fn rest_of_header(&self) -> u32 {
                be32(self.0, 4)
            }

            pub fn as_bytes(&self) -> &'a [u8] {
                self.0
            }
        }
    };
}

icmp_view! {
    /// Borrowed view of an ICMP (IPv4) header.
    IcmpHeader
}

icmp_view! {
    /// Borrowed view of an ICMPv6 header.
    Icmpv6Header
}
