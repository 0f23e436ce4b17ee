use crate::error::{DivertError, Result};
use std::net::IpAddr;
use std::sync::{PoisonError, RwLock};

const V4_ROOT: u32 = 0;
const V6_ROOT: u32 = 1;

#[derive(Debug, Clone, Copy, Default)]
struct Node {
    children: [Option<u32>; 2],
    is_leaf: bool,
}

#[derive(Debug)]
struct Arena {
    nodes: Vec<Node>,
    prefixes: usize,
}

impl Default for Arena {
    fn default() -> Self {
        Arena {
            nodes: vec![Node::default(), Node::default()],
            prefixes: 0,
        }
    }
}

/// Binary trie answering "is this address inside any stored prefix".
///
/// Nodes live in one arena and are addressed by index; IPv4 and IPv6 have
/// separate roots. Lookup succeeds at the first stored prefix on the path,
/// so a shorter prefix shadows every longer prefix beneath it. The trie is
/// append-only.
#[derive(Debug, Default)]
pub struct IpTrie {
    arena: RwLock<Arena>,
}

/// Root, octets and bit width used to walk the trie for `addr`. IPv4
/// octets occupy the first four bytes.
fn key(addr: IpAddr) -> (u32, [u8; 16], u8) {
    let v4_key = |octets: [u8; 4]| {
        let mut bytes = [0u8; 16];
        bytes[..4].copy_from_slice(&octets);
        (V4_ROOT, bytes, 32)
    };
    match addr {
        IpAddr::V4(v4) => v4_key(v4.octets()),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => v4_key(v4.octets()),
            None => (V6_ROOT, v6.octets(), 128),
        },
    }
}

fn bit(octets: &[u8], index: usize) -> usize {
    usize::from((octets[index / 8] >> (7 - index % 8)) & 1)
}

impl IpTrie {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a single host address.
    pub fn insert(&self, addr: IpAddr) {
        let (_, _, width) = key(addr);
        self.insert_bits(addr, width);
    }

    /// Stores the first `prefix_len` bits of `addr` as a prefix.
    pub fn insert_prefix(&self, addr: IpAddr, prefix_len: u8) -> Result<()> {
        let (_, _, width) = key(addr);
        if prefix_len > width {
            return Err(DivertError::InvalidConfig(format!(
                "prefix length {} exceeds {} bits for {}",
                prefix_len, width, addr
            )));
        }
        self.insert_bits(addr, prefix_len);
        Ok(())
    }

    /// Stores a range written as `addr/len`, or a bare address.
    pub fn insert_cidr(&self, cidr: &str) -> Result<()> {
        let cidr = cidr.trim();
        let (addr, prefix_len) = match cidr.split_once('/') {
            Some((addr, len)) => {
                let len = len.trim().parse::<u8>().map_err(|_| {
                    DivertError::InvalidConfig(format!("invalid prefix length in '{}'", cidr))
                })?;
                (addr.trim(), Some(len))
            }
            None => (cidr, None),
        };

        let addr: IpAddr = addr
            .parse()
            .map_err(|_| DivertError::InvalidConfig(format!("invalid address in '{}'", cidr)))?;

        match prefix_len {
            Some(len) => self.insert_prefix(addr, len),
            None => {
                self.insert(addr);
                Ok(())
            }
        }
    }

    pub fn contains(&self, addr: IpAddr) -> bool {
        let (root, octets, width) = key(addr);
        let arena = self.arena.read().unwrap_or_else(PoisonError::into_inner);

        let mut current = root;
        for index in 0..usize::from(width) {
            let node = &arena.nodes[current as usize];
            if node.is_leaf {
                return true;
            }
            match node.children[bit(&octets, index)] {
                Some(next) => current = next,
                None => return false,
            }
        }
        arena.nodes[current as usize].is_leaf
    }

    /// Number of distinct prefixes stored.
    pub fn len(&self) -> usize {
        self.arena
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .prefixes
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert_bits(&self, addr: IpAddr, prefix_len: u8) {
        let (root, octets, _) = key(addr);
        let mut guard = self.arena.write().unwrap_or_else(PoisonError::into_inner);
        let arena = &mut *guard;

        let mut current = root as usize;
        for index in 0..usize::from(prefix_len) {
            let side = bit(&octets, index);
            let existing = arena.nodes[current].children[side];
            current = match existing {
                Some(next) => next as usize,
                None => {
                    let next = arena.nodes.len();
                    arena.nodes.push(Node::default());
                    arena.nodes[current].children[side] = Some(next as u32);
                    next
                }
            };
        }
        if !arena.nodes[current].is_leaf {
            arena.nodes[current].is_leaf = true;
            arena.prefixes += 1;
        }
    }
}
