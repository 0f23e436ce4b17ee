//! # Divert - A user-space client for the WinDivert interception driver
//!
//! Divert opens handles on the WinDivert driver, receives intercepted
//! packets and events in batches, and reinjects packets.
//!
//! ## Features
//!
//! * Metadata records - The driver's 80 byte address record with typed
//!   access to its flags and layer-specific overlay
//! * Header decoding - Zero-copy IPv4, IPv6, ICMP, ICMPv6, TCP and UDP views
//! * Batched I/O - Up to 255 packets or events per driver call
//! * Endpoint filtering - Concurrent process ID sets and a CIDR trie
//!
//! ## Architecture
//!
//! Every handle is opened through a [`Context`](network::core::Context),
//! which checks the driver version once. The driver itself sits behind the
//! [`Driver`](network::driver::Driver) trait, with a WinDivert backend on
//! Windows and an in-memory backend for tests and other platforms.
//!
//! ## Quick Start
//!
//! ```rust
//! use divert::prelude::*;
//!
//! let context = Context::new(MemoryBackend::new())?;
//! let handle = context.open(HandleConfig::with_filter("udp").sniff())?;
//! assert_eq!(handle.layer(), Layer::Network);
//! handle.close()?;
//! # Ok::<(), DivertError>(())
//! ```

/// Centralized error handling
pub mod error;
/// Packet and event interception
pub mod network;
/// Prelude for convenient imports
pub mod prelude;
/// Settings shared by the command line and the settings file
pub mod settings;
/// Shared utility functions
pub mod utils;

// Re-export commonly used types
pub use error::{DivertError, Result};
