//! Prelude module for convenient imports.
//!
//! This module re-exports commonly used types and traits from the crate,
//! allowing users to import everything they need with a single use statement:
//!
//! ```rust
//! use divert::prelude::*;
//! ```

// Error handling
pub use crate::error::{DivertError, Result};

// Metadata records
pub use crate::network::address::{
    Address, FlowData, NetworkData, Overlay, ReflectData, SocketData,
};

// Header decoding
pub use crate::network::header::{decode, ParsedHeaders};

// Handle lifecycle
pub use crate::network::core::{packets, Context, Handle, HandleConfig, Packet};

// Driver backends
pub use crate::network::driver::{Backend, Driver, MemoryBackend};
#[cfg(windows)]
pub use crate::network::driver::WinDivertBackend;

// Endpoint filtering
pub use crate::network::filter::{validate_filter, EndpointFilter, IpTrie, PidSet};

// Driver enumerations
pub use crate::network::types::{
    AddressFlags, Event, Layer, OpenFlags, Param, ShutdownMode, Version,
};

// Settings
pub use crate::settings::{FilterSettings, HandleSettings, Settings};
