//! Core network functionality.
//!
//! This module contains the handle lifecycle (context, configuration and
//! open handles), the batch framing used by every receive and send, and the
//! owned packet type.

pub mod batch;
pub mod config;
pub mod context;
pub mod handle;
pub mod packet_data;

// Re-export commonly used types
pub use batch::{packets, Packets};
pub use config::HandleConfig;
pub use context::Context;
pub use handle::Handle;
pub use packet_data::Packet;
