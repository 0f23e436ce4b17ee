//! Network module for packet and event interception.
//!
//! This module contains components for capturing and reinjecting network
//! traffic through WinDivert: the metadata record, header decoding, the
//! driver boundary, handle lifecycle and user-space filtering.

pub mod address;
pub mod core;
pub mod driver;
pub mod filter;
pub mod header;
pub mod types;
