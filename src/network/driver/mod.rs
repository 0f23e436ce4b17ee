//! The boundary between this crate and the interception driver.
//!
//! [`Backend`] opens handles and [`Driver`] is one open handle. Everything
//! above this module (batch framing, handle lifecycle) is written against
//! these traits, so it runs unchanged on the real WinDivert driver or on the
//! in-process [`MemoryBackend`].

pub mod memory;
#[cfg(windows)]
pub mod windivert;

pub use memory::{MemoryBackend, MemoryDriver};
#[cfg(windows)]
pub use windivert::{WinDivertBackend, WinDivertDriver};

use crate::error::Result;
use crate::network::address::Address;
use crate::network::types::{Layer, OpenFlags, Param, ShutdownMode};

/// One open driver handle.
///
/// Methods take `&self` so that `shutdown` can be called while another
/// thread is blocked in `recv_ex`. Errors are already mapped through
/// [`DivertError::from_os_code`](crate::error::DivertError::from_os_code).
pub trait Driver: Send + Sync {
    /// Receives up to `addresses.len()` events.
    ///
    /// Packet bytes are concatenated into `buffer` and one record per event is
    /// written to the front of `addresses`. Returns `(bytes_read, events_read)`.
    fn recv_ex(&self, buffer: &mut [u8], addresses: &mut [Address]) -> Result<(usize, usize)>;

    /// Injects the concatenated packets in `buffer`, one per record.
    /// Returns the number of bytes written.
    fn send_ex(&self, buffer: &[u8], addresses: &[Address]) -> Result<usize>;

    fn get_param(&self, param: Param) -> Result<u64>;

    fn set_param(&self, param: Param, value: u64) -> Result<()>;

    fn shutdown(&self, how: ShutdownMode) -> Result<()>;

    fn close(&self) -> Result<()>;
}

/// Opens driver handles.
pub trait Backend {
    type Driver: Driver + 'static;

    fn open(
        &self,
        filter: &str,
        layer: Layer,
        priority: i16,
        flags: OpenFlags,
    ) -> Result<Self::Driver>;
}
