//! Bindings to the WinDivert user-mode library.
//!
//! Only compiled on Windows. The library is linked as `WinDivert`; set
//! `WINDIVERT_PATH` at build time to point the linker at it.

use super::{Backend, Driver};
use crate::error::{DivertError, Result};
use crate::network::address::{Address, ADDRESS_SIZE};
use crate::network::filter::FilterError;
use crate::network::header;
use crate::network::types::{ChecksumFlags, Layer, OpenFlags, Param, ShutdownMode};
use log::{debug, info};
use std::ffi::{c_char, c_void, CStr, CString};
use std::ptr;
use windows::Win32::Foundation::{BOOL, HANDLE, INVALID_HANDLE_VALUE};

/// Size of the buffer handed to the filter compiler.
const FILTER_OBJECT_LEN: usize = 8192;

#[link(name = "WinDivert")]
extern "C" {
    fn WinDivertOpen(filter: *const c_char, layer: u32, priority: i16, flags: u64) -> HANDLE;
    fn WinDivertRecvEx(
        handle: HANDLE,
        packet: *mut c_void,
        packet_len: u32,
        recv_len: *mut u32,
        flags: u64,
        addr: *mut Address,
        addr_len: *mut u32,
        overlapped: *mut c_void,
    ) -> BOOL;
    fn WinDivertSendEx(
        handle: HANDLE,
        packet: *const c_void,
        packet_len: u32,
        send_len: *mut u32,
        flags: u64,
        addr: *const Address,
        addr_len: u32,
        overlapped: *mut c_void,
    ) -> BOOL;
    fn WinDivertShutdown(handle: HANDLE, how: u32) -> BOOL;
    fn WinDivertClose(handle: HANDLE) -> BOOL;
    fn WinDivertSetParam(handle: HANDLE, param: u32, value: u64) -> BOOL;
    fn WinDivertGetParam(handle: HANDLE, param: u32, value: *mut u64) -> BOOL;

    fn WinDivertHelperCalcChecksums(
        packet: *mut c_void,
        packet_len: u32,
        addr: *mut Address,
        flags: u64,
    ) -> BOOL;
    fn WinDivertHelperDecrementTTL(packet: *mut c_void, packet_len: u32) -> BOOL;
    fn WinDivertHelperCompileFilter(
        filter: *const c_char,
        layer: u32,
        object: *mut c_char,
        object_len: u32,
        error_str: *mut *const c_char,
        error_pos: *mut u32,
    ) -> BOOL;
    fn WinDivertHelperFormatFilter(
        filter: *const c_char,
        layer: u32,
        buffer: *mut c_char,
        buffer_len: u32,
    ) -> BOOL;
    fn WinDivertHelperEvalFilter(
        filter: *const c_char,
        packet: *const c_void,
        packet_len: u32,
        addr: *const Address,
    ) -> BOOL;
    fn WinDivertHelperHashPacket(packet: *const c_void, packet_len: u32, seed: u64) -> u64;
}

fn last_error() -> DivertError {
    let code = std::io::Error::last_os_error().raw_os_error().unwrap_or(0) as u32;
    DivertError::from_os_code(code)
}

fn c_filter(filter: &str) -> Result<CString> {
    CString::new(filter)
        .map_err(|_| DivertError::from(FilterError::InvalidSyntax("filter contains a NUL byte".into())))
}

fn c_len(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| DivertError::malformed(format!("buffer of {} bytes is too large", len)))
}

/// The raw driver handle. WinDivert handles are safe to use from any thread.
struct RawHandle(HANDLE);

unsafe impl Send for RawHandle {}
unsafe impl Sync for RawHandle {}

/// Opens handles on the installed WinDivert driver.
#[derive(Debug, Clone, Copy, Default)]
pub struct WinDivertBackend;

impl WinDivertBackend {
    pub fn new() -> Self {
        WinDivertBackend
    }
}

impl Backend for WinDivertBackend {
    type Driver = WinDivertDriver;

    fn open(
        &self,
        filter: &str,
        layer: Layer,
        priority: i16,
        flags: OpenFlags,
    ) -> Result<WinDivertDriver> {
        let filter_c = c_filter(filter)?;
        let handle = unsafe {
            WinDivertOpen(
                filter_c.as_ptr(),
                u32::from(layer.as_raw()),
                priority,
                flags.bits(),
            )
        };
        if handle == INVALID_HANDLE_VALUE {
            return Err(last_error());
        }

        info!("WinDivert handle opened on {} layer: {}", layer, filter);
        Ok(WinDivertDriver {
            handle: RawHandle(handle),
            layer,
        })
    }
}

/// One open WinDivert handle.
pub struct WinDivertDriver {
    handle: RawHandle,
    layer: Layer,
}

impl WinDivertDriver {
    /// Stamps per-packet lengths, which the driver leaves to the caller to
    /// recover from the IP headers.
    fn stamp_lengths(&self, buffer: &[u8], addresses: &mut [Address]) -> Result<()> {
        if !self.layer.carries_packets() {
            return Ok(());
        }

        let mut offset = 0;
        for address in addresses {
            let len = header::ip_packet_len(buffer.get(offset..).unwrap_or(&[]))?;
            address.set_length(len)?;
            offset += len;
        }
        Ok(())
    }
}

impl Driver for WinDivertDriver {
    fn recv_ex(&self, buffer: &mut [u8], addresses: &mut [Address]) -> Result<(usize, usize)> {
        let mut recv_len = 0u32;
        let mut addr_len = c_len(addresses.len() * ADDRESS_SIZE)?;
        let ok = unsafe {
            WinDivertRecvEx(
                self.handle.0,
                buffer.as_mut_ptr().cast(),
                c_len(buffer.len())?,
                &mut recv_len,
                0,
                addresses.as_mut_ptr(),
                &mut addr_len,
                ptr::null_mut(),
            )
        };
        if !ok.as_bool() {
            return Err(last_error());
        }

        let bytes = recv_len as usize;
        let events = addr_len as usize / ADDRESS_SIZE;
        self.stamp_lengths(&buffer[..bytes], &mut addresses[..events])?;
        debug!("received {} events ({} bytes)", events, bytes);
        Ok((bytes, events))
    }

    fn send_ex(&self, buffer: &[u8], addresses: &[Address]) -> Result<usize> {
        let mut send_len = 0u32;
        let ok = unsafe {
            WinDivertSendEx(
                self.handle.0,
                buffer.as_ptr().cast(),
                c_len(buffer.len())?,
                &mut send_len,
                0,
                addresses.as_ptr(),
                c_len(addresses.len() * ADDRESS_SIZE)?,
                ptr::null_mut(),
            )
        };
        if !ok.as_bool() {
            return Err(last_error());
        }
        Ok(send_len as usize)
    }

    fn get_param(&self, param: Param) -> Result<u64> {
        let mut value = 0u64;
        let ok = unsafe { WinDivertGetParam(self.handle.0, param as u32, &mut value) };
        if !ok.as_bool() {
            return Err(last_error());
        }
        Ok(value)
    }

    fn set_param(&self, param: Param, value: u64) -> Result<()> {
        let ok = unsafe { WinDivertSetParam(self.handle.0, param as u32, value) };
        if !ok.as_bool() {
            return Err(last_error());
        }
        Ok(())
    }

    fn shutdown(&self, how: ShutdownMode) -> Result<()> {
        let ok = unsafe { WinDivertShutdown(self.handle.0, how as u32) };
        if !ok.as_bool() {
            return Err(last_error());
        }
        Ok(())
    }

    fn close(&self) -> Result<()> {
        let ok = unsafe { WinDivertClose(self.handle.0) };
        if !ok.as_bool() {
            return Err(last_error());
        }
        info!("WinDivert handle closed");
        Ok(())
    }
}

/// Recomputes the checksums of `packet`, updating the checksum flags in
/// `address` when one is given.
pub fn calc_checksums(
    packet: &mut [u8],
    address: Option<&mut Address>,
    flags: ChecksumFlags,
) -> Result<()> {
    let addr = address.map_or(ptr::null_mut(), |a| a as *mut Address);
    let ok = unsafe {
        WinDivertHelperCalcChecksums(
            packet.as_mut_ptr().cast(),
            c_len(packet.len())?,
            addr,
            flags.bits(),
        )
    };
    if !ok.as_bool() {
        return Err(DivertError::malformed("checksum calculation failed"));
    }
    Ok(())
}

/// Decrements the IPv4 TTL or IPv6 hop limit. Returns false once it reaches zero.
pub fn decrement_ttl(packet: &mut [u8]) -> Result<bool> {
    let ok = unsafe { WinDivertHelperDecrementTTL(packet.as_mut_ptr().cast(), c_len(packet.len())?) };
    Ok(ok.as_bool())
}

/// Compiles a filter expression into the driver's object representation.
pub fn compile_filter(filter: &str, layer: Layer) -> Result<String> {
    let filter_c = c_filter(filter)?;
    let mut object = vec![0 as c_char; FILTER_OBJECT_LEN];
    let mut error_str: *const c_char = ptr::null();
    let mut error_pos = 0u32;

    let ok = unsafe {
        WinDivertHelperCompileFilter(
            filter_c.as_ptr(),
            u32::from(layer.as_raw()),
            object.as_mut_ptr(),
            FILTER_OBJECT_LEN as u32,
            &mut error_str,
            &mut error_pos,
        )
    };
    if !ok.as_bool() {
        let message = if error_str.is_null() {
            "unknown error".to_string()
        } else {
            unsafe { CStr::from_ptr(error_str) }.to_string_lossy().into_owned()
        };
        return Err(FilterError::InvalidSyntax(format!("{} at position {}", message, error_pos)).into());
    }

    let compiled = unsafe { CStr::from_ptr(object.as_ptr()) };
    Ok(compiled.to_string_lossy().into_owned())
}

/// Formats a filter expression or compiled object back into readable form.
pub fn format_filter(filter: &str, layer: Layer) -> Result<String> {
    let filter_c = c_filter(filter)?;
    let mut buffer = vec![0 as c_char; FILTER_OBJECT_LEN];
    let ok = unsafe {
        WinDivertHelperFormatFilter(
            filter_c.as_ptr(),
            u32::from(layer.as_raw()),
            buffer.as_mut_ptr(),
            FILTER_OBJECT_LEN as u32,
        )
    };
    if !ok.as_bool() {
        return Err(last_error());
    }
    let formatted = unsafe { CStr::from_ptr(buffer.as_ptr()) };
    Ok(formatted.to_string_lossy().into_owned())
}

/// Evaluates `filter` against a packet and its record without a driver round trip.
pub fn eval_filter(filter: &str, packet: &[u8], address: &Address) -> Result<bool> {
    let filter_c = c_filter(filter)?;
    let ok = unsafe {
        WinDivertHelperEvalFilter(
            filter_c.as_ptr(),
            packet.as_ptr().cast(),
            c_len(packet.len())?,
            address,
        )
    };
    Ok(ok.as_bool())
}

pub fn hash_packet(packet: &[u8], seed: u64) -> Result<u64> {
    Ok(unsafe { WinDivertHelperHashPacket(packet.as_ptr().cast(), c_len(packet.len())?, seed) })
}
