//! Open handle lifecycle.
//!
//! A [`Handle`] owns one driver handle. Receive, send and parameter calls
//! serialize on the handle's lock; [`Handle::shutdown`] deliberately does
//! not, so it can wake a thread blocked in a receive.

use super::batch::{self, Scratch};
use super::config::HandleConfig;
use super::packet_data::Packet;
use crate::error::{DivertError, Result};
use crate::network::address::Address;
use crate::network::driver::Driver;
use crate::network::types::{Layer, OpenFlags, Param, ShutdownMode, Version, BATCH_MAX};
use log::{debug, error, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

pub struct Handle {
    driver: Box<dyn Driver>,
    io: Mutex<Scratch>,
    config: HandleConfig,
    recv_open: AtomicBool,
    send_open: AtomicBool,
    closed: AtomicBool,
}

impl Handle {
    pub(crate) fn new(driver: Box<dyn Driver>, config: HandleConfig) -> Self {
        Handle {
            driver,
            io: Mutex::new(Scratch::new()),
            recv_open: AtomicBool::new(!config.flags.contains(OpenFlags::SEND_ONLY)),
            send_open: AtomicBool::new(!config.flags.contains(OpenFlags::RECV_ONLY)),
            closed: AtomicBool::new(false),
            config,
        }
    }

    pub fn layer(&self) -> Layer {
        self.config.layer
    }

    /// The configuration the handle was opened with.
    pub fn config(&self) -> &HandleConfig {
        &self.config
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Scratch>> {
        self.io
            .lock()
            .map_err(|_| DivertError::lock_poisoned("handle I/O state"))
    }

    fn check_recv(&self) -> Result<()> {
        if self.is_closed() || !self.recv_open.load(Ordering::SeqCst) {
            return Err(DivertError::Disconnected);
        }
        Ok(())
    }

    fn check_send(&self) -> Result<()> {
        if self.is_closed() || !self.send_open.load(Ordering::SeqCst) {
            return Err(DivertError::Disconnected);
        }
        Ok(())
    }

    /// Receives a batch of up to `max_events` events.
    ///
    /// # Arguments
    ///
    /// * `buffer` - Receives the concatenated packet bytes
    /// * `addresses` - Receives one record per event, in arrival order
    /// * `max_events` - Upper bound on the batch, further capped at 255
    ///
    /// # Returns
    ///
    /// * `Ok((bytes_read, events_read))` - Filled prefixes of both buffers
    /// * `Err(DivertError)` - `EmptyBuffer`, `WouldBlock`, `Disconnected`,
    ///   `InvalidRecord` or a driver error; `addresses` is left untouched
    pub fn recv_ex(
        &self,
        buffer: &mut [u8],
        addresses: &mut [Address],
        max_events: usize,
    ) -> Result<(usize, usize)> {
        self.check_recv()?;
        let mut scratch = self.lock()?;
        batch::recv_batch(
            self.driver.as_ref(),
            &mut scratch,
            self.config.layer,
            buffer,
            addresses,
            max_events,
        )
    }

    /// Receives a single event.
    pub fn recv(&self, buffer: &mut [u8]) -> Result<(usize, Address)> {
        let mut slot = [Address::new(self.config.layer)];
        let (bytes, _) = self.recv_ex(buffer, &mut slot, 1)?;
        Ok((bytes, slot[0]))
    }

    /// Receives a batch and copies each entry into an owned [`Packet`].
    pub fn recv_packets(&self, buffer: &mut [u8], max_events: usize) -> Result<Vec<Packet>> {
        let mut addresses = vec![Address::new(self.config.layer); max_events.clamp(1, BATCH_MAX)];
        let (bytes, events) = self.recv_ex(buffer, &mut addresses, max_events)?;
        Ok(batch::packets(&buffer[..bytes], &addresses[..events])
            .map(Packet::from)
            .collect())
    }

    /// Sends a batch, one packet per record.
    pub fn send_ex(&self, packets: &[&[u8]], addresses: &[Address]) -> Result<usize> {
        self.check_send()?;
        let mut scratch = self.lock()?;
        batch::send_batch(
            self.driver.as_ref(),
            &mut scratch,
            self.config.layer,
            packets,
            addresses,
        )
    }

    pub fn send(&self, packet: &[u8], address: &Address) -> Result<usize> {
        self.send_ex(&[packet], std::slice::from_ref(address))
    }

    /// Sends owned packets in batches of at most 255.
    pub fn send_packets(&self, packets: &[Packet]) -> Result<usize> {
        let mut written = 0;
        for chunk in packets.chunks(BATCH_MAX) {
            let data: Vec<&[u8]> = chunk.iter().map(|p| p.data.as_slice()).collect();
            let addresses: Vec<Address> = chunk.iter().map(|p| p.address).collect();
            written += self.send_ex(&data, &addresses)?;
        }
        Ok(written)
    }

    pub fn get_param(&self, param: Param) -> Result<u64> {
        if self.is_closed() {
            return Err(DivertError::Disconnected);
        }
        let _scratch = self.lock()?;
        self.driver.get_param(param)
    }

    /// Sets a queue parameter after checking it against its bounds.
    pub fn set_param(&self, param: Param, value: u64) -> Result<()> {
        param.validate(value)?;
        if self.is_closed() {
            return Err(DivertError::Disconnected);
        }
        let _scratch = self.lock()?;
        self.driver.set_param(param, value)?;
        debug!("set {} to {}", param, value);
        Ok(())
    }

    pub fn version(&self) -> Result<Version> {
        Ok(Version {
            major: self.get_param(Param::VersionMajor)?,
            minor: self.get_param(Param::VersionMinor)?,
        })
    }

    /// Stops receiving, sending or both.
    ///
    /// Pending and later calls in a closed direction fail with
    /// `Disconnected`. Safe to call from any thread while another thread is
    /// blocked in [`Handle::recv_ex`].
    pub fn shutdown(&self, how: ShutdownMode) -> Result<()> {
        if self.is_closed() {
            return Err(DivertError::Disconnected);
        }
        if how.closes_recv() {
            self.recv_open.store(false, Ordering::SeqCst);
        }
        if how.closes_send() {
            self.send_open.store(false, Ordering::SeqCst);
        }
        self.driver.shutdown(how)?;
        debug!("{} handle shut down ({:?})", self.config.layer, how);
        Ok(())
    }

    /// Shuts the handle down, waits for in-flight calls and releases the
    /// driver handle. Calling it again does nothing.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.recv_open.store(false, Ordering::SeqCst);
        self.send_open.store(false, Ordering::SeqCst);

        if let Err(e) = self.driver.shutdown(ShutdownMode::Both) {
            debug!("shutdown before close failed: {}", e);
        }

        let _scratch = self.io.lock().unwrap_or_else(PoisonError::into_inner);
        self.driver.close()?;
        info!("Closed {} handle", self.config.layer);
        Ok(())
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            error!("Error closing handle on drop: {}", e);
        }
    }
}
