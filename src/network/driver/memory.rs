use super::{Backend, Driver};
use crate::error::{codes, DivertError, Result};
use crate::network::address::Address;
use crate::network::types::{Layer, OpenFlags, Param, ShutdownMode};
use log::debug;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

/// Arguments a handle was opened with, recorded for inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenRequest {
    pub filter: String,
    pub layer: Layer,
    pub priority: i16,
    pub flags: OpenFlags,
}

#[derive(Default)]
struct QueueState {
    inbound: VecDeque<(Vec<u8>, Address)>,
    outbound: Vec<(Vec<u8>, Address)>,
    opened: Vec<OpenRequest>,
    fail_open: Option<u32>,
    fail_recv: Option<u32>,
    fail_send: Option<u32>,
}

#[derive(Default)]
struct MemoryQueue {
    state: Mutex<QueueState>,
    ready: Condvar,
}

impl MemoryQueue {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// In-process stand-in for the kernel driver.
///
/// Every handle opened from one backend (and its clones) shares a single
/// inbound queue and a single outbound log. A handle only receives events
/// whose layer matches its own, and a handle opened with the filter
/// `"false"` never receives anything.
#[derive(Clone)]
pub struct MemoryBackend {
    queue: Arc<MemoryQueue>,
    version: (u64, u64),
    blocking: bool,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        MemoryBackend {
            queue: Arc::new(MemoryQueue::default()),
            version: (2, 2),
            blocking: true,
        }
    }

    /// Reports `major.minor` through the version parameters.
    pub fn with_version(mut self, major: u64, minor: u64) -> Self {
        self.version = (major, minor);
        self
    }

    /// Handles opened after this call return `WouldBlock` instead of waiting.
    pub fn non_blocking(mut self) -> Self {
        self.blocking = false;
        self
    }

    /// Queues a packet for delivery, stamping its length into the record.
    pub fn inject(&self, packet: &[u8], mut address: Address) -> Result<()> {
        address.set_length(packet.len())?;
        self.inject_raw(packet.to_vec(), address);
        Ok(())
    }

    /// Queues a packet and record exactly as given.
    pub fn inject_raw(&self, packet: Vec<u8>, address: Address) {
        self.queue.lock().inbound.push_back((packet, address));
        self.queue.ready.notify_all();
    }

    /// Drains and returns everything sent so far, in send order.
    pub fn take_sent(&self) -> Vec<(Vec<u8>, Address)> {
        std::mem::take(&mut self.queue.lock().outbound)
    }

    pub fn pending(&self) -> usize {
        self.queue.lock().inbound.len()
    }

    pub fn opened(&self) -> Vec<OpenRequest> {
        self.queue.lock().opened.clone()
    }

    /// Makes the next `open` fail with the given OS error code.
    pub fn fail_next_open(&self, code: u32) {
        self.queue.lock().fail_open = Some(code);
    }

    /// Makes the next receive on any handle fail with the given OS error code.
    pub fn fail_next_recv(&self, code: u32) {
        self.queue.lock().fail_recv = Some(code);
    }

    /// Makes the next send on any handle fail with the given OS error code.
    pub fn fail_next_send(&self, code: u32) {
        self.queue.lock().fail_send = Some(code);
    }
}

impl Backend for MemoryBackend {
    type Driver = MemoryDriver;

    fn open(
        &self,
        filter: &str,
        layer: Layer,
        priority: i16,
        flags: OpenFlags,
    ) -> Result<MemoryDriver> {
        let mut state = self.queue.lock();
        if let Some(code) = state.fail_open.take() {
            return Err(DivertError::from_os_code(code));
        }
        state.opened.push(OpenRequest {
            filter: filter.to_string(),
            layer,
            priority,
            flags,
        });
        drop(state);

        let mut params = [0u64; 5];
        for param in [Param::QueueLength, Param::QueueTime, Param::QueueSize] {
            params[param.index()] = param.default_value();
        }
        params[Param::VersionMajor.index()] = self.version.0;
        params[Param::VersionMinor.index()] = self.version.1;

        debug!("memory driver opened on {} layer with filter '{}'", layer, filter);

        Ok(MemoryDriver {
            queue: Arc::clone(&self.queue),
            layer,
            delivers: filter.trim() != "false",
            blocking: self.blocking,
            params: Mutex::new(params),
            recv_shut: AtomicBool::new(false),
            send_shut: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        })
    }
}

/// One handle opened on a [`MemoryBackend`].
pub struct MemoryDriver {
    queue: Arc<MemoryQueue>,
    layer: Layer,
    delivers: bool,
    blocking: bool,
    params: Mutex<[u64; 5]>,
    recv_shut: AtomicBool,
    send_shut: AtomicBool,
    closed: AtomicBool,
}

impl MemoryDriver {
    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DivertError::from_os_code(codes::ERROR_INVALID_HANDLE));
        }
        Ok(())
    }

    /// Moves as many matching events as fit into the caller's buffers.
    fn drain_into(
        &self,
        state: &mut QueueState,
        buffer: &mut [u8],
        addresses: &mut [Address],
    ) -> Result<(usize, usize)> {
        let mut bytes = 0;
        let mut events = 0;
        let mut index = 0;

        while index < state.inbound.len() && events < addresses.len() {
            let (packet, address) = &state.inbound[index];
            if !self.delivers || address.raw_layer() != self.layer.as_raw() {
                index += 1;
                continue;
            }
            if bytes + packet.len() > buffer.len() {
                if events == 0 {
                    return Err(DivertError::from_os_code(codes::ERROR_INSUFFICIENT_BUFFER));
                }
                break;
            }

            if let Some((packet, address)) = state.inbound.remove(index) {
                buffer[bytes..bytes + packet.len()].copy_from_slice(&packet);
                addresses[events] = address;
                bytes += packet.len();
                events += 1;
            }
        }

        Ok((bytes, events))
    }
}

impl Driver for MemoryDriver {
    fn recv_ex(&self, buffer: &mut [u8], addresses: &mut [Address]) -> Result<(usize, usize)> {
        self.check_open()?;
        let mut state = self.queue.lock();

        loop {
            if self.recv_shut.load(Ordering::SeqCst) {
                return Err(DivertError::from_os_code(codes::ERROR_NO_DATA));
            }
            if let Some(code) = state.fail_recv.take() {
                return Err(DivertError::from_os_code(code));
            }

            let (bytes, events) = self.drain_into(&mut state, buffer, addresses)?;
            if events > 0 {
                return Ok((bytes, events));
            }
            if !self.blocking {
                return Err(DivertError::from_os_code(codes::WSAEWOULDBLOCK));
            }

            state = self
                .queue
                .ready
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn send_ex(&self, buffer: &[u8], addresses: &[Address]) -> Result<usize> {
        self.check_open()?;
        if self.send_shut.load(Ordering::SeqCst) {
            return Err(DivertError::from_os_code(codes::ERROR_NO_DATA));
        }

        let mut state = self.queue.lock();
        if let Some(code) = state.fail_send.take() {
            return Err(DivertError::from_os_code(code));
        }

        let total: usize = addresses.iter().map(Address::length).sum();
        if total != buffer.len() {
            return Err(DivertError::from_os_code(codes::ERROR_INVALID_PARAMETER));
        }

        let mut offset = 0;
        for address in addresses {
            let end = offset + address.length();
            state.outbound.push((buffer[offset..end].to_vec(), *address));
            offset = end;
        }
        Ok(offset)
    }

    fn get_param(&self, param: Param) -> Result<u64> {
        self.check_open()?;
        let params = self.params.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(params[param.index()])
    }

    fn set_param(&self, param: Param, value: u64) -> Result<()> {
        self.check_open()?;
        if param.validate(value).is_err() {
            return Err(DivertError::from_os_code(codes::ERROR_INVALID_PARAMETER));
        }
        let mut params = self.params.lock().unwrap_or_else(PoisonError::into_inner);
        params[param.index()] = value;
        Ok(())
    }

    fn shutdown(&self, how: ShutdownMode) -> Result<()> {
        self.check_open()?;
        {
            // Flip the flags under the queue lock so a receiver cannot miss the wakeup.
            let _state = self.queue.lock();
            if how.closes_recv() {
                self.recv_shut.store(true, Ordering::SeqCst);
            }
            if how.closes_send() {
                self.send_shut.store(true, Ordering::SeqCst);
            }
        }
        self.queue.ready.notify_all();
        Ok(())
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(DivertError::from_os_code(codes::ERROR_INVALID_HANDLE));
        }
        {
            let _state = self.queue.lock();
            self.recv_shut.store(true, Ordering::SeqCst);
            self.send_shut.store(true, Ordering::SeqCst);
        }
        self.queue.ready.notify_all();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    fn open(backend: &MemoryBackend, layer: Layer) -> MemoryDriver {
        backend.open("true", layer, 0, OpenFlags::SNIFF).unwrap()
    }

    #[test]
    fn test_inject_then_receive() {
        let backend = MemoryBackend::new();
        let driver = open(&backend, Layer::Network);
        backend.inject(&[0x45; 30], Address::default()).unwrap();
        backend.inject(&[0x45; 40], Address::default()).unwrap();

        let mut buffer = [0u8; 100];
        let mut addresses = [Address::default(); 4];
        let (bytes, events) = driver.recv_ex(&mut buffer, &mut addresses).unwrap();
        assert_eq!((bytes, events), (70, 2));
        assert_eq!(addresses[0].length(), 30);
        assert_eq!(addresses[1].length(), 40);
        assert_eq!(backend.pending(), 0);
    }

    #[test]
    fn test_receive_skips_other_layers() {
        let backend = MemoryBackend::new().non_blocking();
        let driver = open(&backend, Layer::Flow);
        backend.inject(&[0x45; 20], Address::default()).unwrap();

        let mut buffer = [0u8; 64];
        let mut addresses = [Address::default(); 1];
        assert!(matches!(
            driver.recv_ex(&mut buffer, &mut addresses),
            Err(DivertError::WouldBlock)
        ));
        assert_eq!(backend.pending(), 1);
    }

    #[test]
    fn test_false_filter_never_delivers() {
        let backend = MemoryBackend::new().non_blocking();
        let driver = backend.open("false", Layer::Network, 0, OpenFlags::empty()).unwrap();
        backend.inject(&[0x45; 20], Address::default()).unwrap();

        let mut buffer = [0u8; 64];
        let mut addresses = [Address::default(); 1];
        assert!(driver.recv_ex(&mut buffer, &mut addresses).is_err());
        assert_eq!(backend.opened()[0].filter, "false");
    }

    #[test]
    fn test_small_buffer_reports_insufficient_space() {
        let backend = MemoryBackend::new();
        let driver = open(&backend, Layer::Network);
        backend.inject(&[0x45; 40], Address::default()).unwrap();

        let mut buffer = [0u8; 39];
        let mut addresses = [Address::default(); 1];
        match driver.recv_ex(&mut buffer, &mut addresses) {
            Err(DivertError::Driver(code)) => assert_eq!(code, codes::ERROR_INSUFFICIENT_BUFFER),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_shutdown_unblocks_receiver() {
        let backend = MemoryBackend::new();
        let driver = Arc::new(open(&backend, Layer::Network));

        let receiver = {
            let driver = Arc::clone(&driver);
            thread::spawn(move || {
                let mut buffer = [0u8; 64];
                let mut addresses = [Address::default(); 1];
                driver.recv_ex(&mut buffer, &mut addresses)
            })
        };

        thread::sleep(Duration::from_millis(50));
        driver.shutdown(ShutdownMode::Recv).unwrap();
        assert!(matches!(
            receiver.join().unwrap(),
            Err(DivertError::Disconnected)
        ));
    }

    #[test]
    fn test_send_records_packets_and_faults() {
        let backend = MemoryBackend::new();
        let driver = open(&backend, Layer::Network);

        let mut first = Address::default();
        first.set_length(3).unwrap();
        let mut second = Address::default();
        second.set_length(2).unwrap();

        assert_eq!(driver.send_ex(&[1, 2, 3, 4, 5], &[first, second]).unwrap(), 5);
        let sent = backend.take_sent();
        assert_eq!(sent[0].0, vec![1, 2, 3]);
        assert_eq!(sent[1].0, vec![4, 5]);

        backend.fail_next_send(codes::ERROR_HOST_UNREACHABLE);
        assert!(matches!(
            driver.send_ex(&[1, 2, 3], &[first]),
            Err(DivertError::HostUnreachable)
        ));
        assert!(driver.send_ex(&[1, 2, 3], &[first]).is_ok());
    }

    #[test]
    fn test_params_and_version() {
        let backend = MemoryBackend::new().with_version(2, 1);
        let driver = open(&backend, Layer::Network);
        assert_eq!(driver.get_param(Param::VersionMajor).unwrap(), 2);
        assert_eq!(driver.get_param(Param::VersionMinor).unwrap(), 1);
        assert_eq!(driver.get_param(Param::QueueLength).unwrap(), 512);

        driver.set_param(Param::QueueLength, 1024).unwrap();
        assert_eq!(driver.get_param(Param::QueueLength).unwrap(), 1024);
        assert!(driver.set_param(Param::VersionMajor, 3).is_err());
    }

    #[test]
    fn test_closed_driver_is_disconnected() {
        let backend = MemoryBackend::new();
        let driver = open(&backend, Layer::Network);
        driver.close().unwrap();
        assert!(matches!(
            driver.get_param(Param::QueueTime),
            Err(DivertError::Disconnected)
        ));
        assert!(driver.close().is_err());
    }
}
