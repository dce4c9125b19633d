//! Mock serial port and backend for testing.
//!
//! Provides a `MockSerialPort` that simulates serial port behavior without
//! requiring actual hardware, and a `MockBackend` that hands those ports out
//! by name the way the host serial subsystem would. Ports can be cross-wired
//! into loopback pairs and told to fail in specific ways.

use super::backend::PortBackend;
use super::error::PortError;
use super::traits::{PortConfig, SerialPortAdapter};
use crate::enumerator::{DeviceClass, PortDescriptor};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Granularity of the simulated blocking read.
const POLL_STEP: Duration = Duration::from_millis(1);

/// Inner state of the mock port, shared between clones.
#[derive(Debug, Default)]
struct MockPortState {
    /// Bytes waiting to be returned by read operations.
    read_queue: VecDeque<u8>,
    /// Log of all payloads accepted by write operations.
    write_log: Vec<Vec<u8>>,
    /// Configured timeout duration.
    timeout: Duration,
    /// Whether buffers have been cleared.
    buffers_cleared: bool,
    /// Accept at most this many bytes per write.
    write_limit: Option<usize>,
    /// Fail the next write with an I/O error.
    fail_next_write: bool,
    /// Fail the next read with an I/O error.
    fail_next_read: bool,
    /// Fail the next flush with an I/O error.
    fail_next_flush: bool,
    /// Number of successful flushes.
    flush_count: usize,
}

/// Mock serial port implementation for testing.
///
/// # Example
/// ```
/// use serial_assistant::port::{MockSerialPort, SerialPortAdapter};
///
/// let mut port = MockSerialPort::new("MOCK0");
/// port.enqueue_read(b"Hello, World!");
///
/// let mut buffer = [0u8; 13];
/// let n = port.read_bytes(&mut buffer).unwrap();
/// assert_eq!(&buffer[..n], b"Hello, World!");
///
/// port.write_bytes(b"Response").unwrap();
/// assert_eq!(port.get_write_log(), vec![b"Response".to_vec()]);
/// ```
#[derive(Clone)]
pub struct MockSerialPort {
    /// The port name/identifier.
    name: String,
    /// The internal state, shared by every clone of this port.
    state: Arc<Mutex<MockPortState>>,
    /// Receive queue of the other end when cross-wired.
    peer: Option<Arc<Mutex<MockPortState>>>,
}

impl MockSerialPort {
    /// Create a new mock serial port with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(MockPortState {
                timeout: Duration::from_millis(100),
                ..Default::default()
            })),
            peer: None,
        }
    }

    /// Create two ports whose TX lines feed each other's RX.
    pub fn pair(a: impl Into<String>, b: impl Into<String>) -> (Self, Self) {
        let mut first = Self::new(a);
        let mut second = Self::new(b);
        first.peer = Some(Arc::clone(&second.state));
        second.peer = Some(Arc::clone(&first.state));
        (first, second)
    }

    /// Create a port whose TX is wired back into its own RX.
    pub fn loopback(name: impl Into<String>) -> Self {
        let mut port = Self::new(name);
        port.peer = Some(Arc::clone(&port.state));
        port
    }

    /// Enqueue bytes to be returned by subsequent read operations.
    pub fn enqueue_read(&mut self, data: &[u8]) {
        self.state.lock().read_queue.extend(data);
    }

    /// Get a copy of all data written to the port.
    pub fn get_write_log(&self) -> Vec<Vec<u8>> {
        self.state.lock().write_log.clone()
    }

    /// All written bytes, concatenated.
    pub fn written_bytes(&self) -> Vec<u8> {
        self.state.lock().write_log.concat()
    }

    /// Clear the write log.
    pub fn clear_write_log(&mut self) {
        self.state.lock().write_log.clear();
    }

    /// Accept at most `limit` bytes per write call.
    pub fn set_write_limit(&mut self, limit: Option<usize>) {
        self.state.lock().write_limit = limit;
    }

    /// Make the next write fail with an I/O error.
    pub fn fail_next_write(&mut self) {
        self.state.lock().fail_next_write = true;
    }

    /// Make the next read fail with an I/O error.
    pub fn fail_next_read(&mut self) {
        self.state.lock().fail_next_read = true;
    }

    /// Make the next flush (and therefore close) fail.
    pub fn fail_next_flush(&mut self) {
        self.state.lock().fail_next_flush = true;
    }

    /// Get whether buffers have been cleared since the last reset.
    pub fn was_cleared(&self) -> bool {
        self.state.lock().buffers_cleared
    }

    /// Number of successful flushes so far.
    pub fn flush_count(&self) -> usize {
        self.state.lock().flush_count
    }

    /// Current read timeout.
    pub fn timeout(&self) -> Duration {
        self.state.lock().timeout
    }

    /// Get the number of bytes available to read.
    pub fn available_bytes(&self) -> usize {
        self.state.lock().read_queue.len()
    }
}

impl SerialPortAdapter for MockSerialPort {
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError> {
        let accepted = {
            let mut state = self.state.lock();
            if std::mem::take(&mut state.fail_next_write) {
                return Err(PortError::Io(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "simulated write failure",
                )));
            }
            let n = state.write_limit.map_or(data.len(), |limit| limit.min(data.len()));
            state.write_log.push(data[..n].to_vec());
            n
        };

        if let Some(peer) = &self.peer {
            peer.lock().read_queue.extend(&data[..accepted]);
        }
        Ok(accepted)
    }

    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, PortError> {
        let deadline = Instant::now() + self.state.lock().timeout;
        loop {
            {
                let mut state = self.state.lock();
                if std::mem::take(&mut state.fail_next_read) {
                    return Err(PortError::Io(std::io::Error::new(
                        std::io::ErrorKind::BrokenPipe,
                        "simulated read failure",
                    )));
                }
                if !state.read_queue.is_empty() {
                    let n = buffer.len().min(state.read_queue.len());
                    for (slot, byte) in buffer.iter_mut().zip(state.read_queue.drain(..n)) {
                        *slot = byte;
                    }
                    return Ok(n);
                }
            }
            if Instant::now() >= deadline {
                return Err(PortError::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "Operation timed out",
                )));
            }
            thread::sleep(POLL_STEP);
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), PortError> {
        self.state.lock().timeout = timeout;
        Ok(())
    }

    fn clear_buffers(&mut self) -> Result<(), PortError> {
        let mut state = self.state.lock();
        state.read_queue.clear();
        state.buffers_cleared = true;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), PortError> {
        let mut state = self.state.lock();
        if std::mem::take(&mut state.fail_next_flush) {
            return Err(PortError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "simulated flush failure",
            )));
        }
        state.flush_count += 1;
        Ok(())
    }
}

impl std::fmt::Debug for MockSerialPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockSerialPort")
            .field("name", &self.name)
            .field("available_bytes", &self.available_bytes())
            .field("wired", &self.peer.is_some())
            .finish()
    }
}

/// How a registered mock device answers an open request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpenBehavior {
    Available,
    Busy,
    Denied,
}

#[derive(Debug)]
struct MockDevice {
    port: MockSerialPort,
    class: DeviceClass,
    behavior: OpenBehavior,
    open_delay: Duration,
}

/// In-memory stand-in for the host serial subsystem.
///
/// Opening a registered name hands out a clone of its `MockSerialPort`, so
/// the test keeps a handle that observes everything the session does.
#[derive(Debug, Default)]
pub struct MockBackend {
    devices: Mutex<HashMap<String, MockDevice>>,
    enumeration_broken: Mutex<bool>,
    opened: Mutex<Vec<PortConfig>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device and return the handle tests use to drive it.
    pub fn add_port(&self, name: &str, class: DeviceClass) -> MockSerialPort {
        let port = MockSerialPort::new(name);
        self.insert(port.clone(), class);
        port
    }

    /// Register two devices cross-wired to each other.
    pub fn add_pair(&self, a: &str, b: &str) -> (MockSerialPort, MockSerialPort) {
        let (first, second) = MockSerialPort::pair(a, b);
        self.insert(first.clone(), DeviceClass::Usb);
        self.insert(second.clone(), DeviceClass::Usb);
        (first, second)
    }

    /// Register an already-built mock port.
    pub fn insert(&self, port: MockSerialPort, class: DeviceClass) {
        self.devices.lock().insert(
            port.name.clone(),
            MockDevice {
                port,
                class,
                behavior: OpenBehavior::Available,
                open_delay: Duration::ZERO,
            },
        );
    }

    /// Pretend another process holds `name` exclusively.
    pub fn mark_busy(&self, name: &str) {
        self.set_behavior(name, OpenBehavior::Busy);
    }

    /// Pretend the host denies access to `name`.
    pub fn deny_access(&self, name: &str) {
        self.set_behavior(name, OpenBehavior::Denied);
    }

    /// Make opening `name` take `delay`, like a slow USB-CDC or Bluetooth link.
    pub fn delay_open(&self, name: &str, delay: Duration) {
        if let Some(device) = self.devices.lock().get_mut(name) {
            device.open_delay = delay;
        }
    }

    /// Unplug a device.
    pub fn remove_port(&self, name: &str) {
        self.devices.lock().remove(name);
    }

    /// Make enumeration fail as if the device subsystem were unreachable.
    pub fn break_enumeration(&self) {
        *self.enumeration_broken.lock() = true;
    }

    /// Configs of every successful open, in order.
    pub fn open_log(&self) -> Vec<PortConfig> {
        self.opened.lock().clone()
    }

    fn set_behavior(&self, name: &str, behavior: OpenBehavior) {
        if let Some(device) = self.devices.lock().get_mut(name) {
            device.behavior = behavior;
        }
    }
}

impl PortBackend for MockBackend {
    fn available_ports(&self) -> Result<Vec<PortDescriptor>, PortError> {
        if *self.enumeration_broken.lock() {
            return Err(PortError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "device subsystem unreachable",
            )));
        }
        let devices = self.devices.lock();
        let mut ports: Vec<_> = devices
            .iter()
            .map(|(name, device)| PortDescriptor::new(name.clone(), device.class))
            .collect();
        ports.sort_by(|a, b| a.port_name.cmp(&b.port_name));
        Ok(ports)
    }

    fn open(&self, config: &PortConfig) -> Result<Box<dyn SerialPortAdapter>, PortError> {
        let (port, behavior, delay) = {
            let devices = self.devices.lock();
            let device = devices
                .get(&config.port_name)
                .ok_or_else(|| PortError::not_found(&config.port_name))?;
            (device.port.clone(), device.behavior, device.open_delay)
        };
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        match behavior {
            OpenBehavior::Busy => Err(PortError::Busy(config.port_name.clone())),
            OpenBehavior::Denied => Err(PortError::PermissionDenied(config.port_name.clone())),
            OpenBehavior::Available => {
                self.opened.lock().push(config.clone());
                Ok(Box::new(port))
            }
        }
    }
}
