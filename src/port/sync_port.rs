//! Synchronous serial port implementation.
//!
//! Wraps the `serialport` crate's `SerialPort` trait with our own `SerialPortAdapter`
//! trait for dependency injection and testing.

use super::error::PortError;
use super::traits::{PortConfig, SerialPortAdapter};
use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

/// Timeout applied at open time, before any per-call read timeout is set.
pub const OPEN_TIMEOUT: Duration = Duration::from_millis(100);

/// Synchronous serial port implementation wrapping `serialport::SerialPort`.
pub struct SyncSerialPort {
    /// The underlying serial port implementation.
    port: Box<dyn serialport::SerialPort>,
    /// The port name as the caller addressed it.
    name: String,
}

impl SyncSerialPort {
    /// Open a serial port with the given line parameters.
    ///
    /// # Example
    /// ```no_run
    /// use serial_assistant::port::{PortConfig, SyncSerialPort};
    ///
    /// let port = SyncSerialPort::open(&PortConfig::new("/dev/ttyUSB0"))?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn open(config: &PortConfig) -> Result<Self, PortError> {
        let path = device_path(&config.port_name);
        let port = serialport::new(&path, config.baud_rate)
            .data_bits(config.data_bits.into())
            .flow_control(serialport::FlowControl::None)
            .parity(config.parity.into())
            .stop_bits(config.stop_bits.into())
            .timeout(OPEN_TIMEOUT)
            .open()
            .map_err(|e| PortError::from_open_error(&config.port_name, e))?;

        Ok(Self {
            port,
            name: config.port_name.clone(),
        })
    }
}

/// Map a user-facing port name to the path the OS expects.
///
/// Windows only reaches `COM10` and above through the `\\.\` device namespace.
pub fn device_path(port_name: &str) -> String {
    if cfg!(target_os = "windows") {
        if let Some(number) = port_name
            .strip_prefix("COM")
            .and_then(|n| n.parse::<u32>().ok())
        {
            if number >= 10 {
                return format!(r"\\.\{port_name}");
            }
        }
    }
    port_name.to_string()
}

impl SerialPortAdapter for SyncSerialPort {
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError> {
        let mut written = 0;
        while written < data.len() {
            match self.port.write(&data[written..]) {
                Ok(0) => break,
                Ok(n) => written += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                // Report what got through; the session decides what a short write means.
                Err(e) if e.kind() == ErrorKind::TimedOut && written > 0 => break,
                Err(e) => return Err(PortError::Io(e)),
            }
        }
        Ok(written)
    }

    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, PortError> {
        self.port.read(buffer).map_err(PortError::Io)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), PortError> {
        self.port.set_timeout(timeout).map_err(PortError::Serial)
    }

    fn clear_buffers(&mut self) -> Result<(), PortError> {
        self.port
            .clear(serialport::ClearBuffer::All)
            .map_err(PortError::Serial)
    }

    fn flush(&mut self) -> Result<(), PortError> {
        self.port.flush().map_err(PortError::Io)
    }
}

impl std::fmt::Debug for SyncSerialPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncSerialPort")
            .field("name", &self.name)
            .field("baud_rate", &self.port.baud_rate().ok())
            .finish()
    }
}
