//! A single open serial connection.
//!
//! A [`PortSession`] owns its adapter exclusively. Its config is fixed for
//! its lifetime; closing releases the handle and every later operation fails
//! with `NotOpen`.

use crate::codec;
use crate::error::{TransportError, TransportResult};
use crate::port::{PortBackend, PortConfig, SerialPortAdapter};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Largest chunk a single read returns.
pub const READ_BUFFER_SIZE: usize = 1024;

/// Snapshot of a session's configuration and traffic counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub config: PortConfig,
    pub bytes_read_total: u64,
    pub bytes_written_total: u64,
    pub opened_at: DateTime<Utc>,
    pub open_duration_ms: u64,
}

pub struct PortSession {
    config: PortConfig,
    /// `None` once closed.
    port: Option<Box<dyn SerialPortAdapter>>,
    bytes_read_total: u64,
    bytes_written_total: u64,
    opened_at: DateTime<Utc>,
    open_started: Instant,
}

impl PortSession {
    /// Open `config.port_name` through `backend`.
    ///
    /// The config is validated before the backend is touched. Pending input
    /// and output are discarded so the session starts idle.
    ///
    /// # Errors
    ///
    /// - `InvalidConfig` if a field is outside its allowed set
    /// - `PortUnavailable` if the device is missing or held by someone else
    /// - `PermissionDenied` if the host refuses access
    pub fn open(backend: &dyn PortBackend, config: PortConfig) -> TransportResult<Self> {
        config.validate().map_err(TransportError::InvalidConfig)?;

        let mut port = backend
            .open(&config)
            .map_err(|e| TransportError::from_open(&config.port_name, e))?;
        port.clear_buffers()
            .map_err(|e| TransportError::from_open(&config.port_name, e))?;

        info!(
            port = %config.port_name,
            baud = config.baud_rate,
            data_bits = u8::from(config.data_bits),
            stop_bits = u8::from(config.stop_bits),
            parity = %config.parity,
            "opened serial port"
        );
        Ok(Self::from_adapter(config, port))
    }

    /// Wrap an adapter that is already open.
    pub fn from_adapter(config: PortConfig, port: Box<dyn SerialPortAdapter>) -> Self {
        Self {
            config,
            port: Some(port),
            bytes_read_total: 0,
            bytes_written_total: 0,
            opened_at: Utc::now(),
            open_started: Instant::now(),
        }
    }

    pub fn config(&self) -> &PortConfig {
        &self.config
    }

    pub fn port_name(&self) -> &str {
        &self.config.port_name
    }

    pub fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn port_mut(&mut self) -> TransportResult<&mut Box<dyn SerialPortAdapter>> {
        let name = &self.config.port_name;
        self.port
            .as_mut()
            .ok_or_else(|| TransportError::NotOpen(name.clone()))
    }

    /// Send a user payload, hex-decoding it first when `as_hex` is set.
    ///
    /// A payload that fails to decode is rejected before anything is sent.
    pub fn write(&mut self, payload: &str, as_hex: bool) -> TransportResult<usize> {
        let bytes = codec::encode_payload(payload, as_hex)?;
        self.write_bytes(&bytes)
    }

    /// Send raw bytes. Succeeds only if the transport accepted all of them.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> TransportResult<usize> {
        let port = self.port_mut()?;
        let accepted = port
            .write_bytes(bytes)
            .map_err(|e| TransportError::write(port.name(), e))?;

        self.bytes_written_total += accepted as u64;
        if accepted != bytes.len() {
            warn!(
                port = %self.config.port_name,
                accepted,
                requested = bytes.len(),
                "short write"
            );
            return Err(TransportError::write(
                &self.config.port_name,
                format!("short write: {accepted} of {} bytes accepted", bytes.len()),
            ));
        }

        debug!(port = %self.config.port_name, bytes = accepted, "wrote");
        Ok(accepted)
    }

    /// Wait up to `timeout` for incoming bytes.
    ///
    /// Returns as soon as anything arrives. An empty result means the timeout
    /// elapsed with nothing received.
    pub fn read(&mut self, timeout: Duration) -> TransportResult<Vec<u8>> {
        let port = self.port_mut()?;
        port.set_timeout(timeout)
            .map_err(|e| TransportError::read(port.name(), e))?;

        let mut buffer = vec![0u8; READ_BUFFER_SIZE];
        let n = match port.read_bytes(&mut buffer) {
            Ok(n) => n,
            Err(e) if e.is_timeout() => 0,
            Err(e) => return Err(TransportError::read(port.name(), e)),
        };
        buffer.truncate(n);

        if n > 0 {
            self.bytes_read_total += n as u64;
            debug!(port = %self.config.port_name, bytes = n, "read");
        }
        Ok(buffer)
    }

    /// Flush pending output and release the handle.
    ///
    /// The handle is released even when the flush fails; the failure is still
    /// reported. Closing twice fails with `NotOpen`.
    pub fn close(&mut self) -> TransportResult<()> {
        let mut port = self
            .port
            .take()
            .ok_or_else(|| TransportError::NotOpen(self.config.port_name.clone()))?;

        let flushed = port.flush();
        drop(port);
        info!(
            port = %self.config.port_name,
            rx = self.bytes_read_total,
            tx = self.bytes_written_total,
            "closed serial port"
        );
        flushed.map_err(|e| TransportError::close(&self.config.port_name, e))
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            config: self.config.clone(),
            bytes_read_total: self.bytes_read_total,
            bytes_written_total: self.bytes_written_total,
            opened_at: self.opened_at,
            open_duration_ms: self.open_started.elapsed().as_millis() as u64,
        }
    }
}

impl Drop for PortSession {
    fn drop(&mut self) {
        if self.is_open() {
            if let Err(e) = self.close() {
                warn!(error = %e, "close failed while dropping session");
            }
        }
    }
}

impl std::fmt::Debug for PortSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortSession")
            .field("config", &self.config)
            .field("open", &self.is_open())
            .field("bytes_read_total", &self.bytes_read_total)
            .field("bytes_written_total", &self.bytes_written_total)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enumerator::DeviceClass;
    use crate::error::ErrorKind;
    use crate::port::{MockBackend, MockSerialPort};

    fn open_mock(name: &str) -> (PortSession, MockSerialPort) {
        let backend = MockBackend::new();
        let mock = backend.add_port(name, DeviceClass::Usb);
        let session = PortSession::open(&backend, PortConfig::new(name)).unwrap();
        (session, mock)
    }

    #[test]
    fn test_open_leaves_port_idle() {
        let backend = MockBackend::new();
        let mut mock = backend.add_port("COM1", DeviceClass::Usb);
        mock.enqueue_read(b"stale");

        let session = PortSession::open(&backend, PortConfig::new("COM1")).unwrap();
        assert!(session.is_open());
        assert!(mock.was_cleared());
        assert_eq!(mock.available_bytes(), 0);
    }

    #[test]
    fn test_open_validates_before_touching_backend() {
        let backend = MockBackend::new();
        backend.add_port("COM1", DeviceClass::Usb);

        let err = PortSession::open(&backend, PortConfig::new("COM1").with_baud_rate(1234))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfig);
        assert!(backend.open_log().is_empty());
    }

    #[test]
    fn test_write_hex_and_text() {
        let (mut session, mock) = open_mock("COM1");
        assert_eq!(session.write("AB CD", true).unwrap(), 2);
        assert_eq!(session.write("ABCD", false).unwrap(), 4);
        assert_eq!(
            mock.get_write_log(),
            vec![vec![0xAB, 0xCD], b"ABCD".to_vec()]
        );
        assert_eq!(session.status().bytes_written_total, 6);
    }

    #[test]
    fn test_bad_hex_sends_nothing() {
        let (mut session, mock) = open_mock("COM1");
        let err = session.write("ZZ", true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EncodingError);
        assert!(mock.get_write_log().is_empty());
    }

    #[test]
    fn test_short_write_is_an_error() {
        let (mut session, mut mock) = open_mock("COM1");
        mock.set_write_limit(Some(3));
        let err = session.write_bytes(b"abcdef").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WriteError);
        assert!(err.to_string().contains("3 of 6"));
    }

    #[test]
    fn test_rejected_write_is_an_error() {
        let (mut session, mut mock) = open_mock("COM1");
        mock.fail_next_write();
        assert_eq!(
            session.write_bytes(b"x").unwrap_err().kind(),
            ErrorKind::WriteError
        );
    }

    #[test]
    fn test_read_returns_available_bytes() {
        let (mut session, mut mock) = open_mock("COM1");
        mock.enqueue_read(b"hello");
        assert_eq!(session.read(Duration::from_millis(50)).unwrap(), b"hello");
        assert_eq!(mock.timeout(), Duration::from_millis(50));
        assert_eq!(session.status().bytes_read_total, 5);
    }

    #[test]
    fn test_read_timeout_is_empty_not_error() {
        let (mut session, _mock) = open_mock("COM1");
        let start = Instant::now();
        let data = session.read(Duration::from_millis(50)).unwrap();
        assert!(data.is_empty());
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn test_read_caps_at_buffer_size() {
        let (mut session, mut mock) = open_mock("COM1");
        mock.enqueue_read(&vec![0x55; READ_BUFFER_SIZE + 10]);
        assert_eq!(
            session.read(Duration::from_millis(10)).unwrap().len(),
            READ_BUFFER_SIZE
        );
        assert_eq!(session.read(Duration::from_millis(10)).unwrap().len(), 10);
    }

    #[test]
    fn test_read_io_failure() {
        let (mut session, mut mock) = open_mock("COM1");
        mock.fail_next_read();
        assert_eq!(
            session.read(Duration::from_millis(10)).unwrap_err().kind(),
            ErrorKind::ReadError
        );
    }

    #[test]
    fn test_double_close_fails() {
        let (mut session, mock) = open_mock("COM1");
        session.close().unwrap();
        assert!(!session.is_open());
        assert_eq!(mock.flush_count(), 1);
        assert_eq!(session.close().unwrap_err().kind(), ErrorKind::NotOpen);
    }

    #[test]
    fn test_operations_after_close_fail() {
        let (mut session, _mock) = open_mock("COM1");
        session.close().unwrap();
        assert_eq!(session.write("x", false).unwrap_err().kind(), ErrorKind::NotOpen);
        assert_eq!(
            session.read(Duration::from_millis(1)).unwrap_err().kind(),
            ErrorKind::NotOpen
        );
    }

    #[test]
    fn test_close_failure_still_releases() {
        let (mut session, mut mock) = open_mock("COM1");
        mock.fail_next_flush();
        assert_eq!(session.close().unwrap_err().kind(), ErrorKind::CloseError);
        assert!(!session.is_open());
    }

    #[test]
    fn test_drop_closes() {
        let (session, mock) = open_mock("COM1");
        drop(session);
        assert_eq!(mock.flush_count(), 1);
    }
}
