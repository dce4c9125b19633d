//! Port-specific error types.
//!
//! These describe what went wrong at the adapter level, in terms of the host
//! serial subsystem. The service layer translates them into
//! [`TransportError`](crate::error::TransportError) before they reach callers.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during serial port operations.
#[derive(Debug, Error)]
pub enum PortError {
    /// The specified serial port was not found on the system.
    #[error("Serial port not found: {0}")]
    NotFound(String),

    /// The port exists but another process holds it exclusively.
    #[error("Serial port is busy: {0}")]
    Busy(String),

    /// The host refused access to the device.
    #[error("Permission denied for serial port: {0}")]
    PermissionDenied(String),

    /// An I/O error occurred during port operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Port configuration was rejected by the driver.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation timed out.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// A serialport-specific error occurred.
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),
}

impl PortError {
    /// Create a NotFound error from a port name.
    pub fn not_found(port_name: impl Into<String>) -> Self {
        Self::NotFound(port_name.into())
    }

    /// Create a Config error from a message.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a Timeout error from a duration.
    pub fn timeout(duration: Duration) -> Self {
        Self::Timeout(duration)
    }

    /// Classify a failure returned by `serialport` while opening `port_name`.
    pub fn from_open_error(port_name: &str, err: serialport::Error) -> Self {
        use std::io::ErrorKind as Io;
        match err.kind() {
            serialport::ErrorKind::NoDevice => Self::not_found(port_name),
            serialport::ErrorKind::InvalidInput => Self::config(err.to_string()),
            serialport::ErrorKind::Io(Io::NotFound) => Self::not_found(port_name),
            serialport::ErrorKind::Io(Io::PermissionDenied) => {
                Self::PermissionDenied(port_name.to_string())
            }
            serialport::ErrorKind::Io(Io::AddrInUse) | serialport::ErrorKind::Io(Io::WouldBlock) => {
                Self::Busy(port_name.to_string())
            }
            _ if err.description.to_lowercase().contains("busy") => {
                Self::Busy(port_name.to_string())
            }
            _ => Self::Serial(err),
        }
    }

    /// Whether this error only means "nothing arrived before the deadline".
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }
}
