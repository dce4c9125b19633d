//! Caller-facing error taxonomy.
//!
//! Every failure leaving the transport is a [`TransportError`]. Host-specific
//! details survive only as message text; callers branch on [`ErrorKind`].

use crate::port::PortError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors returned by the transport operations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// A parameter was outside its allowed set.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The device is missing or held exclusively by another process.
    #[error("Port {port} is unavailable: {reason}")]
    PortUnavailable { port: String, reason: String },

    /// The host refused access to the device.
    #[error("Permission denied for port {0}")]
    PermissionDenied(String),

    /// No live session is registered under this name.
    #[error("Port {0} is not open")]
    NotOpen(String),

    /// A live session is already registered under this name.
    #[error("Port {0} is already open")]
    AlreadyOpen(String),

    /// A hex payload could not be decoded.
    #[error("Invalid hex string: {0}")]
    Encoding(String),

    /// The transport rejected the payload or accepted only part of it.
    #[error("Failed to write to port {port}: {reason}")]
    Write { port: String, reason: String },

    /// A read failed for a reason other than its timeout.
    #[error("Failed to read from port {port}: {reason}")]
    Read { port: String, reason: String },

    /// Flushing or releasing the handle failed during close.
    #[error("Failed to close port {port}: {reason}")]
    Close { port: String, reason: String },

    /// The host device subsystem could not be queried.
    #[error("Failed to enumerate serial ports: {0}")]
    Enumeration(String),
}

impl TransportError {
    /// Translate a failure from opening `port`.
    pub fn from_open(port: &str, err: PortError) -> Self {
        match err {
            PortError::Config(reason) => Self::InvalidConfig(reason),
            PortError::PermissionDenied(_) => Self::PermissionDenied(port.to_string()),
            PortError::NotFound(_) => Self::PortUnavailable {
                port: port.to_string(),
                reason: "device not present".to_string(),
            },
            PortError::Busy(_) => Self::PortUnavailable {
                port: port.to_string(),
                reason: "device is in use by another process".to_string(),
            },
            other => Self::PortUnavailable {
                port: port.to_string(),
                reason: other.to_string(),
            },
        }
    }

    pub fn write(port: &str, reason: impl fmt::Display) -> Self {
        Self::Write {
            port: port.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn read(port: &str, reason: impl fmt::Display) -> Self {
        Self::Read {
            port: port.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn close(port: &str, reason: impl fmt::Display) -> Self {
        Self::Close {
            port: port.to_string(),
            reason: reason.to_string(),
        }
    }

    /// The category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidConfig(_) => ErrorKind::InvalidConfig,
            Self::PortUnavailable { .. } => ErrorKind::PortUnavailable,
            Self::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Self::NotOpen(_) => ErrorKind::NotOpen,
            Self::AlreadyOpen(_) => ErrorKind::AlreadyOpen,
            Self::Encoding(_) => ErrorKind::EncodingError,
            Self::Write { .. } => ErrorKind::WriteError,
            Self::Read { .. } => ErrorKind::ReadError,
            Self::Close { .. } => ErrorKind::CloseError,
            Self::Enumeration(_) => ErrorKind::EnumerationError,
        }
    }
}

/// Serializable error category, stable across hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidConfig,
    PortUnavailable,
    PermissionDenied,
    NotOpen,
    AlreadyOpen,
    EncodingError,
    WriteError,
    ReadError,
    CloseError,
    EnumerationError,
}

/// Wire shape of an error for shells and IPC layers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&TransportError> for ErrorResponse {
    fn from(err: &TransportError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl From<TransportError> for ErrorResponse {
    fn from(err: TransportError) -> Self {
        Self::from(&err)
    }
}

/// A specialized `Result` type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;
