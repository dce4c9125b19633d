//! Service layer for serial port operations.
//!
//! This is the surface shells and IPC layers talk to. It validates requests,
//! dispatches them to the session registry, and returns only
//! [`TransportError`]s, so callers never see host-specific error types.
//!
//! # Architecture
//!
//! ```text
//! CLI / GUI shell ──> TransportService ──> SessionRegistry ──> PortSession ──> PortBackend
//! ```

use crate::codec;
use crate::enumerator::{self, PortDescriptor};
use crate::error::{TransportError, TransportResult};
use crate::port::{
    DataBits, Parity, PortBackend, PortConfig, StopBits, SystemBackend, DEFAULT_BAUD_RATE,
};
use crate::registry::{SessionRegistry, TeardownReport};
use crate::session::{PortSession, SessionStatus};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Longest read timeout a caller may ask for.
pub const MAX_READ_TIMEOUT_MS: u64 = 60_000;

// ========== Request/Response DTOs ==========

/// Request to open a port.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenRequest {
    pub port_name: String,
    #[serde(default = "default_baud")]
    pub baud_rate: u32,
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
    #[serde(default = "default_parity")]
    pub parity: String,
}

/// Default baud rate for open requests (9600 bps).
pub fn default_baud() -> u32 {
    DEFAULT_BAUD_RATE
}

/// Default data bits for open requests (8 bits).
pub fn default_data_bits() -> u8 {
    8
}

/// Default stop bits for open requests (1 bit).
pub fn default_stop_bits() -> u8 {
    1
}

/// Default parity for open requests (none).
pub fn default_parity() -> String {
    "None".to_string()
}

impl OpenRequest {
    /// 9600 8N1 on `port_name`.
    pub fn new(port_name: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate: default_baud(),
            data_bits: default_data_bits(),
            stop_bits: default_stop_bits(),
            parity: default_parity(),
        }
    }
}

impl TryFrom<&OpenRequest> for PortConfig {
    type Error = TransportError;

    fn try_from(req: &OpenRequest) -> Result<Self, Self::Error> {
        let config = PortConfig {
            port_name: req.port_name.trim().to_string(),
            baud_rate: req.baud_rate,
            data_bits: DataBits::try_from(req.data_bits).map_err(TransportError::InvalidConfig)?,
            stop_bits: StopBits::try_from(req.stop_bits).map_err(TransportError::InvalidConfig)?,
            parity: req
                .parity
                .parse::<Parity>()
                .map_err(TransportError::InvalidConfig)?,
        };
        config.validate().map_err(TransportError::InvalidConfig)?;
        Ok(config)
    }
}

/// Request to close a port.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseRequest {
    pub port_name: String,
}

/// Request to send data.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteRequest {
    pub port_name: String,
    pub data: String,
    #[serde(default)]
    pub is_hex: bool,
}

/// Request to wait for incoming data.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadRequest {
    pub port_name: String,
    pub timeout_ms: u64,
}

/// Result from opening a port.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenResponse {
    pub port_name: String,
    pub message: String,
}

/// Result from closing a port.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseResponse {
    pub port_name: String,
    pub message: String,
}

/// Result from writing data.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteResponse {
    pub bytes_written: usize,
}

// ========== Service Implementation ==========

/// Entry point for every transport operation.
///
/// Cheap to clone; clones share the same registry.
#[derive(Clone)]
pub struct TransportService {
    backend: Arc<dyn PortBackend>,
    registry: Arc<SessionRegistry>,
}

impl TransportService {
    /// Create a service over the given backend with an empty registry.
    pub fn new(backend: Arc<dyn PortBackend>) -> Self {
        Self {
            backend,
            registry: Arc::new(SessionRegistry::new()),
        }
    }

    /// Create a service over the host serial subsystem.
    pub fn system() -> Self {
        Self::new(Arc::new(SystemBackend))
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// List the serial devices present on the host.
    ///
    /// # Errors
    ///
    /// - `EnumerationError` if the device subsystem cannot be queried
    pub fn list_ports(&self) -> TransportResult<Vec<PortDescriptor>> {
        enumerator::list_ports(self.backend.as_ref())
    }

    /// Open a port with the requested line parameters.
    ///
    /// # Errors
    ///
    /// - `InvalidConfig` if any parameter is outside its allowed set
    /// - `AlreadyOpen` if the port is already open in this process
    /// - `PortUnavailable` / `PermissionDenied` from the host
    pub fn open_port(&self, req: OpenRequest) -> TransportResult<OpenResponse> {
        let config = PortConfig::try_from(&req)?;
        let name = config.port_name.clone();
        let backend = Arc::clone(&self.backend);

        self.registry
            .open_with(&name, move || PortSession::open(backend.as_ref(), config))?;

        Ok(OpenResponse {
            message: format!("Port {name} opened successfully"),
            port_name: name,
        })
    }

    /// Close a port and release its handle.
    ///
    /// # Errors
    ///
    /// - `NotOpen` if no session is registered under the name
    /// - `CloseError` if flushing failed; the port is closed regardless
    pub fn close_port(&self, req: CloseRequest) -> TransportResult<CloseResponse> {
        let name = req.port_name.trim();
        self.registry.unregister(name)?;
        Ok(CloseResponse {
            port_name: name.to_string(),
            message: format!("Port {name} closed successfully"),
        })
    }

    /// Send a text or hex payload.
    ///
    /// The payload is decoded before the session is looked up, so a bad hex
    /// string never reaches the device.
    ///
    /// # Errors
    ///
    /// - `EncodingError` if `is_hex` is set and the payload is not valid hex
    /// - `NotOpen` if no session is registered under the name
    /// - `WriteError` if the device rejected or short-wrote the payload
    pub fn write_data(&self, req: WriteRequest) -> TransportResult<WriteResponse> {
        let bytes = codec::encode_payload(&req.data, req.is_hex)?;
        let bytes_written = self
            .registry
            .with_session(req.port_name.trim(), |session| session.write_bytes(&bytes))?;
        Ok(WriteResponse { bytes_written })
    }

    /// Wait up to `timeout_ms` for incoming bytes.
    ///
    /// An empty result means nothing arrived in time. Timeouts are capped at
    /// [`MAX_READ_TIMEOUT_MS`]: a longer wait would hold the session lock long
    /// enough to make `close_port` on the same port look hung, so it is
    /// refused up front instead of being silently shortened.
    ///
    /// # Errors
    ///
    /// - `InvalidConfig` if the timeout exceeds [`MAX_READ_TIMEOUT_MS`]
    /// - `NotOpen` if no session is registered under the name
    /// - `ReadError` if the device failed for a reason other than the timeout
    pub fn read_data(&self, req: ReadRequest) -> TransportResult<Vec<u8>> {
        if req.timeout_ms > MAX_READ_TIMEOUT_MS {
            return Err(TransportError::InvalidConfig(format!(
                "read timeout {} ms exceeds the {MAX_READ_TIMEOUT_MS} ms limit",
                req.timeout_ms
            )));
        }
        let timeout = Duration::from_millis(req.timeout_ms);
        self.registry
            .with_session(req.port_name.trim(), |session| session.read(timeout))
    }

    /// Configuration and traffic counters of an open port.
    pub fn status(&self, port_name: &str) -> TransportResult<SessionStatus> {
        self.registry
            .with_session(port_name.trim(), |session| Ok(session.status()))
    }

    /// Names of all open ports.
    pub fn open_ports(&self) -> Vec<String> {
        self.registry.names()
    }

    /// Force-close every open port.
    pub fn shutdown(&self) -> TeardownReport {
        let report = self.registry.shutdown_all();
        info!(
            closed = report.closed.len(),
            failed = report.failures.len(),
            "transport shut down"
        );
        report
    }
}

impl std::fmt::Debug for TransportService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportService")
            .field("registry", &self.registry)
            .finish()
    }
}

// ========== Tests ==========
