//! Serial Assistant Library
//!
//! Transport core of a serial debugging assistant: discover serial devices,
//! open them with explicit line parameters, exchange text or hex payloads and
//! close them, with every failure reported as a typed, serializable error.
//!
//! # Modules
//!
//! - `enumerator`: Device discovery and classification
//! - `session`: One open port and its I/O
//! - `registry`: Name-keyed set of open sessions
//! - `service`: Request/response facade for shells
//! - `port`: Port abstraction layer over the host serial subsystem
//! - `codec`: Hex and text payload conversion
//! - `error`: Transport error taxonomy
//! - `config`: Configuration management with TOML support
//! - `logging`: Tracing subscriber setup

pub mod codec;
pub mod config;
pub mod enumerator;
pub mod error;
pub mod logging;
pub mod port;
pub mod registry;
pub mod service;
pub mod session;

// Re-export commonly used types for convenience
pub use enumerator::{DeviceClass, PortDescriptor};
pub use error::{ErrorKind, ErrorResponse, TransportError, TransportResult};
pub use port::{
    DataBits, MockBackend, MockSerialPort, Parity, PortBackend, PortConfig, PortError,
    SerialPortAdapter, StopBits, SyncSerialPort, SystemBackend,
};
pub use registry::{SessionRegistry, TeardownFailure, TeardownReport};
pub use service::{
    CloseRequest, CloseResponse, OpenRequest, OpenResponse, ReadRequest, TransportService,
    WriteRequest, WriteResponse,
};
pub use session::{PortSession, SessionStatus};

// Re-export config types
pub use config::{Config, ConfigError, ConfigLoader, ConfigResult};
