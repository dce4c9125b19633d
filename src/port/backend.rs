//! Access to the host serial subsystem.
//!
//! A `PortBackend` is the seam between the transport and the OS: it lists
//! devices and opens adapters. The service layer is generic over it so the
//! whole stack runs against `MockBackend` in tests.

use super::error::PortError;
use super::sync_port::SyncSerialPort;
use super::traits::{PortConfig, SerialPortAdapter};
use crate::enumerator::PortDescriptor;

/// Source of serial devices and open handles.
pub trait PortBackend: Send + Sync {
    /// List the devices currently present.
    fn available_ports(&self) -> Result<Vec<PortDescriptor>, PortError>;

    /// Open `config.port_name` with the given line parameters.
    fn open(&self, config: &PortConfig) -> Result<Box<dyn SerialPortAdapter>, PortError>;
}

/// Backend over the real host serial subsystem via the `serialport` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBackend;

impl PortBackend for SystemBackend {
    fn available_ports(&self) -> Result<Vec<PortDescriptor>, PortError> {
        let ports = serialport::available_ports()?;
        Ok(ports.iter().map(PortDescriptor::from).collect())
    }

    fn open(&self, config: &PortConfig) -> Result<Box<dyn SerialPortAdapter>, PortError> {
        Ok(Box::new(SyncSerialPort::open(config)?))
    }
}
