//! Serial device discovery.

use crate::error::TransportError;
use crate::port::PortBackend;
use serde::{Deserialize, Serialize};
use serialport::{SerialPortInfo, SerialPortType};

/// Coarse kind of hardware behind a serial device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceClass {
    Usb,
    Bluetooth,
    Pci,
    Unknown,
}

impl DeviceClass {
    /// Label shown when nothing more specific is known about the device.
    pub fn default_label(self) -> &'static str {
        match self {
            Self::Usb => "USB Device",
            Self::Bluetooth => "Bluetooth",
            Self::Pci => "PCI Port",
            Self::Unknown => "Unknown",
        }
    }
}

/// One device found by an enumeration pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortDescriptor {
    pub port_name: String,
    pub device_class: DeviceClass,
    /// Human-readable description, e.g. `USB: CP2102 USB to UART Bridge`.
    pub port_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vid: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u16>,
}

impl PortDescriptor {
    pub fn new(port_name: impl Into<String>, device_class: DeviceClass) -> Self {
        Self {
            port_name: port_name.into(),
            device_class,
            port_type: device_class.default_label().to_string(),
            vid: None,
            pid: None,
        }
    }
}

impl From<&SerialPortInfo> for PortDescriptor {
    fn from(info: &SerialPortInfo) -> Self {
        match &info.port_type {
            SerialPortType::UsbPort(usb) => {
                let label = usb
                    .product
                    .as_deref()
                    .or(usb.manufacturer.as_deref())
                    .map(|name| format!("USB: {name}"))
                    .unwrap_or_else(|| DeviceClass::Usb.default_label().to_string());
                Self {
                    port_name: info.port_name.clone(),
                    device_class: DeviceClass::Usb,
                    port_type: label,
                    vid: Some(usb.vid),
                    pid: Some(usb.pid),
                }
            }
            SerialPortType::BluetoothPort => Self::new(&info.port_name, DeviceClass::Bluetooth),
            SerialPortType::PciPort => Self::new(&info.port_name, DeviceClass::Pci),
            SerialPortType::Unknown => Self::new(&info.port_name, DeviceClass::Unknown),
        }
    }
}

/// Enumerate the devices `backend` can see.
///
/// Order is whatever the host reports. A failure here means the device
/// subsystem itself could not be queried; it is not retried.
pub fn list_ports(backend: &dyn PortBackend) -> Result<Vec<PortDescriptor>, TransportError> {
    let ports = backend
        .available_ports()
        .map_err(|e| TransportError::Enumeration(e.to_string()))?;
    tracing::debug!(count = ports.len(), "enumerated serial ports");
    Ok(ports)
}
