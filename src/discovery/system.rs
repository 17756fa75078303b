//! Devices enumerated from the operating system.

use super::{port_sort_key, AccessDecision, DeviceHandle, DeviceProvider, DriverKind};
use crate::port::{PortError, SerialConnection, SystemSerialPort};
use serialport::{SerialPortInfo, SerialPortType};
use tracing::{debug, warn};

/// Provider backed by `serialport::available_ports`.
///
/// Only USB serial devices are reported; built-in UARTs and Bluetooth
/// serial nodes have no vendor/product ids to match against.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemDeviceProvider;

impl SystemDeviceProvider {
    pub fn new() -> Self {
        Self
    }
}

fn usb_handle(info: SerialPortInfo) -> Option<DeviceHandle> {
    match info.port_type {
        SerialPortType::UsbPort(usb) => Some(DeviceHandle {
            port_name: info.port_name,
            vid: usb.vid,
            pid: usb.pid,
            driver: DriverKind::for_vendor(usb.vid),
            manufacturer: usb.manufacturer,
            product: usb.product,
            serial_number: usb.serial_number,
        }),
        _ => None,
    }
}

impl DeviceProvider for SystemDeviceProvider {
    fn list(&self) -> Vec<DeviceHandle> {
        let ports = match serialport::available_ports() {
            Ok(ports) => ports,
            Err(e) => {
                warn!("Failed to enumerate serial ports: {}", e);
                Vec::new()
            }
        };

        let mut devices: Vec<DeviceHandle> = ports.into_iter().filter_map(usb_handle).collect();
        devices.sort_by_key(|d| port_sort_key(&d.port_name));
        debug!("Enumerated {} USB serial device(s)", devices.len());
        devices
    }

    fn request_access(&self, device: &DeviceHandle) -> AccessDecision {
        if has_read_write_access(&device.port_name) {
            AccessDecision::Granted
        } else {
            AccessDecision::Denied
        }
    }

    fn open(&self, device: &DeviceHandle) -> Result<Box<dyn SerialConnection>, PortError> {
        Ok(Box::new(SystemSerialPort::open(&device.port_name)?))
    }
}

#[cfg(unix)]
fn has_read_write_access(path: &str) -> bool {
    use nix::unistd::{access, AccessFlags};
    access(path, AccessFlags::R_OK | AccessFlags::W_OK).is_ok()
}

#[cfg(not(unix))]
fn has_read_write_access(_path: &str) -> bool {
    // COM ports carry no per-user permission bits; exclusivity is checked at open.
    true
}
