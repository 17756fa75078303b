//! Device discovery and access control.
//!
//! The session treats this layer as an opaque capability provider: it asks a
//! [`DeviceProvider`] for a device matching a [`DeviceFilter`], asks for
//! access to it, and later asks it to open a connection.

mod filter;
mod mock;
mod system;

pub use filter::{DeviceFilter, DriverKind, MatchRule, UsbId};
pub use mock::MockDeviceProvider;
pub use system::SystemDeviceProvider;

use crate::error::{BridgeError, BridgeResult};
use crate::port::{PortError, SerialConnection};
use serde::{Deserialize, Serialize};

/// A permissioned (or candidate) USB serial device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceHandle {
    /// System path of the serial node, e.g. `/dev/ttyACM0` or `COM3`.
    pub port_name: String,
    pub vid: u16,
    pub pid: u16,
    pub driver: DriverKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
}

impl DeviceHandle {
    /// Minimal handle for a device node with known ids.
    pub fn new(port_name: impl Into<String>, vid: u16, pid: u16) -> Self {
        Self {
            port_name: port_name.into(),
            vid,
            pid,
            driver: DriverKind::for_vendor(vid),
            manufacturer: None,
            product: None,
            serial_number: None,
        }
    }
}

/// Outcome of an access request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    Granted,
    Denied,
}

/// Source of devices and connections.
pub trait DeviceProvider: Send + Sync {
    /// Every attached USB serial device, in match order.
    fn list(&self) -> Vec<DeviceHandle>;

    /// Ask for permission to use `device`.
    fn request_access(&self, device: &DeviceHandle) -> AccessDecision;

    /// Open a connection to a previously granted device.
    fn open(&self, device: &DeviceHandle) -> Result<Box<dyn SerialConnection>, PortError>;

    /// Find the first device matching `filter`.
    fn discover(&self, filter: &DeviceFilter) -> BridgeResult<DeviceHandle> {
        let rule = filter.match_rule()?;
        self.list()
            .into_iter()
            .find_map(|device| matches_rule(device, rule))
            .ok_or(BridgeError::DeviceNotFound)
    }
}

/// Apply a match rule to one candidate, binding the driver on a match.
fn matches_rule(mut device: DeviceHandle, rule: MatchRule) -> Option<DeviceHandle> {
    match rule {
        MatchRule::Default => Some(device),
        MatchRule::Custom { vid, pid, driver } if device.vid == vid && device.pid == pid => {
            device.driver = driver;
            Some(device)
        }
        MatchRule::Custom { .. } => None,
    }
}

/// Sort key putting ttyACM* first, then ttyUSB*, numerically, then the rest by name.
pub(crate) fn port_sort_key(name: &str) -> (u8, usize, String) {
    let basename = name.rsplit('/').next().unwrap_or(name);
    if let Some(rest) = basename.strip_prefix("ttyACM") {
        let num = rest.parse::<usize>().unwrap_or(usize::MAX);
        return (0, num, basename.to_string());
    }
    if let Some(rest) = basename.strip_prefix("ttyUSB") {
        let num = rest.parse::<usize>().unwrap_or(usize::MAX);
        return (1, num, basename.to_string());
    }
    (2, 0, basename.to_string())
}
