//! In-memory provider over [`MockDevice`]s.

use super::{AccessDecision, DeviceHandle, DeviceProvider};
use crate::port::{MockDevice, PortError, SerialConnection};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug, Default)]
struct ProviderState {
    devices: Vec<(DeviceHandle, MockDevice)>,
    denied: HashSet<String>,
    failing_opens: HashSet<String>,
    access_requests: usize,
    open_attempts: usize,
}

/// Provider for tests: devices are attached explicitly and every call is counted.
#[derive(Debug, Clone, Default)]
pub struct MockDeviceProvider {
    state: Arc<Mutex<ProviderState>>,
}

impl MockDeviceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a device; returns the scriptable device behind it.
    pub fn attach(&self, handle: DeviceHandle) -> MockDevice {
        let device = MockDevice::new(handle.port_name.clone());
        self.state.lock().devices.push((handle, device.clone()));
        device
    }

    /// Remove a device from enumeration. Open connections are unaffected.
    pub fn detach(&self, port_name: &str) {
        self.state
            .lock()
            .devices
            .retain(|(handle, _)| handle.port_name != port_name);
    }

    /// Refuse access requests for this port.
    pub fn deny(&self, port_name: &str) {
        self.state.lock().denied.insert(port_name.to_string());
    }

    /// Make opens of this port fail (or succeed again).
    pub fn set_open_failure(&self, port_name: &str, fail: bool) {
        let mut state = self.state.lock();
        if fail {
            state.failing_opens.insert(port_name.to_string());
        } else {
            state.failing_opens.remove(port_name);
        }
    }

    /// Number of access requests seen.
    pub fn access_requests(&self) -> usize {
        self.state.lock().access_requests
    }

    /// Number of open attempts seen, failed ones included.
    pub fn open_attempts(&self) -> usize {
        self.state.lock().open_attempts
    }
}

impl DeviceProvider for MockDeviceProvider {
    fn list(&self) -> Vec<DeviceHandle> {
        self.state
            .lock()
            .devices
            .iter()
            .map(|(handle, _)| handle.clone())
            .collect()
    }

    fn request_access(&self, device: &DeviceHandle) -> AccessDecision {
        let mut state = self.state.lock();
        state.access_requests += 1;
        if state.denied.contains(&device.port_name) {
            AccessDecision::Denied
        } else {
            AccessDecision::Granted
        }
    }

    fn open(&self, device: &DeviceHandle) -> Result<Box<dyn SerialConnection>, PortError> {
        let mut state = self.state.lock();
        state.open_attempts += 1;
        if state.failing_opens.contains(&device.port_name) {
            return Err(PortError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "Cannot connect to the device!",
            )));
        }
        state
            .devices
            .iter()
            .find(|(handle, _)| handle.port_name == device.port_name)
            .map(|(_, mock)| Box::new(mock.connect()) as Box<dyn SerialConnection>)
            .ok_or_else(|| PortError::not_found(&device.port_name))
    }
}
