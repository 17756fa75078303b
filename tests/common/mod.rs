//! Shared test utilities for the bridge integration tests.
//!
//! This module provides common test infrastructure including:
//! - A mock-backed session worker and bridge
//! - Helpers for waiting on pushed data events
//! - JSON assertion helpers

#![allow(dead_code)]

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use usb_serial_bridge::bridge::outbound_channel;
use usb_serial_bridge::discovery::{DeviceHandle, MockDeviceProvider};
use usb_serial_bridge::port::MockDevice;
use usb_serial_bridge::session::{ReaderConfig, SerialSession, SessionHandle, SessionSettings};
use usb_serial_bridge::{Bridge, Outbound};

/// Arduino Uno ids, matched by the default CDC-ACM rule.
pub const UNO_VID: u16 = 0x2341;
pub const UNO_PID: u16 = 0x0043;

/// FTDI FT232R ids.
pub const FTDI_VID: u16 = 0x0403;
pub const FTDI_PID: u16 = 0x6001;

/// Settings with a short poll wait so reader shutdown is quick.
pub fn fast_settings() -> SessionSettings {
    SessionSettings {
        write_timeout: Duration::from_millis(200),
        reader: ReaderConfig {
            poll_wait: Duration::from_millis(10),
            ..Default::default()
        },
    }
}

/// A session worker over a mock provider with one device attached.
pub struct TestHarness {
    pub provider: MockDeviceProvider,
    pub device: MockDevice,
    pub handle: SessionHandle,
}

impl TestHarness {
    /// Harness with an Uno-like device on `/dev/ttyACM0`.
    pub fn new() -> Self {
        Self::with_device(DeviceHandle::new("/dev/ttyACM0", UNO_VID, UNO_PID))
    }

    pub fn with_device(device: DeviceHandle) -> Self {
        let provider = MockDeviceProvider::new();
        let device = provider.attach(device);
        let session = SerialSession::with_settings(Arc::new(provider.clone()), fast_settings());
        let handle = SessionHandle::spawn(session).expect("spawn session worker");
        Self {
            provider,
            device,
            handle,
        }
    }

    /// A bridge on this harness's worker plus the receiver for its output.
    pub fn bridge(&self) -> (Bridge, mpsc::Receiver<Outbound>) {
        let (tx, rx) = outbound_channel();
        (Bridge::new(self.handle.clone(), tx), rx)
    }
}

/// Wait for the next data event, skipping anything else.
pub async fn next_data_event(
    rx: &mut mpsc::Receiver<Outbound>,
    timeout: Duration,
) -> Option<Vec<u8>> {
    let wait = async {
        while let Some(message) = rx.recv().await {
            if let Outbound::Event(event) = message {
                return Some(event.data);
            }
        }
        None
    };
    tokio::time::timeout(timeout, wait).await.ok().flatten()
}

/// Collect data events until `expected` bytes have arrived or `timeout` passes.
pub async fn collect_data(
    rx: &mut mpsc::Receiver<Outbound>,
    expected: usize,
    timeout: Duration,
) -> Vec<u8> {
    let deadline = tokio::time::Instant::now() + timeout;
    let mut collected = Vec::new();
    while collected.len() < expected {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        match next_data_event(rx, remaining).await {
            Some(chunk) => collected.extend(chunk),
            None => break,
        }
    }
    collected
}

/// Assert that a JSON value contains specific fields with expected values.
///
/// # Example
/// ```ignore
/// let actual = json!({"status": "ok", "message": "Serial port opened!", "id": 1});
/// let expected = json!({"status": "ok"});
/// assert_json_contains(&actual, &expected); // Passes - actual contains all of expected
/// ```
pub fn assert_json_contains(actual: &Value, expected: &Value) {
    match (actual, expected) {
        (Value::Object(actual_map), Value::Object(expected_map)) => {
            for (key, expected_value) in expected_map {
                let actual_value = actual_map
                    .get(key)
                    .unwrap_or_else(|| panic!("Expected key '{}' not found in actual JSON", key));
                assert_json_contains(actual_value, expected_value);
            }
        }
        (Value::Array(actual_arr), Value::Array(expected_arr)) => {
            assert_eq!(actual_arr.len(), expected_arr.len(), "Array lengths differ");
            for (actual_item, expected_item) in actual_arr.iter().zip(expected_arr.iter()) {
                assert_json_contains(actual_item, expected_item);
            }
        }
        _ => {
            assert_eq!(
                actual, expected,
                "JSON values differ: expected {:?}, got {:?}",
                expected, actual
            );
        }
    }
}
