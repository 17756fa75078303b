//! JSON protocol tests: request lines in, responses and data events out.

mod common;

use common::{assert_json_contains, collect_data, next_data_event, TestHarness, FTDI_PID, FTDI_VID};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::time::Duration;
use usb_serial_bridge::discovery::DeviceHandle;
use usb_serial_bridge::port::{DataBits, LineParameters, Parity, StopBits};
use usb_serial_bridge::{Bridge, ResponseStatus};

const WAIT: Duration = Duration::from_secs(2);

async fn call(bridge: &Bridge, request: Value) -> Value {
    let response = bridge.handle_line(&request.to_string()).await;
    serde_json::to_value(response).unwrap()
}

#[tokio::test]
async fn test_full_session_flow() {
    // Arrange
    let harness = TestHarness::new();
    let (bridge, mut rx) = harness.bridge();

    // Act + Assert
    let granted = call(&bridge, json!({"id": 1, "action": "requestPermission"})).await;
    assert_json_contains(
        &granted,
        &json!({
            "id": 1,
            "status": "ok",
            "data": {"portName": "/dev/ttyACM0", "vid": 0x2341, "pid": 0x0043}
        }),
    );

    let opened = call(
        &bridge,
        json!({"id": 2, "action": "openSerial", "opts": {"baudRate": 115200, "dtr": true}}),
    )
    .await;
    assert_eq!(
        opened,
        json!({"id": 2, "status": "ok", "message": "Serial port opened!"})
    );
    assert!(harness.device.dtr());

    let registered = call(&bridge, json!({"id": 3, "action": "registerReadCallback"})).await;
    assert_eq!(
        registered,
        json!({"id": 3, "status": "ok", "data": {"registerReadCallback": "true"}})
    );

    let written = call(
        &bridge,
        json!({"id": 4, "action": "writeSerial", "data": "AT\r\n"}),
    )
    .await;
    assert_json_contains(&written, &json!({"status": "ok", "message": "4 character written."}));

    harness.device.enqueue_read(b"OK\r\n");
    let data = collect_data(&mut rx, 4, WAIT).await;
    assert_eq!(data, vec![0x4F, 0x4B, 0x0D, 0x0A]);
    assert_eq!(
        next_data_event(&mut rx, Duration::from_millis(200)).await,
        None,
        "reply delivered more than once"
    );

    let closed = call(&bridge, json!({"id": 5, "action": "closeSerial"})).await;
    assert_json_contains(&closed, &json!({"status": "ok", "message": "Serial port closed!"}));
    assert_eq!(harness.device.open_handles(), 0);
}

#[tokio::test]
async fn test_open_defaults_fill_missing_fields() {
    let harness = TestHarness::new();
    let (bridge, _rx) = harness.bridge();
    call(&bridge, json!({"action": "requestPermission"})).await;

    call(
        &bridge,
        json!({"action": "openSerial", "opts": {"dataBits": 7, "stopBits": 2, "parity": 1}}),
    )
    .await;

    assert_eq!(
        harness.device.applied_parameters(),
        vec![LineParameters {
            baud_rate: 9600,
            data_bits: DataBits::Seven,
            stop_bits: StopBits::Two,
            parity: Parity::Odd,
            dtr_enabled: false,
            rts_enabled: false,
        }]
    );
}

#[tokio::test]
async fn test_open_without_options_uses_bridge_defaults() {
    let harness = TestHarness::new();
    let (tx, _rx) = usb_serial_bridge::bridge::outbound_channel();
    let defaults = usb_serial_bridge::OpenOptions {
        parameters: LineParameters {
            baud_rate: 38400,
            ..Default::default()
        },
        sleep_on_background: false,
    };
    let bridge = Bridge::new(harness.handle.clone(), tx).with_open_defaults(defaults);
    call(&bridge, json!({"action": "requestPermission"})).await;

    let opened = call(&bridge, json!({"action": "openSerial"})).await;
    assert_eq!(opened["status"], "ok");

    let status = call(&bridge, json!({"action": "status"})).await;
    assert_json_contains(
        &status,
        &json!({
            "status": "ok",
            "data": {
                "open": true,
                "sleepOnBackground": false,
                "parameters": {"baudRate": 38400}
            }
        }),
    );
}

#[tokio::test]
async fn test_errors_carry_kind_and_echo_id() {
    let harness = TestHarness::new();
    let (bridge, _rx) = harness.bridge();

    let open = call(&bridge, json!({"id": "a", "action": "openSerial"})).await;
    assert_eq!(
        open,
        json!({
            "id": "a",
            "status": "error",
            "message": "Request permissions before attempting opening port",
            "kind": "permissionNotGranted"
        })
    );

    let write = call(&bridge, json!({"id": "b", "action": "writeSerial", "data": "x"})).await;
    assert_json_contains(
        &write,
        &json!({"id": "b", "status": "error", "message": "Writing a closed port.", "kind": "portNotOpen"}),
    );

    let unknown = call(&bridge, json!({"id": "c", "action": "readSerial"})).await;
    assert_json_contains(&unknown, &json!({"id": "c", "status": "error", "kind": "invalidArgument"}));
}

#[tokio::test]
async fn test_malformed_line() {
    let harness = TestHarness::new();
    let (bridge, _rx) = harness.bridge();

    let response = bridge.handle_line("{not json").await;

    assert_eq!(response.status, ResponseStatus::Error);
    assert!(response.id.is_none());
    assert_eq!(
        response.kind,
        Some(usb_serial_bridge::ErrorKind::InvalidArgument)
    );
}

#[tokio::test]
async fn test_invalid_open_options_rejected() {
    let harness = TestHarness::new();
    let (bridge, _rx) = harness.bridge();
    call(&bridge, json!({"action": "requestPermission"})).await;

    for opts in [
        json!({"baudRate": 0}),
        json!({"dataBits": 9}),
        json!({"parity": 5}),
        json!({"stopBits": 4}),
        json!("fast"),
    ] {
        let response = call(&bridge, json!({"action": "openSerial", "opts": opts})).await;
        assert_json_contains(&response, &json!({"status": "error", "kind": "invalidArgument"}));
    }
    assert_eq!(harness.provider.open_attempts(), 0);
}

#[tokio::test]
async fn test_write_hex() {
    let harness = TestHarness::new();
    let (bridge, _rx) = harness.bridge();
    call(&bridge, json!({"action": "requestPermission"})).await;
    call(&bridge, json!({"action": "openSerial"})).await;

    let written = call(
        &bridge,
        json!({"action": "writeSerialHex", "data": "41 54 0d 0A"}),
    )
    .await;
    assert_json_contains(&written, &json!({"status": "ok", "message": "4 character written."}));
    assert_eq!(harness.device.write_log(), vec![b"AT\r\n".to_vec()]);

    let bad = call(&bridge, json!({"action": "writeSerialHex", "data": "4G"})).await;
    assert_json_contains(&bad, &json!({"status": "error", "kind": "invalidArgument"}));
}

#[tokio::test]
async fn test_permission_with_hex_string_ids() {
    let harness = TestHarness::new();
    harness
        .provider
        .attach(DeviceHandle::new("/dev/ttyUSB0", FTDI_VID, FTDI_PID));
    let (bridge, _rx) = harness.bridge();

    let response = call(
        &bridge,
        json!({
            "action": "requestPermission",
            "opts": {"vid": "0403", "pid": "0x6001", "driver": "FtdiSerialDriver"}
        }),
    )
    .await;

    assert_json_contains(
        &response,
        &json!({
            "status": "ok",
            "data": {"portName": "/dev/ttyUSB0", "driver": "FtdiSerialDriver"}
        }),
    );
}

#[tokio::test]
async fn test_echo_device_streams_writes_back() {
    let harness = TestHarness::new();
    harness.device.set_echo(true);
    let (bridge, mut rx) = harness.bridge();
    call(&bridge, json!({"action": "requestPermission"})).await;
    call(&bridge, json!({"action": "openSerial"})).await;
    call(&bridge, json!({"action": "registerReadCallback"})).await;

    call(&bridge, json!({"action": "writeSerial", "data": "ping"})).await;
    call(&bridge, json!({"action": "writeSerial", "data": "pong"})).await;

    let data = collect_data(&mut rx, 8, WAIT).await;
    assert_eq!(data, b"pingpong".to_vec());
}

#[tokio::test]
async fn test_no_events_without_callback() {
    let harness = TestHarness::new();
    let (bridge, mut rx) = harness.bridge();
    call(&bridge, json!({"action": "requestPermission"})).await;
    call(&bridge, json!({"action": "openSerial"})).await;

    harness.device.enqueue_read(b"dropped");

    assert!(next_data_event(&mut rx, Duration::from_millis(200))
        .await
        .is_none());
}

#[tokio::test]
async fn test_lifecycle_actions() {
    let harness = TestHarness::new();
    let (bridge, _rx) = harness.bridge();
    call(&bridge, json!({"action": "requestPermission"})).await;
    call(&bridge, json!({"action": "openSerial"})).await;

    let paused = call(&bridge, json!({"action": "pause"})).await;
    assert_json_contains(&paused, &json!({"status": "ok", "message": "Session paused"}));
    let status = call(&bridge, json!({"action": "status"})).await;
    assert_json_contains(&status, &json!({"data": {"open": false, "suspended": true}}));

    let resumed = call(&bridge, json!({"action": "resume"})).await;
    assert_json_contains(&resumed, &json!({"status": "ok", "message": "Session resumed"}));
    let status = call(&bridge, json!({"action": "status"})).await;
    assert_json_contains(&status, &json!({"data": {"open": true, "readerActive": true}}));

    let destroyed = call(&bridge, json!({"action": "destroy"})).await;
    assert_json_contains(&destroyed, &json!({"status": "ok", "message": "Session destroyed"}));
    assert_eq!(harness.device.open_handles(), 0);
}

#[tokio::test]
async fn test_worker_stopped_after_shutdown() {
    let harness = TestHarness::new();
    let (bridge, _rx) = harness.bridge();
    harness.handle.shutdown().await.unwrap();

    let response = call(&bridge, json!({"id": 9, "action": "status"})).await;

    assert_json_contains(
        &response,
        &json!({"id": 9, "status": "error", "kind": "workerStopped"}),
    );
}

#[tokio::test]
async fn test_unread_events_leave_bytes_with_device() {
    let harness = TestHarness::new();
    let (tx, rx) = tokio::sync::mpsc::channel(2);
    let bridge = Bridge::new(harness.handle.clone(), tx);
    call(&bridge, json!({"action": "requestPermission"})).await;
    call(&bridge, json!({"action": "openSerial"})).await;
    call(&bridge, json!({"action": "registerReadCallback"})).await;

    for _ in 0..32 {
        harness.device.enqueue_read(&[0xAA; 4096]);
    }
    tokio::time::sleep(Duration::from_millis(300)).await;

    // Two events queued, one held by the waiting reader, the rest still unread
    assert_eq!(rx.len(), 2);
    assert!(harness.device.available_bytes() >= 29 * 4096);

    drop(rx);
    let closed = call(&bridge, json!({"action": "closeSerial"})).await;
    assert_eq!(closed["status"], "ok");
    assert_eq!(harness.device.open_handles(), 0);
}
