use criterion::{criterion_group, criterion_main, Criterion};
use serde_json::json;
use std::hint::black_box;
use std::time::Duration;
use usb_serial_bridge::session::{decode_hex, OpenOptions};
use usb_serial_bridge::{DataEvent, Outbound, Request};

pub fn bench_request_parsing(c: &mut Criterion) {
    let write = r#"{"id":3,"action":"writeSerial","data":"ATZ\r\n"}"#;
    c.bench_function("parse_write_request", |b| {
        b.iter(|| {
            let v: Request = serde_json::from_str(black_box(write)).unwrap();
            black_box(v);
        })
    });

    let open = json!({"baudRate": 115200, "dataBits": 8, "dtr": true});
    let defaults = OpenOptions::default();
    c.bench_function("merge_open_options", |b| {
        b.iter(|| {
            let options = OpenOptions::from_json(Some(black_box(&open)), &defaults).unwrap();
            black_box(options);
        })
    });
}

pub fn bench_payloads(c: &mut Criterion) {
    let hex = "48656c6c6f2c20576f726c64210d0a".repeat(16);
    c.bench_function("decode_hex_payload", |b| {
        b.iter(|| black_box(decode_hex(black_box(&hex)).unwrap()))
    });

    let chunk = vec![0x4Fu8; 4096];
    c.bench_function("serialize_data_event", |b| {
        b.iter(|| {
            let event = Outbound::Event(DataEvent::new(black_box(&chunk)));
            black_box(serde_json::to_string(&event).unwrap());
        })
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default()
        .warm_up_time(Duration::from_millis(300))
        .measurement_time(Duration::from_secs(2));
    targets = bench_request_parsing, bench_payloads
}
criterion_main!(benches);
