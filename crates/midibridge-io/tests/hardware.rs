//! Hardware tests against a real bridge device or a loopback port.
//!
//! All tests are `#[ignore]` so CI doesn't fail without hardware. Set
//! `MIDIBRIDGE_PORT` to a substring of the device's port name (defaults to
//! "PySwitch").
//!
//! Run with:
//!   cargo test -p midibridge-io --test hardware -- --ignored --test-threads=1

#![cfg(feature = "midi-io")]

use midibridge_core::{BridgeEvent, EventChannel};
use midibridge_io::{HardwareMidi, MidiAccess, PortType, TransportAdapter};
use std::sync::Arc;
use std::time::Duration;

fn port_filter() -> String {
    std::env::var("MIDIBRIDGE_PORT").unwrap_or_else(|_| "PySwitch".to_string())
}

#[test]
#[ignore]
fn test_list_system_ports() {
    let midi = HardwareMidi::new().unwrap();
    for port in midi.list_ports() {
        let direction = match port.port_type {
            PortType::Input => "in ",
            PortType::Output => "out",
        };
        println!("{direction} {}", port.name);
    }
}

#[test]
#[ignore]
fn test_scan_finds_device() {
    let adapter = TransportAdapter::builder()
        .access(Arc::new(HardwareMidi::new().unwrap()))
        .build()
        .unwrap();

    let (listener, rx) = EventChannel::unbounded();
    let timeout = adapter.config().connect_timeout();
    let report = adapter.scan(&port_filter(), timeout, |connection| {
        connection.set_listener(Arc::new(listener.clone()));
        connection
            .with_bridge(|bridge| bridge.request("inputs.py", 100))
            .unwrap();
        // Keep the connection alive until the transfer is done
        let finished = rx.recv_timeout(Duration::from_secs(10));
        drop(connection);
        matches!(
            finished,
            Ok(BridgeEvent::ReceiveStart { .. } | BridgeEvent::Error { .. })
        )
    });

    assert!(report.taken.is_some(), "no bridge answered: {report:?}");
}
