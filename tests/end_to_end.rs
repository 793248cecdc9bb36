//! End-to-end tests through the umbrella crate.
//!
//! A host adapter and a device-side engine exchange files over virtual ports.

use midibridge::core::{NoFiles, NoopEvents};
use midibridge::prelude::*;
use std::sync::Arc;
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(2);

fn next_finish(events: &crossbeam_channel::Receiver<BridgeEvent>) -> Option<(String, String)> {
    let deadline = Instant::now() + WAIT;
    while let Ok(event) = events.recv_deadline(deadline) {
        if let BridgeEvent::ReceiveFinish { path, data, .. } = event {
            return Some((path, data));
        }
    }
    None
}

#[test]
fn test_fetch_and_return_device_file() -> midibridge::Result<()> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let dir = tempfile::tempdir().expect("temp dir");
    std::fs::create_dir(dir.path().join("lib")).expect("lib dir");
    let original = "Inputs = [\n    { \"assignment\": PA_MIDICAPTAIN_NANO_SWITCH_1 },\n]\n";
    std::fs::write(dir.path().join("lib/inputs.py"), original).expect("write");

    let midi = Arc::new(VirtualMidi::new());
    let device = midi.add_device("PySwitch MIDICAPTAIN", "Paint Audio")?;
    let (device_listener, device_events) = EventChannel::unbounded();
    device.serve(
        BridgeConfig::default(),
        DirectorySource::new(dir.path()),
        device_listener,
    )?;

    let adapter = TransportAdapter::builder()
        .access(midi.clone())
        .config(AdapterConfig::default())
        .build()?;
    let connection = adapter.connect("PySwitch MIDICAPTAIN", WAIT)?;
    let (listener, events) = EventChannel::unbounded();
    connection.set_listener(Arc::new(listener));

    // Pull the file from the device
    connection.with_bridge(|bridge| bridge.request("lib/inputs.py", 10))?;
    let (path, fetched) = next_finish(&events).expect("file fetched");
    assert_eq!(path, "lib/inputs.py");
    assert_eq!(fetched, original);

    // Edit it and push it back
    let edited = fetched.replace("SWITCH_1", "SWITCH_2");
    let id = connection.with_bridge(|bridge| {
        bridge.send_string("lib/inputs.py", &edited, 10, TransmissionType::File)
    })?;
    assert_eq!(
        next_finish(&device_events),
        Some(("lib/inputs.py".to_string(), edited))
    );

    // The sender hears the final ack
    let deadline = Instant::now() + WAIT;
    let mut acked = false;
    while let Ok(event) = events.recv_deadline(deadline) {
        if event == (BridgeEvent::ReceiveAck { id }) {
            acked = true;
            break;
        }
    }
    assert!(acked, "final ack for {id} never arrived");
    assert!(connection.with_bridge(|bridge| bridge.pending_sends().is_empty()));
    Ok(())
}

#[test]
fn test_missing_device_file_reported() -> midibridge::Result<()> {
    let midi = Arc::new(VirtualMidi::new());
    let device = midi.add_device("PySwitch", "")?;
    device.serve(BridgeConfig::default(), NoFiles, NoopEvents)?;

    let adapter = TransportAdapter::builder().access(midi).build()?;
    let connection = adapter.connect("PySwitch", WAIT)?;
    let (listener, events) = EventChannel::unbounded();
    connection.set_listener(Arc::new(listener));

    connection.with_bridge(|bridge| bridge.request("../outside.py", 16))?;

    let event = events.recv_timeout(WAIT).expect("error reported");
    assert!(matches!(event, BridgeEvent::ReceiveStart { kind: TransmissionType::Error, .. }));

    let deadline = Instant::now() + WAIT;
    loop {
        match events.recv_deadline(deadline) {
            Ok(BridgeEvent::Error { message }) => {
                assert_eq!(message, "File not found: ../outside.py");
                break;
            }
            Ok(_) => continue,
            Err(e) => panic!("no error event: {e}"),
        }
    }
    Ok(())
}

#[test]
fn test_unanswered_connect_is_timeout() {
    let midi = Arc::new(VirtualMidi::new());
    midi.add_device("Keyboard", "").expect("device");

    let adapter = TransportAdapter::builder()
        .access(midi)
        .build()
        .expect("adapter");
    let err: midibridge::Error = adapter
        .connect("Keyboard", Duration::from_millis(50))
        .unwrap_err()
        .into();
    assert!(err.is_timeout());
}
