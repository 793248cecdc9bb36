//! List system MIDI ports and probe each pair for a bridge.
//!
//! Run with: cargo run -p midibridge-io --example list_ports -- [filter]

use midibridge_io::{HardwareMidi, MidiAccess, PortType, TransportAdapter};
use std::sync::Arc;

fn main() -> midibridge_io::Result<()> {
    tracing_subscriber::fmt::init();

    let filter = std::env::args().nth(1).unwrap_or_default();
    let midi = Arc::new(HardwareMidi::new()?);

    for port in midi.list_ports() {
        let direction = match port.port_type {
            PortType::Input => "in ",
            PortType::Output => "out",
        };
        println!("{direction} {}", port.name);
    }

    let adapter = TransportAdapter::builder().access(midi).build()?;
    let timeout = adapter.config().connect_timeout();
    let report = adapter.scan(&filter, timeout, |connection| {
        println!("bridge answered on {}", connection.port_name());
        false
    });

    for (port, error) in &report.failed {
        println!("{port}: {error}");
    }
    Ok(())
}
