//! # midibridge - file transfer over MIDI SysEx
//!
//! Moves text files between a host and a MIDI device that only speaks
//! 7-bit SysEx, with chunking, per-chunk acknowledgement and CRC-16 checks.
//!
//! ## Architecture
//!
//! - **midibridge-core** - Protocol codec and the bridge engine (send/receive tables)
//! - **midibridge-io** - Port abstraction, virtual and hardware ports, connect/scan
//!
//! ## Quick Start
//!
//! ```ignore
//! use midibridge::prelude::*;
//!
//! let adapter = TransportAdapter::builder().build()?;
//! let connection = adapter.connect("PySwitch", std::time::Duration::from_secs(3))?;
//!
//! let (listener, events) = EventChannel::unbounded();
//! connection.set_listener(std::sync::Arc::new(listener));
//! connection.with_bridge(|bridge| bridge.request("inputs.py", 100))?;
//! ```
//!
//! ## Feature Flags
//!
//! - `midi-io` (default) - Hardware MIDI ports via midir

pub mod error;
pub use error::{Error, Result};

/// Re-export of midibridge-core for direct access
pub use midibridge_core as core;

/// Re-export of midibridge-io for direct access
pub use midibridge_io as io;

pub use midibridge_core::{
    Bridge, BridgeBuilder, BridgeConfig, BridgeEvent, BridgeEvents, EventChannel, FileSource,
    SysexMessage, SysexSink, TransmissionId, TransmissionType,
};

pub use midibridge_io::{
    AdapterConfig, Connection, MidiAccess, ScanReport, TransportAdapter, VirtualDevice,
    VirtualMidi,
};

#[cfg(feature = "midi-io")]
pub use midibridge_io::HardwareMidi;

pub mod prelude {
    // Engine
    pub use crate::core::{Bridge, BridgeConfig, TransmissionId, TransmissionType};

    // Listeners and collaborators
    pub use crate::core::{
        BridgeEvent, BridgeEvents, DirectorySource, EventChannel, FileSource, TracingEvents,
    };

    // Transport
    pub use crate::io::{AdapterConfig, Connection, TransportAdapter, VirtualMidi};

    #[cfg(feature = "midi-io")]
    pub use crate::io::HardwareMidi;

    pub use crate::{Error, Result};
}
