//! Port binding, discovery and connection management for the SysEx bridge.
//!
//! A [`TransportAdapter`] owns one bridge engine per connected port pair,
//! wires the engine to a MIDI input and output, and confirms that a bridge
//! answers on the other end before handing out a [`Connection`].
//!
//! Backends implement [`MidiAccess`]. [`VirtualMidi`] is always available;
//! [`HardwareMidi`] needs the `midi-io` feature (on by default).
//!
//! ```ignore
//! use midibridge_io::TransportAdapter;
//! use std::time::Duration;
//!
//! let adapter = TransportAdapter::builder().build()?;
//! adapter.scan("PySwitch", Duration::from_secs(3), |connection| {
//!     connection.with_bridge(|bridge| bridge.request("inputs.py", 100)).is_ok()
//! });
//! ```

pub mod error;
pub use error::{Error, Result};

pub mod config;
pub use config::{AdapterConfig, DEFAULT_PROBE_PATH};

pub mod port;
pub use port::{
    InputListener, MidiAccess, PortInfo, PortType, SysexInput, SysexOutput, VirtualDevice,
    VirtualMidi,
};

#[cfg(feature = "midi-io")]
pub(crate) mod io;
#[cfg(feature = "midi-io")]
pub use io::HardwareMidi;

mod connection;
pub use connection::Connection;

mod adapter;
pub use adapter::{ScanReport, TransportAdapter, TransportAdapterBuilder};
