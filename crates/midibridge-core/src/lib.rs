//! Chunked transfer protocol over MIDI System Exclusive messages.
//!
//! Moves arbitrarily large strings across a link that only carries small,
//! 7-bit-clean SysEx frames. Payloads are split into chunks, each chunk is
//! acknowledged before the next is sent, and every message carries a CRC-16.
//!
//! # Modules
//!
//! - [`packing`] - 8-bit/7-bit bit-width conversion
//! - [`checksum`] - the protocol CRC-16
//! - [`frame`] - SysEx frames and REQUEST/START/DATA/ACK encoding
//! - [`bridge`] - the engine with its send and receive tables
//! - [`events`] - lifecycle listener trait and ready-made listeners
//!
//! # Example
//!
//! ```ignore
//! use midibridge_core::{Bridge, TransmissionType};
//!
//! let (tx, outbound) = crossbeam_channel::unbounded();
//! let mut bridge = Bridge::builder(tx).build()?;
//! bridge.send_string("note.txt", "Hello, World!", 5, TransmissionType::File)?;
//!
//! // Deliver `outbound` to the peer; hand every reply to `bridge.receive(&frame)`.
//! ```

pub mod error;
pub use error::{Error, Result};

pub mod checksum;
pub mod packing;

pub mod frame;
pub use frame::{Message, MessageKind, SysexMessage, VendorTag};

pub mod transmission;
pub use transmission::{IdGenerator, ReceiveState, SendState, TransmissionId, TransmissionType};

pub mod config;
pub use config::{BridgeConfig, DEFAULT_VENDOR_TAG};

pub mod clock;
pub use clock::{Clock, ManualClock, SystemClock};

pub mod events;
pub use events::{BridgeEvent, BridgeEvents, EventChannel, NoopEvents, TracingEvents};

mod source;
pub use source::{DirectorySource, FileSource, FnSink, FnSource, NoFiles, SysexSink};

pub mod bridge;
pub use bridge::{Bridge, BridgeBuilder};
