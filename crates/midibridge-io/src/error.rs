//! Error types for port binding and connection management.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("No input/output port pair named '{0}'")]
    PortNotFound(String),

    #[error("Connection attempt already in progress for '{0}'")]
    AttemptInProgress(String),

    #[error("No answer from '{port}' within {duration_ms} ms")]
    Timeout { port: String, duration_ms: u64 },

    #[error("Connection attempt for '{0}' was cancelled")]
    Cancelled(String),

    #[error("MIDI port error: {0}")]
    MidiPort(String),

    #[error("MIDI device error: {0}")]
    MidiDevice(String),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Bridge error: {0}")]
    Bridge(#[from] midibridge_core::Error),
}

#[cfg(feature = "midi-io")]
impl From<midir::InitError> for Error {
    fn from(e: midir::InitError) -> Self {
        Error::MidiDevice(e.to_string())
    }
}

#[cfg(feature = "midi-io")]
impl From<midir::ConnectError<midir::MidiOutput>> for Error {
    fn from(e: midir::ConnectError<midir::MidiOutput>) -> Self {
        Error::MidiPort(e.to_string())
    }
}

#[cfg(feature = "midi-io")]
impl From<midir::ConnectError<midir::MidiInput>> for Error {
    fn from(e: midir::ConnectError<midir::MidiInput>) -> Self {
        Error::MidiPort(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
