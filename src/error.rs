//! Centralized error type for the midibridge umbrella crate.
//!
//! Wraps both subsystem errors so `?` propagates naturally across crate boundaries.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Bridge: {0}")]
    Bridge(#[from] midibridge_core::Error),

    #[error("Transport: {0}")]
    Transport(#[from] midibridge_io::Error),
}

impl Error {
    /// Whether the peer never answered in time.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Transport(midibridge_io::Error::Timeout { .. }))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
