//! Error types for the bridge engine.

use crate::transmission::TransmissionId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Checksum mismatch: expected {expected:#06x}, got {actual:#06x}")]
    ChecksumMismatch { expected: u16, actual: u16 },

    #[error("Transmission {0} not found")]
    UnknownTransmission(TransmissionId),

    #[error("Transmission {id}: expected chunk {expected}, received {received}")]
    OutOfOrder {
        id: TransmissionId,
        expected: u32,
        received: u32,
    },

    #[error("Transmission {id}: expected ack for chunk {expected}, received {received}")]
    UnexpectedAck {
        id: TransmissionId,
        expected: i64,
        received: u32,
    },

    #[error("Malformed message: {0}")]
    Malformed(String),

    #[error("Payload too large: {0}")]
    TooLarge(String),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Errors caused by a single inbound message, as opposed to bad caller input.
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            Error::ChecksumMismatch { .. }
                | Error::UnknownTransmission(_)
                | Error::OutOfOrder { .. }
                | Error::UnexpectedAck { .. }
                | Error::Malformed(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
