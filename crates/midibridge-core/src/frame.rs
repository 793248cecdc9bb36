//! Wire framing: SysEx frames and the protocol messages carried inside them.
//!
//! Layout of the SysEx data (after the vendor tag):
//!
//! ```text
//! [kind:1][checksum:3][body...]
//!
//! REQUEST  chunk_size:4  path:*
//! START    id:4  type:1  chunk_count:4  path:*
//! DATA     id:4  chunk_index:4  bytes:*
//! ACK      id:4  chunk_index:4
//! ```
//!
//! Numeric fields are 24-bit big-endian packed to 4 units; strings and chunk bytes
//! are packed as a whole. The checksum covers the unpacked body bytes in field order.

use crate::checksum::{checksum_units, crc16, CHECKSUM_UNITS};
use crate::error::{Error, Result};
use crate::packing::{pack, pack_u24, u24_bytes, u24_from_bytes, unpack, U24_UNITS};
use crate::transmission::{TransmissionId, TransmissionType};

pub const SYSEX_START: u8 = 0xF0;
pub const SYSEX_END: u8 = 0xF7;

/// 3-byte manufacturer ID that marks traffic as ours.
pub type VendorTag = [u8; 3];

/// One SysEx frame, split into vendor tag and data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SysexMessage {
    pub manufacturer_id: VendorTag,
    pub data: Vec<u8>,
}

impl SysexMessage {
    pub fn new(manufacturer_id: VendorTag, data: Vec<u8>) -> Self {
        Self {
            manufacturer_id,
            data,
        }
    }

    /// Parse `F0 tag tag tag data.. F7`. Anything else is not a SysEx frame for us.
    pub fn parse(raw: &[u8]) -> Option<Self> {
        match raw {
            [SYSEX_START, a, b, c, data @ .., SYSEX_END] => Some(Self {
                manufacturer_id: [*a, *b, *c],
                data: data.to_vec(),
            }),
            _ => None,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.data.len() + 5);
        bytes.push(SYSEX_START);
        bytes.extend_from_slice(&self.manufacturer_id);
        bytes.extend_from_slice(&self.data);
        bytes.push(SYSEX_END);
        bytes
    }
}

/// First unit of every protocol message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageKind {
    Request = 0x01,
    Start = 0x02,
    Data = 0x03,
    Ack = 0x04,
}

impl MessageKind {
    pub fn from_unit(unit: u8) -> Result<Self> {
        match unit {
            0x01 => Ok(MessageKind::Request),
            0x02 => Ok(MessageKind::Start),
            0x03 => Ok(MessageKind::Data),
            0x04 => Ok(MessageKind::Ack),
            other => Err(Error::Malformed(format!("unknown message kind {other:#04x}"))),
        }
    }
}

/// Decoded protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Request {
        path: String,
        chunk_size: u32,
    },
    Start {
        id: TransmissionId,
        kind: TransmissionType,
        num_chunks: u32,
        path: String,
    },
    Data {
        id: TransmissionId,
        chunk: u32,
        bytes: Vec<u8>,
    },
    Ack {
        id: TransmissionId,
        chunk: u32,
    },
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Request { .. } => MessageKind::Request,
            Message::Start { .. } => MessageKind::Start,
            Message::Data { .. } => MessageKind::Data,
            Message::Ack { .. } => MessageKind::Ack,
        }
    }

    /// Transmission the message belongs to, if any.
    pub fn transmission_id(&self) -> Option<TransmissionId> {
        match self {
            Message::Request { .. } => None,
            Message::Start { id, .. } | Message::Data { id, .. } | Message::Ack { id, .. } => {
                Some(*id)
            }
        }
    }

    /// Encode to 7-bit units.
    pub fn encode(&self) -> Vec<u8> {
        // (unpacked bytes covered by the checksum, packed body units)
        let mut covered = Vec::new();
        let mut body = Vec::new();

        fn push_u24(covered: &mut Vec<u8>, body: &mut Vec<u8>, value: u32) {
            covered.extend_from_slice(&u24_bytes(value));
            body.extend(pack_u24(value));
        }

        match self {
            Message::Request { path, chunk_size } => {
                push_u24(&mut covered, &mut body, *chunk_size);
                covered.extend_from_slice(path.as_bytes());
                body.extend(pack(path.as_bytes()));
            }
            Message::Start {
                id,
                kind,
                num_chunks,
                path,
            } => {
                push_u24(&mut covered, &mut body, id.value());
                covered.push(kind.to_unit());
                body.push(kind.to_unit());
                push_u24(&mut covered, &mut body, *num_chunks);
                covered.extend_from_slice(path.as_bytes());
                body.extend(pack(path.as_bytes()));
            }
            Message::Data { id, chunk, bytes } => {
                push_u24(&mut covered, &mut body, id.value());
                push_u24(&mut covered, &mut body, *chunk);
                covered.extend_from_slice(bytes);
                body.extend(pack(bytes));
            }
            Message::Ack { id, chunk } => {
                push_u24(&mut covered, &mut body, id.value());
                push_u24(&mut covered, &mut body, *chunk);
            }
        }

        let mut units = Vec::with_capacity(1 + CHECKSUM_UNITS + body.len());
        units.push(self.kind() as u8);
        units.extend(checksum_units(&covered));
        units.extend(body);
        units
    }

    /// Decode 7-bit units, verifying the checksum.
    pub fn decode(units: &[u8]) -> Result<Self> {
        if let Some(bad) = units.iter().find(|&&u| u > 0x7F) {
            return Err(Error::Malformed(format!("unit {bad:#04x} exceeds 7 bits")));
        }
        if units.len() < 1 + CHECKSUM_UNITS {
            return Err(Error::Malformed(format!(
                "message of {} units is too short",
                units.len()
            )));
        }

        let kind = MessageKind::from_unit(units[0])?;
        let checksum = unpack(&units[1..1 + CHECKSUM_UNITS]);
        let expected = u16::from_be_bytes([checksum[0], checksum[1]]);

        let mut reader = BodyReader::new(&units[1 + CHECKSUM_UNITS..]);
        let message = match kind {
            MessageKind::Request => {
                let chunk_size = reader.u24()?;
                let path = reader.rest_string()?;
                Message::Request { path, chunk_size }
            }
            MessageKind::Start => {
                let id = TransmissionId::new(reader.u24()?);
                let kind = TransmissionType::from_unit(reader.raw_unit()?)?;
                let num_chunks = reader.u24()?;
                let path = reader.rest_string()?;
                Message::Start {
                    id,
                    kind,
                    num_chunks,
                    path,
                }
            }
            MessageKind::Data => {
                let id = TransmissionId::new(reader.u24()?);
                let chunk = reader.u24()?;
                let bytes = reader.rest_bytes();
                Message::Data { id, chunk, bytes }
            }
            MessageKind::Ack => {
                let id = TransmissionId::new(reader.u24()?);
                let chunk = reader.u24()?;
                reader.finish()?;
                Message::Ack { id, chunk }
            }
        };

        let actual = crc16(&reader.covered);
        if actual != expected {
            return Err(Error::ChecksumMismatch { expected, actual });
        }
        Ok(message)
    }
}

/// Sequential field reader that records the unpacked bytes for the checksum.
struct BodyReader<'a> {
    units: &'a [u8],
    covered: Vec<u8>,
}

impl<'a> BodyReader<'a> {
    fn new(units: &'a [u8]) -> Self {
        Self {
            units,
            covered: Vec::new(),
        }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.units.len() < n {
            return Err(Error::Malformed("message truncated".to_string()));
        }
        let (head, tail) = self.units.split_at(n);
        self.units = tail;
        Ok(head)
    }

    fn u24(&mut self) -> Result<u32> {
        let bytes = unpack(self.take(U24_UNITS)?);
        let bytes = [bytes[0], bytes[1], bytes[2]];
        self.covered.extend_from_slice(&bytes);
        Ok(u24_from_bytes(bytes))
    }

    fn raw_unit(&mut self) -> Result<u8> {
        let unit = self.take(1)?[0];
        self.covered.push(unit);
        Ok(unit)
    }

    fn rest_bytes(&mut self) -> Vec<u8> {
        let bytes = unpack(self.units);
        self.units = &[];
        self.covered.extend_from_slice(&bytes);
        bytes
    }

    fn rest_string(&mut self) -> Result<String> {
        let bytes = self.rest_bytes();
        String::from_utf8(bytes).map_err(|e| Error::Malformed(format!("path is not UTF-8: {e}")))
    }

    fn finish(&self) -> Result<()> {
        if self.units.is_empty() {
            Ok(())
        } else {
            Err(Error::Malformed(format!(
                "{} trailing units",
                self.units.len()
            )))
        }
    }
}
