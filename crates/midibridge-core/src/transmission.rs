//! Transmission identifiers, types and per-direction transfer state.

use crate::error::{Error, Result};
use crate::packing::MAX_U24;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

/// 24-bit identifier of one logical transfer.
///
/// Unique only among transmissions that are live at the same time; the generator wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransmissionId(u32);

impl TransmissionId {
    /// Values above 24 bits are masked.
    pub const fn new(value: u32) -> Self {
        Self(value & MAX_U24)
    }

    pub const fn value(self) -> u32 {
        self.0
    }
}

impl fmt::Display for TransmissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#08x}", self.0)
    }
}

impl From<TransmissionId> for u32 {
    fn from(id: TransmissionId) -> Self {
        id.0
    }
}

/// Payload kind carried by a transmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransmissionType {
    File,
    Error,
}

impl TransmissionType {
    pub const fn to_unit(self) -> u8 {
        match self {
            TransmissionType::File => 0x01,
            TransmissionType::Error => 0x02,
        }
    }

    pub fn from_unit(unit: u8) -> Result<Self> {
        match unit {
            0x01 => Ok(TransmissionType::File),
            0x02 => Ok(TransmissionType::Error),
            other => Err(Error::Malformed(format!(
                "unknown transmission type {other:#04x}"
            ))),
        }
    }
}

impl fmt::Display for TransmissionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransmissionType::File => write!(f, "file"),
            TransmissionType::Error => write!(f, "error"),
        }
    }
}

/// Lazily seeded, wrapping 24-bit counter.
#[derive(Debug, Default)]
pub struct IdGenerator {
    current: Option<u32>,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start counting from a fixed value instead of a random seed.
    pub fn with_seed(seed: u32) -> Self {
        Self {
            current: Some(seed & MAX_U24),
        }
    }

    pub fn next_id(&mut self) -> TransmissionId {
        let next = match self.current {
            Some(current) => (current + 1) & MAX_U24,
            None => rand::random::<u32>() & MAX_U24,
        };
        self.current = Some(next);
        TransmissionId::new(next)
    }
}

/// Sender-side state of an outgoing transfer.
#[derive(Debug, Clone)]
pub(crate) struct SendTransmission {
    pub id: TransmissionId,
    pub path: String,
    pub kind: TransmissionType,
    /// Bytes not yet handed to a DATA message.
    pub remaining: Vec<u8>,
    pub chunk_size: usize,
    pub next_chunk: u32,
    pub num_chunks: u32,
    pub last_activity: Instant,
}

impl SendTransmission {
    pub fn new(
        id: TransmissionId,
        path: String,
        kind: TransmissionType,
        message: Vec<u8>,
        chunk_size: usize,
        now: Instant,
    ) -> Result<Self> {
        let num_chunks = num_chunks(message.len(), chunk_size)?;
        Ok(Self {
            id,
            path,
            kind,
            remaining: message,
            chunk_size,
            next_chunk: 0,
            num_chunks,
            last_activity: now,
        })
    }

    /// Split off the next chunk and advance the chunk counter.
    pub fn take_chunk(&mut self, now: Instant) -> (u32, Vec<u8>) {
        let split = self.chunk_size.min(self.remaining.len());
        let rest = self.remaining.split_off(split);
        let chunk = std::mem::replace(&mut self.remaining, rest);

        let index = self.next_chunk;
        self.next_chunk += 1;
        self.last_activity = now;
        (index, chunk)
    }

    /// Chunk index the next ack must carry.
    pub fn awaited_ack(&self) -> i64 {
        i64::from(self.next_chunk) - 1
    }

    pub fn is_last_sent(&self) -> bool {
        self.next_chunk >= self.num_chunks
    }

    pub fn snapshot(&self) -> SendState {
        SendState {
            id: self.id,
            path: self.path.clone(),
            kind: self.kind,
            next_chunk: self.next_chunk,
            num_chunks: self.num_chunks,
            remaining_bytes: self.remaining.len(),
        }
    }
}

/// Receiver-side state of an incoming transfer.
#[derive(Debug, Clone)]
pub(crate) struct ReceiveTransmission {
    pub id: TransmissionId,
    pub path: String,
    pub kind: TransmissionType,
    pub num_chunks: u32,
    pub last_chunk: Option<u32>,
    pub buffer: Vec<u8>,
    pub last_activity: Instant,
}

impl ReceiveTransmission {
    pub fn new(
        id: TransmissionId,
        path: String,
        kind: TransmissionType,
        num_chunks: u32,
        now: Instant,
    ) -> Self {
        Self {
            id,
            path,
            kind,
            num_chunks,
            last_chunk: None,
            buffer: Vec::new(),
            last_activity: now,
        }
    }

    pub fn expected_chunk(&self) -> u32 {
        self.last_chunk.map_or(0, |last| last + 1)
    }

    pub fn snapshot(&self) -> ReceiveState {
        ReceiveState {
            id: self.id,
            path: self.path.clone(),
            kind: self.kind,
            expected_chunk: self.expected_chunk(),
            num_chunks: self.num_chunks,
            received_bytes: self.buffer.len(),
        }
    }
}

/// Read-only view of a pending send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendState {
    pub id: TransmissionId,
    pub path: String,
    pub kind: TransmissionType,
    pub next_chunk: u32,
    pub num_chunks: u32,
    pub remaining_bytes: usize,
}

/// Read-only view of a pending receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveState {
    pub id: TransmissionId,
    pub path: String,
    pub kind: TransmissionType,
    pub expected_chunk: u32,
    pub num_chunks: u32,
    pub received_bytes: usize,
}

/// Anything kept in a transmission table.
pub(crate) trait Activity {
    fn last_activity(&self) -> Instant;
}

impl Activity for SendTransmission {
    fn last_activity(&self) -> Instant {
        self.last_activity
    }
}

impl Activity for ReceiveTransmission {
    fn last_activity(&self) -> Instant {
        self.last_activity
    }
}

/// Drop entries idle for longer than `timeout`. Returns the removed IDs.
pub(crate) fn prune<T: Activity>(
    table: &mut HashMap<TransmissionId, T>,
    now: Instant,
    timeout: Duration,
) -> Vec<TransmissionId> {
    let stale: Vec<TransmissionId> = table
        .iter()
        .filter(|(_, t)| now.saturating_duration_since(t.last_activity()) > timeout)
        .map(|(id, _)| *id)
        .collect();

    for id in &stale {
        table.remove(id);
    }
    stale
}

/// `ceil(len / chunk_size)`, bounded by the 24-bit chunk counter.
pub fn num_chunks(len: usize, chunk_size: usize) -> Result<u32> {
    if chunk_size == 0 {
        return Err(Error::InvalidArgument(
            "chunk size must be at least 1".to_string(),
        ));
    }
    let count = len.div_ceil(chunk_size);
    u32::try_from(count)
        .ok()
        .filter(|&c| c <= MAX_U24)
        .ok_or_else(|| {
            Error::TooLarge(format!(
                "{len} bytes need {count} chunks of {chunk_size}, limit is {MAX_U24}"
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_id_masked_and_displayed() {
        let id = TransmissionId::new(0x0123_4567);
        assert_eq!(id.value(), 0x23_4567);
        assert_eq!(id.to_string(), "0x234567");
    }

    #[test]
    fn test_id_generator_wraps() {
        let mut ids = IdGenerator::with_seed(MAX_U24 - 1);
        assert_eq!(ids.next_id().value(), MAX_U24);
        assert_eq!(ids.next_id().value(), 0);
        assert_eq!(ids.next_id().value(), 1);
    }

    #[test]
    fn test_id_generator_random_seed_then_increments() {
        let mut ids = IdGenerator::new();
        let first = ids.next_id().value();
        let second = ids.next_id().value();
        assert!(first <= MAX_U24);
        assert_eq!(second, (first + 1) & MAX_U24);
    }

    #[test]
    fn test_transmission_type_units() {
        for kind in [TransmissionType::File, TransmissionType::Error] {
            assert_eq!(TransmissionType::from_unit(kind.to_unit()).unwrap(), kind);
        }
        assert!(matches!(
            TransmissionType::from_unit(0x7F),
            Err(Error::Malformed(_))
        ));
    }

    #[test]
    fn test_num_chunks() {
        assert_eq!(num_chunks(13, 5).unwrap(), 3);
        assert_eq!(num_chunks(10, 5).unwrap(), 2);
        assert_eq!(num_chunks(1, 100).unwrap(), 1);
        assert!(matches!(num_chunks(10, 0), Err(Error::InvalidArgument(_))));
        assert!(matches!(
            num_chunks(MAX_U24 as usize + 1, 1),
            Err(Error::TooLarge(_))
        ));
    }

    #[test]
    fn test_take_chunk_advances() {
        let now = Instant::now();
        let mut t = SendTransmission::new(
            TransmissionId::new(7),
            "a.txt".into(),
            TransmissionType::File,
            b"Hello, World!".to_vec(),
            5,
            now,
        )
        .unwrap();

        assert_eq!(t.awaited_ack(), -1);
        assert_eq!(t.take_chunk(now), (0, b"Hello".to_vec()));
        assert_eq!(t.awaited_ack(), 0);
        assert_eq!(t.take_chunk(now), (1, b", Wor".to_vec()));
        assert!(!t.is_last_sent());
        assert_eq!(t.take_chunk(now), (2, b"ld!".to_vec()));
        assert!(t.is_last_sent());
        assert!(t.remaining.is_empty());
    }

    #[test]
    fn test_prune_removes_only_stale() {
        let start = Instant::now();
        let mut table = HashMap::new();
        let old = TransmissionId::new(1);
        let fresh = TransmissionId::new(2);
        table.insert(
            old,
            ReceiveTransmission::new(old, "old".into(), TransmissionType::File, 1, start),
        );
        table.insert(
            fresh,
            ReceiveTransmission::new(
                fresh,
                "fresh".into(),
                TransmissionType::File,
                1,
                start + Duration::from_secs(4),
            ),
        );

        let removed = prune(&mut table, start + Duration::from_secs(6), Duration::from_secs(5));
        assert_eq!(removed, vec![old]);
        assert!(table.contains_key(&fresh));
    }

    proptest! {
        #[test]
        fn prop_chunking_reassembles(
            message in proptest::collection::vec(any::<u8>(), 1..2048),
            chunk_size in 1usize..300,
        ) {
            let now = Instant::now();
            let mut t = SendTransmission::new(
                TransmissionId::new(1),
                "p".into(),
                TransmissionType::File,
                message.clone(),
                chunk_size,
                now,
            ).unwrap();

            let mut reassembled = Vec::new();
            let mut sent = 0u32;
            while !t.is_last_sent() {
                let (index, chunk) = t.take_chunk(now);
                prop_assert_eq!(index, sent);
                prop_assert!(!chunk.is_empty() && chunk.len() <= chunk_size);
                reassembled.extend(chunk);
                sent += 1;
            }
            prop_assert_eq!(sent as usize, message.len().div_ceil(chunk_size));
            prop_assert_eq!(reassembled, message);
        }
    }
}
