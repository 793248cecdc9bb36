//! The bridge engine: chunked, acknowledged, checksummed transfers over SysEx.
//!
//! One `Bridge` owns a send table and a receive table keyed by transmission ID.
//! It never blocks and owns no timers: sends advance when acks arrive, receives
//! advance when data arrives, and stale entries are pruned whenever a new
//! transmission starts.
//!
//! ```ignore
//! let (tx, rx) = crossbeam_channel::unbounded();
//! let mut bridge = Bridge::builder(tx).events(TracingEvents).build()?;
//! bridge.send_string("note.txt", "Hello, World!", 5, TransmissionType::File)?;
//! // forward rx to the peer, feed the peer's replies into bridge.receive(..)
//! ```

use crate::clock::{Clock, SystemClock};
use crate::config::BridgeConfig;
use crate::error::{Error, Result};
use crate::events::{BridgeEvents, TracingEvents};
use crate::frame::{Message, SysexMessage};
use crate::packing::MAX_U24;
use crate::source::{FileSource, NoFiles, SysexSink};
use crate::transmission::{
    prune, IdGenerator, ReceiveState, ReceiveTransmission, SendState, SendTransmission,
    TransmissionId, TransmissionType,
};
use std::collections::HashMap;
use tracing::{debug, info, warn};

pub struct Bridge {
    config: BridgeConfig,
    sink: Box<dyn SysexSink>,
    events: Box<dyn BridgeEvents>,
    files: Box<dyn FileSource>,
    clock: Box<dyn Clock>,
    ids: IdGenerator,
    sending: HashMap<TransmissionId, SendTransmission>,
    receiving: HashMap<TransmissionId, ReceiveTransmission>,
}

pub struct BridgeBuilder {
    config: BridgeConfig,
    sink: Box<dyn SysexSink>,
    events: Box<dyn BridgeEvents>,
    files: Box<dyn FileSource>,
    clock: Box<dyn Clock>,
    ids: IdGenerator,
}

impl BridgeBuilder {
    pub fn config(mut self, config: BridgeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn events(mut self, events: impl BridgeEvents + 'static) -> Self {
        self.events = Box::new(events);
        self
    }

    /// Where `send_file` and inbound requests look up files.
    pub fn files(mut self, files: impl FileSource + 'static) -> Self {
        self.files = Box::new(files);
        self
    }

    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Fixed starting point for transmission IDs.
    pub fn id_seed(mut self, seed: u32) -> Self {
        self.ids = IdGenerator::with_seed(seed);
        self
    }

    pub fn build(self) -> Result<Bridge> {
        self.config.validate()?;
        Ok(Bridge {
            config: self.config,
            sink: self.sink,
            events: self.events,
            files: self.files,
            clock: self.clock,
            ids: self.ids,
            sending: HashMap::new(),
            receiving: HashMap::new(),
        })
    }
}

impl Bridge {
    pub fn builder(sink: impl SysexSink + 'static) -> BridgeBuilder {
        BridgeBuilder {
            config: BridgeConfig::default(),
            sink: Box::new(sink),
            events: Box::new(TracingEvents),
            files: Box::new(NoFiles),
            clock: Box::new(SystemClock),
            ids: IdGenerator::new(),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Replace the listener.
    pub fn set_events(&mut self, events: Box<dyn BridgeEvents>) {
        self.events = events;
    }

    // ==================== Outbound ====================

    /// Send the contents of `path`, looked up through the file source.
    pub fn send_file(&mut self, path: &str, chunk_size: usize) -> Result<TransmissionId> {
        validate_request(path, chunk_size)?;

        let contents = self
            .files
            .get_file(path)
            .ok_or_else(|| Error::FileNotFound(path.to_string()))?;
        if contents.is_empty() {
            return Err(Error::InvalidArgument(format!("file {path} is empty")));
        }

        self.start_transmission(
            path.to_string(),
            contents.into_bytes(),
            chunk_size,
            TransmissionType::File,
        )
    }

    /// Send an in-memory string.
    pub fn send_string(
        &mut self,
        path: &str,
        message: &str,
        chunk_size: usize,
        kind: TransmissionType,
    ) -> Result<TransmissionId> {
        validate_request(path, chunk_size)?;
        if message.is_empty() {
            return Err(Error::InvalidArgument("message must not be empty".to_string()));
        }

        self.start_transmission(
            path.to_string(),
            message.as_bytes().to_vec(),
            chunk_size,
            kind,
        )
    }

    /// Ask the peer to send `path`. Creates no local state.
    pub fn request(&mut self, path: &str, chunk_size: usize) -> Result<()> {
        validate_request(path, chunk_size)?;
        debug!(path, chunk_size, "Requesting file");
        self.emit(&Message::Request {
            path: path.to_string(),
            chunk_size: chunk_size as u32,
        });
        Ok(())
    }

    pub fn generate_transmission_id(&mut self) -> TransmissionId {
        self.ids.next_id()
    }

    // ==================== Inbound ====================

    /// Handle one inbound SysEx frame.
    ///
    /// Returns `Ok(false)` for frames that are not bridge traffic. Errors caused by the
    /// message are sent to the peer as an ERROR transmission, or returned when
    /// `rethrow_errors` is configured.
    pub fn receive(&mut self, message: &SysexMessage) -> Result<bool> {
        if message.manufacturer_id != self.config.vendor_tag || message.data.is_empty() {
            return Ok(false);
        }

        let (result, related) = match Message::decode(&message.data) {
            Ok(decoded) => {
                let related = self.related_kind(&decoded);
                (self.dispatch(decoded), related)
            }
            Err(e) => (Err(e), None),
        };

        if let Err(e) = result {
            if self.config.rethrow_errors {
                return Err(e);
            }
            self.reject(e, related);
        }
        Ok(true)
    }

    fn dispatch(&mut self, message: Message) -> Result<()> {
        match message {
            Message::Request { path, chunk_size } => self.handle_request(&path, chunk_size),
            Message::Start {
                id,
                kind,
                num_chunks,
                path,
            } => self.handle_start(id, kind, num_chunks, path),
            Message::Data { id, chunk, bytes } => self.handle_data(id, chunk, bytes),
            Message::Ack { id, chunk } => self.handle_ack(id, chunk),
        }
    }

    fn handle_request(&mut self, path: &str, chunk_size: u32) -> Result<()> {
        debug!(path, chunk_size, "Peer requested file");
        self.send_file(path, chunk_size as usize).map(|_| ())
    }

    fn handle_start(
        &mut self,
        id: TransmissionId,
        kind: TransmissionType,
        num_chunks: u32,
        path: String,
    ) -> Result<()> {
        if num_chunks == 0 {
            return Err(Error::Malformed(format!("transmission {id} announces no chunks")));
        }

        let now = self.clock.now();
        self.prune_stale();

        debug!(%id, path = %path, kind = %kind, num_chunks, "Receive started");
        let transmission = ReceiveTransmission::new(id, path, kind, num_chunks, now);
        if let Some(previous) = self.receiving.insert(id, transmission) {
            debug!(%id, path = %previous.path, "Replaced pending receive");
        }

        if let Some(t) = self.receiving.get(&id) {
            self.events.on_receive_start(&t.path, id, kind, num_chunks);
        }
        Ok(())
    }

    fn handle_data(&mut self, id: TransmissionId, chunk: u32, bytes: Vec<u8>) -> Result<()> {
        let now = self.clock.now();
        let t = self
            .receiving
            .get_mut(&id)
            .ok_or(Error::UnknownTransmission(id))?;

        let expected = t.expected_chunk();
        if chunk != expected {
            return Err(Error::OutOfOrder {
                id,
                expected,
                received: chunk,
            });
        }

        t.buffer.extend_from_slice(&bytes);
        t.last_chunk = Some(chunk);
        t.last_activity = now;

        let num_chunks = t.num_chunks;
        let path = t.path.clone();
        let finished = if chunk + 1 >= num_chunks {
            self.receiving.remove(&id)
        } else {
            None
        };

        self.emit(&Message::Ack { id, chunk });
        self.events.on_receive_progress(&path, id, chunk, num_chunks);

        if let Some(t) = finished {
            let data = String::from_utf8(t.buffer)
                .map_err(|e| Error::Malformed(format!("transmission {id} is not UTF-8: {e}")))?;
            debug!(%id, path = %path, bytes = data.len(), "Receive finished");
            match t.kind {
                TransmissionType::File => {
                    self.events.on_receive_finish(&path, id, &data, num_chunks)
                }
                TransmissionType::Error => self.events.on_error(&data),
            }
        }
        Ok(())
    }

    fn handle_ack(&mut self, id: TransmissionId, chunk: u32) -> Result<()> {
        let now = self.clock.now();
        let t = self
            .sending
            .get_mut(&id)
            .ok_or(Error::UnknownTransmission(id))?;

        let expected = t.awaited_ack();
        if i64::from(chunk) != expected {
            self.sending.remove(&id);
            debug!(%id, expected, received = chunk, "Send abandoned");
            return Err(Error::UnexpectedAck {
                id,
                expected,
                received: chunk,
            });
        }
        t.last_activity = now;

        if t.is_last_sent() {
            self.sending.remove(&id);
            debug!(%id, "Send complete");
            self.events.on_receive_ack(id);
        } else {
            self.send_next_chunk(id);
        }
        Ok(())
    }

    /// Kind of the transmission an inbound message belongs to, if known.
    fn related_kind(&self, message: &Message) -> Option<TransmissionType> {
        match message {
            Message::Request { .. } => None,
            Message::Start { kind, .. } => Some(*kind),
            Message::Data { id, .. } => self.receiving.get(id).map(|t| t.kind),
            Message::Ack { id, .. } => self.sending.get(id).map(|t| t.kind),
        }
    }

    /// Report a rejected message. Failures within ERROR transmissions stay local.
    fn reject(&mut self, error: Error, related: Option<TransmissionType>) {
        let text = error.to_string();
        if error.is_protocol_error() {
            warn!("Rejected bridge message: {}", text);
        } else {
            info!("Peer request failed: {}", text);
        }

        if related == Some(TransmissionType::Error) {
            self.events.on_error(&text);
            return;
        }

        let chunk_size = self.config.error_chunk_size;
        if let Err(e) = self.start_transmission(
            String::new(),
            text.into_bytes(),
            chunk_size,
            TransmissionType::Error,
        ) {
            self.events
                .on_error(&format!("Failed to report error to peer: {e}"));
        }
    }

    // ==================== Transmissions ====================

    fn start_transmission(
        &mut self,
        path: String,
        message: Vec<u8>,
        chunk_size: usize,
        kind: TransmissionType,
    ) -> Result<TransmissionId> {
        let now = self.clock.now();
        self.prune_stale();

        let mut id = self.ids.next_id();
        while self.sending.contains_key(&id) {
            id = self.ids.next_id();
        }

        let transmission = SendTransmission::new(id, path, kind, message, chunk_size, now)?;
        debug!(
            %id,
            path = %transmission.path,
            kind = %kind,
            num_chunks = transmission.num_chunks,
            "Send started"
        );

        self.emit(&Message::Start {
            id,
            kind,
            num_chunks: transmission.num_chunks,
            path: transmission.path.clone(),
        });
        self.sending.insert(id, transmission);
        self.send_next_chunk(id);
        Ok(id)
    }

    fn send_next_chunk(&mut self, id: TransmissionId) {
        let now = self.clock.now();
        let Some(t) = self.sending.get_mut(&id) else {
            return;
        };

        let (chunk, bytes) = t.take_chunk(now);
        let (num_chunks, kind, path) = (t.num_chunks, t.kind, t.path.clone());

        self.emit(&Message::Data { id, chunk, bytes });
        self.events.on_send_progress(&path, id, chunk, num_chunks, kind);
    }

    fn prune_stale(&mut self) {
        let now = self.clock.now();
        let timeout = self.config.transmission_timeout();

        for id in prune(&mut self.sending, now, timeout) {
            debug!(%id, "Send timed out");
        }
        for id in prune(&mut self.receiving, now, timeout) {
            debug!(%id, "Receive timed out");
        }
    }

    fn emit(&self, message: &Message) {
        let frame = SysexMessage::new(self.config.vendor_tag, message.encode());
        self.sink.send(frame);
    }

    // ==================== Inspection ====================

    pub fn pending_sends(&self) -> Vec<SendState> {
        self.sending.values().map(SendTransmission::snapshot).collect()
    }

    pub fn pending_receives(&self) -> Vec<ReceiveState> {
        self.receiving
            .values()
            .map(ReceiveTransmission::snapshot)
            .collect()
    }

    pub fn send_state(&self, id: TransmissionId) -> Option<SendState> {
        self.sending.get(&id).map(SendTransmission::snapshot)
    }

    pub fn receive_state(&self, id: TransmissionId) -> Option<ReceiveState> {
        self.receiving.get(&id).map(ReceiveTransmission::snapshot)
    }
}

fn validate_request(path: &str, chunk_size: usize) -> Result<()> {
    if path.is_empty() {
        return Err(Error::InvalidArgument("path must not be empty".to_string()));
    }
    if chunk_size < 1 || chunk_size > MAX_U24 as usize {
        return Err(Error::InvalidArgument(format!(
            "chunk size {chunk_size} out of range (1-{MAX_U24})"
        )));
    }
    Ok(())
}
