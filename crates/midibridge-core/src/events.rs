//! Lifecycle notifications emitted by the bridge engine.
//!
//! Every method has a default, so listeners only implement what they observe.
//! The default `on_error` logs; all other defaults do nothing.

use crate::transmission::{TransmissionId, TransmissionType};
use crossbeam_channel::Sender;
use std::sync::Arc;
use tracing::{debug, error, info};

pub trait BridgeEvents: Send + Sync {
    /// A DATA message for `chunk` has been handed to the sink.
    fn on_send_progress(
        &self,
        _path: &str,
        _id: TransmissionId,
        _chunk: u32,
        _num_chunks: u32,
        _kind: TransmissionType,
    ) {
    }

    fn on_receive_start(
        &self,
        _path: &str,
        _id: TransmissionId,
        _kind: TransmissionType,
        _num_chunks: u32,
    ) {
    }

    fn on_receive_progress(&self, _path: &str, _id: TransmissionId, _chunk: u32, _num_chunks: u32) {
    }

    fn on_receive_finish(&self, _path: &str, _id: TransmissionId, _data: &str, _num_chunks: u32) {}

    /// The final chunk of an outgoing transmission was acknowledged.
    fn on_receive_ack(&self, _id: TransmissionId) {}

    /// A peer reported an error, or a local error could not be reported to the peer.
    fn on_error(&self, message: &str) {
        error!("Bridge error: {}", message);
    }
}

impl<T: BridgeEvents + ?Sized> BridgeEvents for Arc<T> {
    fn on_send_progress(
        &self,
        path: &str,
        id: TransmissionId,
        chunk: u32,
        num_chunks: u32,
        kind: TransmissionType,
    ) {
        (**self).on_send_progress(path, id, chunk, num_chunks, kind)
    }

    fn on_receive_start(
        &self,
        path: &str,
        id: TransmissionId,
        kind: TransmissionType,
        num_chunks: u32,
    ) {
        (**self).on_receive_start(path, id, kind, num_chunks)
    }

    fn on_receive_progress(&self, path: &str, id: TransmissionId, chunk: u32, num_chunks: u32) {
        (**self).on_receive_progress(path, id, chunk, num_chunks)
    }

    fn on_receive_finish(&self, path: &str, id: TransmissionId, data: &str, num_chunks: u32) {
        (**self).on_receive_finish(path, id, data, num_chunks)
    }

    fn on_receive_ack(&self, id: TransmissionId) {
        (**self).on_receive_ack(id)
    }

    fn on_error(&self, message: &str) {
        (**self).on_error(message)
    }
}

/// Ignores everything, including errors.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEvents;

impl BridgeEvents for NoopEvents {
    fn on_error(&self, _message: &str) {}
}

/// Logs every milestone.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEvents;

impl BridgeEvents for TracingEvents {
    fn on_send_progress(
        &self,
        path: &str,
        id: TransmissionId,
        chunk: u32,
        num_chunks: u32,
        kind: TransmissionType,
    ) {
        debug!(%id, path, kind = %kind, "sent chunk {}/{}", chunk + 1, num_chunks);
    }

    fn on_receive_start(
        &self,
        path: &str,
        id: TransmissionId,
        kind: TransmissionType,
        num_chunks: u32,
    ) {
        info!(%id, path, kind = %kind, num_chunks, "receiving");
    }

    fn on_receive_progress(&self, path: &str, id: TransmissionId, chunk: u32, num_chunks: u32) {
        debug!(%id, path, "received chunk {}/{}", chunk + 1, num_chunks);
    }

    fn on_receive_finish(&self, path: &str, id: TransmissionId, data: &str, num_chunks: u32) {
        info!(%id, path, num_chunks, bytes = data.len(), "received");
    }

    fn on_receive_ack(&self, id: TransmissionId) {
        info!(%id, "transmission acknowledged");
    }
}

/// Owned form of a bridge notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeEvent {
    SendProgress {
        path: String,
        id: TransmissionId,
        chunk: u32,
        num_chunks: u32,
        kind: TransmissionType,
    },
    ReceiveStart {
        path: String,
        id: TransmissionId,
        kind: TransmissionType,
        num_chunks: u32,
    },
    ReceiveProgress {
        path: String,
        id: TransmissionId,
        chunk: u32,
        num_chunks: u32,
    },
    ReceiveFinish {
        path: String,
        id: TransmissionId,
        data: String,
        num_chunks: u32,
    },
    ReceiveAck {
        id: TransmissionId,
    },
    Error {
        message: String,
    },
}

/// Forwards notifications over a channel. Dropped receivers are ignored.
#[derive(Debug, Clone)]
pub struct EventChannel {
    sender: Sender<BridgeEvent>,
}

impl EventChannel {
    pub fn new(sender: Sender<BridgeEvent>) -> Self {
        Self { sender }
    }

    /// Unbounded channel pair.
    pub fn unbounded() -> (Self, crossbeam_channel::Receiver<BridgeEvent>) {
        let (sender, receiver) = crossbeam_channel::unbounded();
        (Self::new(sender), receiver)
    }

    fn emit(&self, event: BridgeEvent) {
        let _ = self.sender.send(event);
    }
}

impl BridgeEvents for EventChannel {
    fn on_send_progress(
        &self,
        path: &str,
        id: TransmissionId,
        chunk: u32,
        num_chunks: u32,
        kind: TransmissionType,
    ) {
        self.emit(BridgeEvent::SendProgress {
            path: path.to_string(),
            id,
            chunk,
            num_chunks,
            kind,
        });
    }

    fn on_receive_start(
        &self,
        path: &str,
        id: TransmissionId,
        kind: TransmissionType,
        num_chunks: u32,
    ) {
        self.emit(BridgeEvent::ReceiveStart {
            path: path.to_string(),
            id,
            kind,
            num_chunks,
        });
    }

    fn on_receive_progress(&self, path: &str, id: TransmissionId, chunk: u32, num_chunks: u32) {
        self.emit(BridgeEvent::ReceiveProgress {
            path: path.to_string(),
            id,
            chunk,
            num_chunks,
        });
    }

    fn on_receive_finish(&self, path: &str, id: TransmissionId, data: &str, num_chunks: u32) {
        self.emit(BridgeEvent::ReceiveFinish {
            path: path.to_string(),
            id,
            data: data.to_string(),
            num_chunks,
        });
    }

    fn on_receive_ack(&self, id: TransmissionId) {
        self.emit(BridgeEvent::ReceiveAck { id });
    }

    fn on_error(&self, message: &str) {
        self.emit(BridgeEvent::Error {
            message: message.to_string(),
        });
    }
}
