//! A bridge engine bound to one input/output port pair.

use crate::port::{SysexInput, SysexOutput};
use arc_swap::ArcSwap;
use crossbeam_channel::Sender;
use midibridge_core::{
    Bridge, BridgeEvents, SysexMessage, SysexSink, TransmissionId, TransmissionType,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Parse raw input bytes and feed bridge frames to the engine.
pub(crate) fn route_frame(bridge: &Mutex<Bridge>, raw: &[u8]) {
    let Some(message) = SysexMessage::parse(raw) else {
        trace!(len = raw.len(), "Ignoring non-SysEx input");
        return;
    };
    match bridge.lock().receive(&message) {
        Ok(true) => {}
        Ok(false) => trace!("Ignoring SysEx from another vendor"),
        Err(e) => warn!("Bridge rejected inbound frame: {}", e),
    }
}

/// Frames engine output onto a MIDI port.
pub(crate) struct OutputSink {
    output: Arc<dyn SysexOutput>,
}

impl OutputSink {
    pub(crate) fn new(output: Arc<dyn SysexOutput>) -> Self {
        Self { output }
    }
}

impl SysexSink for OutputSink {
    fn send(&self, message: SysexMessage) {
        if let Err(e) = self.output.send(&message.to_bytes()) {
            warn!(port = self.output.name(), "Dropping outbound frame: {}", e);
        }
    }
}

/// Signal that a connection attempt has resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AttemptOutcome {
    Answered,
    Cancelled,
}

/// Engine listener of a connection. Answers a pending probe, then forwards to
/// the application listener until the connection is detached.
pub(crate) struct ConnectionEvents {
    active: AtomicBool,
    probe: Mutex<Option<Sender<AttemptOutcome>>>,
    listener: ArcSwap<Option<Arc<dyn BridgeEvents>>>,
}

impl ConnectionEvents {
    pub(crate) fn new(probe: Sender<AttemptOutcome>) -> Self {
        Self {
            active: AtomicBool::new(true),
            probe: Mutex::new(Some(probe)),
            listener: ArcSwap::from_pointee(None),
        }
    }

    pub(crate) fn disarm_probe(&self) {
        self.probe.lock().take();
    }

    fn answer_probe(&self) {
        if let Some(probe) = self.probe.lock().as_ref() {
            let _ = probe.try_send(AttemptOutcome::Answered);
        }
    }

    fn set_listener(&self, listener: Option<Arc<dyn BridgeEvents>>) {
        self.listener.store(Arc::new(listener));
    }

    fn deactivate(&self) {
        self.active.store(false, Ordering::SeqCst);
        self.disarm_probe();
        self.set_listener(None);
    }

    fn forward(&self, f: impl FnOnce(&dyn BridgeEvents)) {
        if !self.active.load(Ordering::SeqCst) {
            return;
        }
        if let Some(listener) = self.listener.load().as_ref() {
            f(listener.as_ref());
        }
    }
}

impl BridgeEvents for ConnectionEvents {
    fn on_send_progress(
        &self,
        path: &str,
        id: TransmissionId,
        chunk: u32,
        num_chunks: u32,
        kind: TransmissionType,
    ) {
        self.forward(|l| l.on_send_progress(path, id, chunk, num_chunks, kind));
    }

    fn on_receive_start(
        &self,
        path: &str,
        id: TransmissionId,
        kind: TransmissionType,
        num_chunks: u32,
    ) {
        self.forward(|l| l.on_receive_start(path, id, kind, num_chunks));
    }

    fn on_receive_progress(&self, path: &str, id: TransmissionId, chunk: u32, num_chunks: u32) {
        self.forward(|l| l.on_receive_progress(path, id, chunk, num_chunks));
    }

    fn on_receive_finish(&self, path: &str, id: TransmissionId, data: &str, num_chunks: u32) {
        self.answer_probe();
        self.forward(|l| l.on_receive_finish(path, id, data, num_chunks));
    }

    fn on_receive_ack(&self, id: TransmissionId) {
        self.forward(|l| l.on_receive_ack(id));
    }

    fn on_error(&self, message: &str) {
        self.answer_probe();
        if !self.active.load(Ordering::SeqCst) {
            return;
        }
        match self.listener.load().as_ref() {
            Some(listener) => listener.on_error(message),
            None => debug!("Bridge error with no listener: {}", message),
        }
    }
}

/// A live bridge on a port pair.
///
/// Dropping the connection detaches it.
pub struct Connection {
    port_name: String,
    bridge: Arc<Mutex<Bridge>>,
    input: Arc<dyn SysexInput>,
    output: Arc<dyn SysexOutput>,
    events: Arc<ConnectionEvents>,
    detached: AtomicBool,
}

impl Connection {
    pub(crate) fn new(
        port_name: &str,
        bridge: Arc<Mutex<Bridge>>,
        input: Arc<dyn SysexInput>,
        output: Arc<dyn SysexOutput>,
        events: Arc<ConnectionEvents>,
    ) -> Self {
        Self {
            port_name: port_name.to_string(),
            bridge,
            input,
            output,
            events,
            detached: AtomicBool::new(false),
        }
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    pub fn bridge(&self) -> &Arc<Mutex<Bridge>> {
        &self.bridge
    }

    /// Run `f` with the engine locked.
    pub fn with_bridge<R>(&self, f: impl FnOnce(&mut Bridge) -> R) -> R {
        f(&mut self.bridge.lock())
    }

    pub fn input(&self) -> &Arc<dyn SysexInput> {
        &self.input
    }

    pub fn output(&self) -> &Arc<dyn SysexOutput> {
        &self.output
    }

    /// Replace the application listener for engine events.
    ///
    /// Callbacks run on the input thread with the engine locked, so they must
    /// not call [`Connection::with_bridge`].
    pub fn set_listener(&self, listener: Arc<dyn BridgeEvents>) {
        if self.is_detached() {
            debug!(port = %self.port_name, "Ignoring listener for detached connection");
            return;
        }
        self.events.set_listener(Some(listener));
    }

    pub fn clear_listener(&self) {
        self.events.set_listener(None);
    }

    /// Stop listening on the input and silence all callbacks. Idempotent.
    pub fn detach(&self) {
        if self.detached.swap(true, Ordering::SeqCst) {
            return;
        }
        self.events.deactivate();
        if let Err(e) = self.input.set_listener(None) {
            warn!(port = %self.port_name, "Failed to release input: {}", e);
        }
        debug!(port = %self.port_name, "Connection detached");
    }

    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::SeqCst)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.detach();
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("port_name", &self.port_name)
            .field("detached", &self.is_detached())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use midibridge_core::{BridgeEvent, EventChannel};

    #[test]
    fn test_events_answer_probe_once_armed() {
        let (probe, outcome) = crossbeam_channel::bounded(2);
        let events = ConnectionEvents::new(probe);

        events.on_receive_progress("x", TransmissionId::new(1), 0, 2);
        assert!(outcome.try_recv().is_err());

        events.on_error("File not found: __midibridge_probe__");
        assert_eq!(outcome.try_recv().unwrap(), AttemptOutcome::Answered);

        events.disarm_probe();
        events.on_receive_finish("x", TransmissionId::new(1), "data", 1);
        assert!(outcome.try_recv().is_err());
    }

    #[test]
    fn test_events_forward_until_deactivated() {
        let (probe, _outcome) = crossbeam_channel::bounded(2);
        let events = ConnectionEvents::new(probe);
        let (listener, rx) = EventChannel::unbounded();
        events.set_listener(Some(Arc::new(listener)));

        let id = TransmissionId::new(7);
        events.on_receive_ack(id);
        assert_eq!(rx.try_recv().unwrap(), BridgeEvent::ReceiveAck { id });

        events.deactivate();
        events.on_receive_ack(id);
        events.on_error("late");
        assert!(rx.try_recv().is_err());
    }
}
