//! In-memory MIDI ports for tests and simulations.
//!
//! Each [`VirtualDevice`] is a pair of one-way wires. Bytes pushed into a wire
//! are delivered in order on that wire's own thread, so a listener may send a
//! reply without re-entering the caller.

use super::{InputListener, MidiAccess, SysexInput, SysexOutput};
use crate::connection::route_frame;
use crate::error::{Error, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use midibridge_core::{Bridge, BridgeConfig, BridgeEvents, FileSource, FnSink, SysexMessage};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::thread;
use tracing::{debug, trace};

struct Wire {
    sender: Sender<Vec<u8>>,
    listener: Arc<Mutex<Option<InputListener>>>,
}

impl Wire {
    fn new(name: &str) -> Result<Self> {
        let (sender, receiver) = unbounded();
        let listener = Arc::new(Mutex::new(None));
        let worker_listener = Arc::clone(&listener);

        thread::Builder::new()
            .name(format!("midibridge-wire-{name}"))
            .spawn(move || Self::delivery_thread(receiver, worker_listener))
            .map_err(|e| Error::MidiDevice(format!("Failed to spawn delivery thread: {e}")))?;

        Ok(Self { sender, listener })
    }

    // Runs until every sender is gone.
    fn delivery_thread(receiver: Receiver<Vec<u8>>, listener: Arc<Mutex<Option<InputListener>>>) {
        for bytes in receiver.iter() {
            let current = listener.lock().clone();
            match current {
                Some(listener) => listener(&bytes),
                None => trace!(len = bytes.len(), "No listener, dropping bytes"),
            }
        }
    }

    fn push(&self, bytes: &[u8]) -> Result<()> {
        self.sender
            .send(bytes.to_vec())
            .map_err(|_| Error::MidiPort("virtual wire closed".to_string()))
    }

    fn set_listener(&self, listener: Option<InputListener>) {
        *self.listener.lock() = listener;
    }

    fn has_listener(&self) -> bool {
        self.listener.lock().is_some()
    }
}

struct DeviceInner {
    name: String,
    manufacturer: String,
    /// Device to host: the host's input port.
    to_host: Wire,
    /// Host to device: the host's output port.
    from_host: Wire,
}

/// The far end of a virtual port pair.
#[derive(Clone)]
pub struct VirtualDevice {
    inner: Arc<DeviceInner>,
}

impl VirtualDevice {
    fn new(name: &str, manufacturer: &str) -> Result<Self> {
        Ok(Self {
            inner: Arc::new(DeviceInner {
                name: name.to_string(),
                manufacturer: manufacturer.to_string(),
                to_host: Wire::new(&format!("{name}-in"))?,
                from_host: Wire::new(&format!("{name}-out"))?,
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Bytes appear on the host's input port.
    pub fn send_to_host(&self, bytes: &[u8]) -> Result<()> {
        self.inner.to_host.push(bytes)
    }

    /// Receive whatever the host writes to its output port.
    pub fn set_listener(&self, listener: Option<InputListener>) {
        self.inner.from_host.set_listener(listener);
    }

    /// Whether something on the host side listens to this device.
    pub fn host_listening(&self) -> bool {
        self.inner.to_host.has_listener()
    }

    /// Run a bridge engine on the device end. It answers the host until the
    /// device listener is replaced.
    pub fn serve(
        &self,
        config: BridgeConfig,
        files: impl FileSource + 'static,
        events: impl BridgeEvents + 'static,
    ) -> Result<Arc<Mutex<Bridge>>> {
        let to_host = self.inner.to_host.sender.clone();
        let sink = FnSink(move |message: SysexMessage| {
            if to_host.send(message.to_bytes()).is_err() {
                debug!("Virtual device reply dropped: wire closed");
            }
        });

        let bridge = Bridge::builder(sink)
            .config(config)
            .files(files)
            .events(events)
            .build()?;
        let bridge = Arc::new(Mutex::new(bridge));

        let serving = Arc::clone(&bridge);
        self.set_listener(Some(Arc::new(move |raw: &[u8]| route_frame(&serving, raw))));
        Ok(bridge)
    }
}

struct VirtualInput(Arc<DeviceInner>);

impl SysexInput for VirtualInput {
    fn name(&self) -> &str {
        &self.0.name
    }

    fn manufacturer(&self) -> &str {
        &self.0.manufacturer
    }

    fn set_listener(&self, listener: Option<InputListener>) -> Result<()> {
        self.0.to_host.set_listener(listener);
        Ok(())
    }
}

struct VirtualOutput(Arc<DeviceInner>);

impl SysexOutput for VirtualOutput {
    fn name(&self) -> &str {
        &self.0.name
    }

    fn manufacturer(&self) -> &str {
        &self.0.manufacturer
    }

    fn send(&self, bytes: &[u8]) -> Result<()> {
        self.0.from_host.push(bytes)
    }
}

/// In-memory MIDI backend.
#[derive(Default)]
pub struct VirtualMidi {
    devices: RwLock<Vec<VirtualDevice>>,
}

impl VirtualMidi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an input/output pair named `name`.
    pub fn add_device(&self, name: &str, manufacturer: &str) -> Result<VirtualDevice> {
        let device = VirtualDevice::new(name, manufacturer)?;
        self.devices.write().push(device.clone());
        Ok(device)
    }

    /// Returns false when no device had that name.
    pub fn remove_device(&self, name: &str) -> bool {
        let mut devices = self.devices.write();
        let before = devices.len();
        devices.retain(|d| d.name() != name);
        devices.len() != before
    }

    pub fn device(&self, name: &str) -> Option<VirtualDevice> {
        self.devices.read().iter().find(|d| d.name() == name).cloned()
    }
}

impl MidiAccess for VirtualMidi {
    fn inputs(&self) -> Vec<Arc<dyn SysexInput>> {
        self.devices
            .read()
            .iter()
            .map(|d| Arc::new(VirtualInput(Arc::clone(&d.inner))) as Arc<dyn SysexInput>)
            .collect()
    }

    fn outputs(&self) -> Vec<Arc<dyn SysexOutput>> {
        self.devices
            .read()
            .iter()
            .map(|d| Arc::new(VirtualOutput(Arc::clone(&d.inner))) as Arc<dyn SysexOutput>)
            .collect()
    }
}
