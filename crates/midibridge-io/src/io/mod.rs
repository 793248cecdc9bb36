//! Hardware MIDI ports through midir.
//!
//! midir connections live on one dedicated thread. Port handles talk to it
//! over a command channel, so they can be shared and sent freely.

use crate::error::{Error, Result};
use crate::port::{InputListener, MidiAccess, SysexInput, SysexOutput};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use midir::{Ignore, MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};
use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

enum MidiCommand {
    ConnectInput {
        name: String,
        listener: InputListener,
        reply: Sender<Result<()>>,
    },
    DisconnectInput(String),
    Send {
        name: String,
        bytes: Vec<u8>,
    },
}

/// System MIDI backend.
pub struct HardwareMidi {
    client_name: String,
    command_sender: Sender<MidiCommand>,
}

impl HardwareMidi {
    pub fn new() -> Result<Self> {
        Self::with_client_name("midibridge")
    }

    /// `client_name` is how this process shows up in the system's MIDI graph.
    pub fn with_client_name(client_name: &str) -> Result<Self> {
        let (command_sender, command_receiver) = bounded(1024);
        let thread_client = client_name.to_string();

        thread::Builder::new()
            .name("midibridge-midi-thread".to_string())
            .spawn(move || Self::midi_thread(thread_client, command_receiver))
            .map_err(|e| Error::MidiDevice(format!("Failed to spawn MIDI thread: {e}")))?;

        Ok(Self {
            client_name: client_name.to_string(),
            command_sender,
        })
    }

    // Exits once every port handle and the backend itself are dropped.
    fn midi_thread(client_name: String, command_receiver: Receiver<MidiCommand>) {
        let mut inputs: HashMap<String, MidiInputConnection<()>> = HashMap::new();
        let mut outputs: HashMap<String, MidiOutputConnection> = HashMap::new();

        loop {
            match command_receiver.recv_timeout(Duration::from_millis(100)) {
                Ok(MidiCommand::ConnectInput {
                    name,
                    listener,
                    reply,
                }) => {
                    // One connection per port
                    inputs.remove(&name);
                    let result = Self::connect_input(&client_name, &name, listener).map(|conn| {
                        info!(port = %name, "MIDI input connected");
                        inputs.insert(name, conn);
                    });
                    let _ = reply.send(result);
                }
                Ok(MidiCommand::DisconnectInput(name)) => {
                    if let Some(conn) = inputs.remove(&name) {
                        drop(conn);
                        info!(port = %name, "MIDI input disconnected");
                    }
                }
                Ok(MidiCommand::Send { name, bytes }) => {
                    if !outputs.contains_key(&name) {
                        match Self::connect_output(&client_name, &name) {
                            Ok(conn) => {
                                info!(port = %name, "MIDI output connected");
                                outputs.insert(name.clone(), conn);
                            }
                            Err(e) => {
                                warn!(port = %name, "Cannot open MIDI output: {}", e);
                                continue;
                            }
                        }
                    }
                    if let Some(conn) = outputs.get_mut(&name) {
                        if let Err(e) = conn.send(&bytes) {
                            warn!(port = %name, "MIDI send failed: {}", e);
                        }
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        debug!("MIDI thread exiting");
    }

    fn connect_input(
        client_name: &str,
        name: &str,
        listener: InputListener,
    ) -> Result<MidiInputConnection<()>> {
        let mut midi_input = MidiInput::new(&format!("{client_name}-input"))?;
        // SysEx is filtered by default
        midi_input.ignore(Ignore::None);

        let port = midi_input
            .ports()
            .into_iter()
            .find(|p| midi_input.port_name(p).is_ok_and(|n| n == name))
            .ok_or_else(|| Error::PortNotFound(name.to_string()))?;

        let connection = midi_input.connect(
            &port,
            "midibridge-in",
            move |_stamp, bytes, _| listener(bytes),
            (),
        )?;
        Ok(connection)
    }

    fn connect_output(client_name: &str, name: &str) -> Result<MidiOutputConnection> {
        let midi_output = MidiOutput::new(&format!("{client_name}-output"))?;

        let port = midi_output
            .ports()
            .into_iter()
            .find(|p| midi_output.port_name(p).is_ok_and(|n| n == name))
            .ok_or_else(|| Error::PortNotFound(name.to_string()))?;

        Ok(midi_output.connect(&port, "midibridge-out")?)
    }

    fn input_names(&self) -> Vec<String> {
        match MidiInput::new(&format!("{}-list", self.client_name)) {
            Ok(midi_input) => midi_input
                .ports()
                .iter()
                .filter_map(|p| midi_input.port_name(p).ok())
                .collect(),
            Err(e) => {
                warn!("Cannot enumerate MIDI inputs: {}", e);
                Vec::new()
            }
        }
    }

    fn output_names(&self) -> Vec<String> {
        match MidiOutput::new(&format!("{}-list", self.client_name)) {
            Ok(midi_output) => midi_output
                .ports()
                .iter()
                .filter_map(|p| midi_output.port_name(p).ok())
                .collect(),
            Err(e) => {
                warn!("Cannot enumerate MIDI outputs: {}", e);
                Vec::new()
            }
        }
    }
}

impl MidiAccess for HardwareMidi {
    fn inputs(&self) -> Vec<Arc<dyn SysexInput>> {
        self.input_names()
            .into_iter()
            .map(|name| {
                Arc::new(HardwareInput {
                    name,
                    command_sender: self.command_sender.clone(),
                }) as Arc<dyn SysexInput>
            })
            .collect()
    }

    fn outputs(&self) -> Vec<Arc<dyn SysexOutput>> {
        self.output_names()
            .into_iter()
            .map(|name| {
                Arc::new(HardwareOutput {
                    name,
                    command_sender: self.command_sender.clone(),
                }) as Arc<dyn SysexOutput>
            })
            .collect()
    }
}

struct HardwareInput {
    name: String,
    command_sender: Sender<MidiCommand>,
}

impl SysexInput for HardwareInput {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_listener(&self, listener: Option<InputListener>) -> Result<()> {
        let not_running = || Error::MidiDevice("MIDI thread not running".to_string());

        match listener {
            Some(listener) => {
                let (reply, result) = bounded(1);
                self.command_sender
                    .send(MidiCommand::ConnectInput {
                        name: self.name.clone(),
                        listener,
                        reply,
                    })
                    .map_err(|_| not_running())?;
                result.recv().map_err(|_| not_running())?
            }
            None => self
                .command_sender
                .send(MidiCommand::DisconnectInput(self.name.clone()))
                .map_err(|_| not_running()),
        }
    }
}

/// Sends are queued to the MIDI thread; the port is opened on first use.
struct HardwareOutput {
    name: String,
    command_sender: Sender<MidiCommand>,
}

impl SysexOutput for HardwareOutput {
    fn name(&self) -> &str {
        &self.name
    }

    fn send(&self, bytes: &[u8]) -> Result<()> {
        self.command_sender
            .try_send(MidiCommand::Send {
                name: self.name.clone(),
                bytes: bytes.to_vec(),
            })
            .map_err(|e| Error::MidiPort(format!("MIDI output queue unavailable: {e}")))
    }
}
