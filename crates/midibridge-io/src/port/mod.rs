//! Port abstraction over MIDI backends.
//!
//! A backend exposes named inputs and outputs that carry raw SysEx frames.
//! Hardware ports come from [`crate::io::HardwareMidi`], in-memory ports from
//! [`VirtualMidi`].

mod virtual_port;

pub use virtual_port::{VirtualDevice, VirtualMidi};

use crate::error::Result;
use std::sync::Arc;

/// Callback for raw bytes arriving on an input. Called from a backend thread.
pub type InputListener = Arc<dyn Fn(&[u8]) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortType {
    Input,
    Output,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    pub name: String,
    pub manufacturer: String,
    pub port_type: PortType,
}

pub trait SysexInput: Send + Sync {
    fn name(&self) -> &str;

    fn manufacturer(&self) -> &str {
        ""
    }

    /// Install or clear the inbound listener. At most one listener is active.
    fn set_listener(&self, listener: Option<InputListener>) -> Result<()>;
}

pub trait SysexOutput: Send + Sync {
    fn name(&self) -> &str;

    fn manufacturer(&self) -> &str {
        ""
    }

    fn send(&self, bytes: &[u8]) -> Result<()>;
}

/// Enumerates the ports of one backend.
pub trait MidiAccess: Send + Sync {
    fn inputs(&self) -> Vec<Arc<dyn SysexInput>>;

    fn outputs(&self) -> Vec<Arc<dyn SysexOutput>>;

    fn list_ports(&self) -> Vec<PortInfo> {
        let inputs = self.inputs().into_iter().map(|p| PortInfo {
            name: p.name().to_string(),
            manufacturer: p.manufacturer().to_string(),
            port_type: PortType::Input,
        });
        let outputs = self.outputs().into_iter().map(|p| PortInfo {
            name: p.name().to_string(),
            manufacturer: p.manufacturer().to_string(),
            port_type: PortType::Output,
        });
        inputs.chain(outputs).collect()
    }
}

impl<T: MidiAccess + ?Sized> MidiAccess for Arc<T> {
    fn inputs(&self) -> Vec<Arc<dyn SysexInput>> {
        (**self).inputs()
    }

    fn outputs(&self) -> Vec<Arc<dyn SysexOutput>> {
        (**self).outputs()
    }
}

/// Names present as both an input and an output whose name contains `filter`,
/// ignoring case. Order follows the input list, without duplicates.
pub fn matching_pairs(access: &dyn MidiAccess, filter: &str) -> Vec<String> {
    let filter = filter.to_lowercase();
    let outputs: Vec<String> = access
        .outputs()
        .iter()
        .map(|p| p.name().to_string())
        .collect();

    let mut names: Vec<String> = Vec::new();
    for input in access.inputs() {
        let name = input.name();
        if name.to_lowercase().contains(&filter)
            && outputs.iter().any(|o| o == name)
            && !names.iter().any(|n| n == name)
        {
            names.push(name.to_string());
        }
    }
    names
}

/// Input and output with exactly `name`.
pub fn find_pair(
    access: &dyn MidiAccess,
    name: &str,
) -> Option<(Arc<dyn SysexInput>, Arc<dyn SysexOutput>)> {
    let input = access.inputs().into_iter().find(|p| p.name() == name)?;
    let output = access.outputs().into_iter().find(|p| p.name() == name)?;
    Some((input, output))
}
