//! Collaborators the engine talks to: where outbound frames go and where files come from.

use crate::frame::SysexMessage;
use crossbeam_channel::Sender;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

/// Outbound SysEx capability.
pub trait SysexSink: Send {
    fn send(&self, message: SysexMessage);
}

/// Sink backed by a closure.
pub struct FnSink<F>(pub F);

impl<F> SysexSink for FnSink<F>
where
    F: Fn(SysexMessage) + Send,
{
    fn send(&self, message: SysexMessage) {
        (self.0)(message)
    }
}

impl SysexSink for Sender<SysexMessage> {
    fn send(&self, message: SysexMessage) {
        if Sender::send(self, message).is_err() {
            debug!("SysEx sink disconnected, dropping message");
        }
    }
}

/// Resolves a path to file contents for `send_file` and inbound requests.
pub trait FileSource: Send {
    fn get_file(&self, path: &str) -> Option<String>;
}

/// Source with no files at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFiles;

impl FileSource for NoFiles {
    fn get_file(&self, _path: &str) -> Option<String> {
        None
    }
}

impl FileSource for HashMap<String, String> {
    fn get_file(&self, path: &str) -> Option<String> {
        self.get(path).cloned()
    }
}

/// Source backed by a closure.
pub struct FnSource<F>(pub F);

impl<F> FileSource for FnSource<F>
where
    F: Fn(&str) -> Option<String> + Send,
{
    fn get_file(&self, path: &str) -> Option<String> {
        (self.0)(path)
    }
}

/// Serves files below a root directory. Paths leaving the root are refused.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Option<PathBuf> {
        let relative = Path::new(path.trim_start_matches('/'));
        let confined = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !confined {
            warn!(path, "Refusing path outside source root");
            return None;
        }
        Some(self.root.join(relative))
    }
}

impl FileSource for DirectorySource {
    fn get_file(&self, path: &str) -> Option<String> {
        let full = self.resolve(path)?;
        match std::fs::read_to_string(&full) {
            Ok(contents) => Some(contents),
            Err(e) => {
                debug!(path = %full.display(), "File unavailable: {}", e);
                None
            }
        }
    }
}
