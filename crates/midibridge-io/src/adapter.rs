//! Discovery and connection management.
//!
//! `connect` binds a fresh bridge engine to a port pair and waits until the
//! device answers a probe request. `scan` does that for every matching pair
//! in parallel and hands each working connection to the caller.

use crate::config::AdapterConfig;
use crate::connection::{route_frame, AttemptOutcome, Connection, ConnectionEvents, OutputSink};
use crate::error::{Error, Result};
use crate::port::{find_pair, matching_pairs, MidiAccess, SysexInput, SysexOutput};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use midibridge_core::Bridge;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Outcome of a [`TransportAdapter::scan`].
#[derive(Debug, Default)]
pub struct ScanReport {
    /// Ports that answered, in completion order.
    pub connected: Vec<String>,
    /// Port whose connection the caller kept, if any.
    pub taken: Option<String>,
    pub failed: Vec<(String, Error)>,
}

pub struct TransportAdapter {
    access: Arc<dyn MidiAccess>,
    config: AdapterConfig,
    attempts: DashMap<String, Sender<AttemptOutcome>>,
}

#[derive(Default)]
pub struct TransportAdapterBuilder {
    access: Option<Arc<dyn MidiAccess>>,
    config: AdapterConfig,
}

impl TransportAdapterBuilder {
    /// Use the given backend instead of system MIDI.
    pub fn access(mut self, access: Arc<dyn MidiAccess>) -> Self {
        self.access = Some(access);
        self
    }

    pub fn config(mut self, config: AdapterConfig) -> Self {
        self.config = config;
        self
    }

    /// Falls back to system MIDI when no backend was given.
    pub fn build(self) -> Result<TransportAdapter> {
        let access = match self.access {
            Some(access) => access,
            #[cfg(feature = "midi-io")]
            None => Arc::new(crate::io::HardwareMidi::new()?),
            #[cfg(not(feature = "midi-io"))]
            None => {
                return Err(Error::InvalidConfig(
                    "no MIDI backend; enable `midi-io` or pass one to `access`".to_string(),
                ))
            }
        };
        TransportAdapter::new(access, self.config)
    }
}

impl TransportAdapter {
    pub fn builder() -> TransportAdapterBuilder {
        TransportAdapterBuilder::default()
    }

    pub fn new(access: Arc<dyn MidiAccess>, config: AdapterConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            access,
            config,
            attempts: DashMap::new(),
        })
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    pub fn access(&self) -> &Arc<dyn MidiAccess> {
        &self.access
    }

    /// Port names present as both input and output, filtered by substring.
    pub fn candidates(&self, filter: &str) -> Vec<String> {
        matching_pairs(self.access.as_ref(), filter)
    }

    /// Ports with a connection attempt in flight.
    pub fn pending_attempts(&self) -> Vec<String> {
        self.attempts.iter().map(|e| e.key().clone()).collect()
    }

    // ==================== Connect ====================

    /// Bind a bridge to the pair named `port_name` and wait up to `timeout`
    /// for the device to answer the probe.
    pub fn connect(&self, port_name: &str, timeout: Duration) -> Result<Connection> {
        self.connect_unless(port_name, timeout, &AtomicBool::new(false))
    }

    /// [`connect`](Self::connect) that gives up as `Cancelled` once `abort` is set.
    fn connect_unless(
        &self,
        port_name: &str,
        timeout: Duration,
        abort: &AtomicBool,
    ) -> Result<Connection> {
        let (input, output) = find_pair(self.access.as_ref(), port_name)
            .ok_or_else(|| Error::PortNotFound(port_name.to_string()))?;

        let (outcome_sender, outcome_receiver) = bounded(2);
        match self.attempts.entry(port_name.to_string()) {
            Entry::Occupied(_) => return Err(Error::AttemptInProgress(port_name.to_string())),
            Entry::Vacant(slot) => {
                // Checked under the shard lock: a later cancel_all_except sees this slot
                if abort.load(Ordering::SeqCst) {
                    debug!(port = port_name, "Scan already settled, not connecting");
                    return Err(Error::Cancelled(port_name.to_string()));
                }
                slot.insert(outcome_sender.clone());
            }
        }

        let result = self.establish(
            port_name,
            input,
            output,
            outcome_sender,
            outcome_receiver,
            timeout,
        );
        self.attempts.remove(port_name);

        match &result {
            Ok(_) => info!(port = port_name, "Bridge connected"),
            Err(e) => debug!(port = port_name, "Connection attempt failed: {}", e),
        }
        result
    }

    fn establish(
        &self,
        port_name: &str,
        input: Arc<dyn SysexInput>,
        output: Arc<dyn SysexOutput>,
        outcome_sender: Sender<AttemptOutcome>,
        outcome_receiver: Receiver<AttemptOutcome>,
        timeout: Duration,
    ) -> Result<Connection> {
        let events = Arc::new(ConnectionEvents::new(outcome_sender));
        let bridge = Bridge::builder(OutputSink::new(Arc::clone(&output)))
            .config(self.config.bridge.clone())
            .events(Arc::clone(&events))
            .build()?;
        let bridge = Arc::new(Mutex::new(bridge));

        // From here on, dropping the connection undoes everything below
        let connection = Connection::new(
            port_name,
            Arc::clone(&bridge),
            Arc::clone(&input),
            output,
            Arc::clone(&events),
        );

        let inbound = Arc::downgrade(&bridge);
        input.set_listener(Some(Arc::new(move |raw: &[u8]| {
            if let Some(bridge) = inbound.upgrade() {
                route_frame(&bridge, raw);
            }
        })))?;

        bridge
            .lock()
            .request(&self.config.probe_path, self.config.probe_chunk_size)?;

        match outcome_receiver.recv_timeout(timeout) {
            Ok(AttemptOutcome::Answered) => {
                events.disarm_probe();
                Ok(connection)
            }
            Ok(AttemptOutcome::Cancelled) => Err(Error::Cancelled(port_name.to_string())),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                Err(Error::Timeout {
                    port: port_name.to_string(),
                    duration_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Abort the attempt for `port_name`. Returns false when none is pending.
    pub fn cancel(&self, port_name: &str) -> bool {
        match self.attempts.get(port_name) {
            Some(attempt) => {
                let _ = attempt.try_send(AttemptOutcome::Cancelled);
                true
            }
            None => false,
        }
    }

    fn cancel_all_except(&self, keep: &str) {
        let others: Vec<Sender<AttemptOutcome>> = self
            .attempts
            .iter()
            .filter(|e| e.key() != keep)
            .map(|e| e.value().clone())
            .collect();
        for attempt in others {
            let _ = attempt.try_send(AttemptOutcome::Cancelled);
        }
    }

    // ==================== Scan ====================

    /// Try every pair whose name contains `filter` at once. Each working
    /// connection goes to `on_finish`; returning `true` keeps it and cancels
    /// the remaining attempts. Connections nobody kept are detached.
    pub fn scan<F>(&self, filter: &str, timeout: Duration, on_finish: F) -> ScanReport
    where
        F: FnMut(Connection) -> bool + Send,
    {
        let candidates = self.candidates(filter);
        info!(filter, count = candidates.len(), "Scanning for bridges");

        let on_finish = Mutex::new(on_finish);
        let taken = AtomicBool::new(false);
        let report = Mutex::new(ScanReport::default());

        thread::scope(|scope| {
            let (on_finish, taken, report) = (&on_finish, &taken, &report);

            for name in &candidates {
                let spawned = thread::Builder::new()
                    .name(format!("midibridge-scan-{name}"))
                    .spawn_scoped(scope, move || {
                        let connection = match self.connect_unless(name, timeout, taken) {
                            Ok(connection) => connection,
                            Err(e) => {
                                report.lock().failed.push((name.clone(), e));
                                return;
                            }
                        };
                        report.lock().connected.push(name.clone());

                        let mut on_finish = on_finish.lock();
                        if taken.load(Ordering::SeqCst) {
                            debug!(port = %name, "Another bridge was kept, detaching");
                            return;
                        }
                        if (*on_finish)(connection) {
                            taken.store(true, Ordering::SeqCst);
                            report.lock().taken = Some(name.clone());
                            self.cancel_all_except(name);
                        }
                    });

                if let Err(e) = spawned {
                    warn!(port = %name, "Failed to spawn scan thread: {}", e);
                    report.lock().failed.push((
                        name.clone(),
                        Error::MidiDevice(format!("Failed to spawn scan thread: {e}")),
                    ));
                }
            }
        });

        report.into_inner()
    }
}
