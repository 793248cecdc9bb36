//! Two bridge engines wired back to back through in-memory queues.
//!
//! Frames are delivered in turns, like a single-threaded event loop, so every
//! reply is processed after the call that produced it has returned.

use crossbeam_channel::Receiver;
use midibridge_core::{
    Bridge, BridgeConfig, BridgeEvent, EventChannel, FileSource, NoFiles, SysexMessage,
    TransmissionType,
};
use std::collections::HashMap;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct Peer {
    bridge: Bridge,
    outbound: Receiver<SysexMessage>,
    events: Receiver<BridgeEvent>,
}

impl Peer {
    fn new(files: impl FileSource + 'static) -> Self {
        let (tx, outbound) = crossbeam_channel::unbounded();
        let (events, event_rx) = EventChannel::unbounded();
        let bridge = Bridge::builder(tx)
            .config(BridgeConfig::default())
            .events(events)
            .files(files)
            .build()
            .expect("default config is valid");
        Self {
            bridge,
            outbound,
            events: event_rx,
        }
    }

    fn drain_events(&self) -> Vec<BridgeEvent> {
        self.events.try_iter().collect()
    }
}

/// Deliver one batch of queued frames from `from` to `to`. Returns how many moved.
fn deliver(from: &Peer, to: &mut Peer) -> usize {
    let batch: Vec<SysexMessage> = from.outbound.try_iter().collect();
    for frame in &batch {
        assert!(to.bridge.receive(frame).unwrap(), "bridge traffic must be accepted");
    }
    batch.len()
}

/// Deliver in both directions until the link is quiet.
fn pump(a: &mut Peer, b: &mut Peer) -> usize {
    let mut total = 0;
    loop {
        let moved = deliver(a, b) + deliver(b, a);
        if moved == 0 {
            return total;
        }
        total += moved;
    }
}

fn finishes(events: &[BridgeEvent]) -> Vec<(String, String, u32)> {
    events
        .iter()
        .filter_map(|e| match e {
            BridgeEvent::ReceiveFinish {
                path,
                data,
                num_chunks,
                ..
            } => Some((path.clone(), data.clone(), *num_chunks)),
            _ => None,
        })
        .collect()
}

fn errors(events: &[BridgeEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            BridgeEvent::Error { message } => Some(message.clone()),
            _ => None,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn test_hello_world_end_to_end() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let mut a = Peer::new(NoFiles);
    let mut b = Peer::new(NoFiles);

    let id = a
        .bridge
        .send_string("note.txt", "Hello, World!", 5, TransmissionType::File)
        .unwrap();

    // START + 3 DATA from A, 3 ACK from B
    assert_eq!(pump(&mut a, &mut b), 7);

    let b_events = b.drain_events();
    assert_eq!(
        finishes(&b_events),
        vec![("note.txt".to_string(), "Hello, World!".to_string(), 3)]
    );
    assert!(b.bridge.pending_receives().is_empty());

    let a_events = a.drain_events();
    let acks: Vec<_> = a_events
        .iter()
        .filter(|e| matches!(e, BridgeEvent::ReceiveAck { .. }))
        .collect();
    assert_eq!(acks, vec![&BridgeEvent::ReceiveAck { id }]);
    assert!(a.bridge.pending_sends().is_empty());

    let progress: Vec<u32> = a_events
        .iter()
        .filter_map(|e| match e {
            BridgeEvent::SendProgress { chunk, .. } => Some(*chunk),
            _ => None,
        })
        .collect();
    assert_eq!(progress, vec![0, 1, 2]);
}

#[test]
fn test_receive_progress_sequence() {
    let mut a = Peer::new(NoFiles);
    let mut b = Peer::new(NoFiles);

    let id = a
        .bridge
        .send_string("seq.txt", "abcdefgh", 2, TransmissionType::File)
        .unwrap();
    pump(&mut a, &mut b);

    let events = b.drain_events();
    assert_eq!(
        events[0],
        BridgeEvent::ReceiveStart {
            path: "seq.txt".into(),
            id,
            kind: TransmissionType::File,
            num_chunks: 4,
        }
    );
    let chunks: Vec<u32> = events
        .iter()
        .filter_map(|e| match e {
            BridgeEvent::ReceiveProgress { chunk, .. } => Some(*chunk),
            _ => None,
        })
        .collect();
    assert_eq!(chunks, vec![0, 1, 2, 3]);
}

#[test]
fn test_corrupted_data_reported_to_sender() {
    let mut a = Peer::new(NoFiles);
    let mut b = Peer::new(NoFiles);

    let id = a
        .bridge
        .send_string("note.txt", "Hello, World!", 5, TransmissionType::File)
        .unwrap();

    let mut frames: Vec<SysexMessage> = a.outbound.try_iter().collect();
    assert_eq!(frames.len(), 2);
    // Flip a bit inside the checksum field of the DATA frame
    frames[1].data[2] ^= 0x01;

    for frame in &frames {
        b.bridge.receive(frame).unwrap();
    }
    let before = b.bridge.receive_state(id).unwrap();
    assert_eq!(before.expected_chunk, 0);

    pump(&mut a, &mut b);

    let a_errors = errors(&a.drain_events());
    assert_eq!(a_errors.len(), 1);
    assert!(a_errors[0].contains("Checksum mismatch"), "got {:?}", a_errors[0]);

    let after = b.bridge.receive_state(id).unwrap();
    assert_eq!(after, before);
    assert!(finishes(&b.drain_events()).is_empty());
}

#[test]
fn test_request_for_missing_resource() {
    let mut a = Peer::new(NoFiles);
    let mut b = Peer::new(NoFiles);

    a.bridge.request("ping", 50).unwrap();
    pump(&mut a, &mut b);

    let a_events = a.drain_events();
    assert!(finishes(&a_events).is_empty());
    assert_eq!(errors(&a_events), vec!["File not found: ping".to_string()]);
    assert!(b.bridge.pending_sends().is_empty());
}

#[test]
fn test_request_served_from_file_source() {
    let mut files = HashMap::new();
    files.insert(
        "presets/inputs.py".to_string(),
        "Inputs = [\n    { \"assignment\": PA_MIDICAPTAIN_NANO_SWITCH_1 },\n]\n".to_string(),
    );

    let mut a = Peer::new(NoFiles);
    let mut b = Peer::new(files.clone());

    a.bridge.request("presets/inputs.py", 16).unwrap();
    pump(&mut a, &mut b);

    let received = finishes(&a.drain_events());
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].0, "presets/inputs.py");
    assert_eq!(received[0].1, files["presets/inputs.py"]);
    assert_eq!(received[0].2 as usize, files["presets/inputs.py"].len().div_ceil(16));
}

#[test]
fn test_multibyte_text_split_across_chunks() {
    let mut a = Peer::new(NoFiles);
    let mut b = Peer::new(NoFiles);
    let text = "Größe – naïve ✓ ありがとう";

    a.bridge
        .send_string("utf8.txt", text, 3, TransmissionType::File)
        .unwrap();
    pump(&mut a, &mut b);

    let received = finishes(&b.drain_events());
    assert_eq!(received[0].1, text);
    assert_eq!(received[0].2 as usize, text.len().div_ceil(3));
}

#[test]
fn test_concurrent_transmissions_interleave() {
    let mut a = Peer::new(NoFiles);
    let mut b = Peer::new(NoFiles);

    let one = "first payload ".repeat(20);
    let two = "second payload ".repeat(7);
    let back = "reply from b ".repeat(11);

    a.bridge
        .send_string("one.txt", &one, 9, TransmissionType::File)
        .unwrap();
    a.bridge
        .send_string("two.txt", &two, 4, TransmissionType::File)
        .unwrap();
    b.bridge
        .send_string("back.txt", &back, 6, TransmissionType::File)
        .unwrap();
    assert_eq!(a.bridge.pending_sends().len(), 2);

    pump(&mut a, &mut b);

    let mut at_b = finishes(&b.drain_events());
    at_b.sort();
    assert_eq!(at_b.len(), 2);
    assert_eq!(at_b[0].1, one);
    assert_eq!(at_b[1].1, two);

    let at_a = finishes(&a.drain_events());
    let expected_chunks = back.len().div_ceil(6) as u32;
    assert_eq!(at_a, vec![("back.txt".to_string(), back.clone(), expected_chunks)]);

    assert!(a.bridge.pending_sends().is_empty());
    assert!(b.bridge.pending_sends().is_empty());
    assert!(a.bridge.pending_receives().is_empty());
    assert!(b.bridge.pending_receives().is_empty());
}

#[test]
fn test_error_type_transmission_reaches_on_error() {
    let mut a = Peer::new(NoFiles);
    let mut b = Peer::new(NoFiles);

    a.bridge
        .send_string("boot.py", "Traceback: line 3", 4, TransmissionType::Error)
        .unwrap();
    pump(&mut a, &mut b);

    let events = b.drain_events();
    assert!(finishes(&events).is_empty());
    assert_eq!(errors(&events), vec!["Traceback: line 3".to_string()]);
}

#[test]
fn test_dropped_ack_stalls_until_timeout() {
    let mut a = Peer::new(NoFiles);
    let mut b = Peer::new(NoFiles);

    let id = a
        .bridge
        .send_string("note.txt", "Hello, World!", 5, TransmissionType::File)
        .unwrap();
    deliver(&a, &mut b);

    // Lose B's ack: A never advances and nothing else is retransmitted
    let lost: Vec<SysexMessage> = b.outbound.try_iter().collect();
    assert_eq!(lost.len(), 1);
    assert_eq!(pump(&mut a, &mut b), 0);

    assert_eq!(a.bridge.send_state(id).unwrap().next_chunk, 1);
    assert_eq!(b.bridge.receive_state(id).unwrap().expected_chunk, 1);
}
