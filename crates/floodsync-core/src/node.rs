//! Replication node - the primary entry point for Floodsync
//!
//! A [`Node`] owns one append-only log per known origin, the set of
//! currently connected peer channels, and the set of local subscribers. It
//! implements the status/request/delivery anti-entropy protocol that drives
//! convergence between any two connected nodes.
//!
//! ## Lifecycle
//!
//! ```ignore
//! use floodsync_core::Node;
//!
//! let node = Node::new();
//! node.subscribe(|note| println!("got: {note}"));
//! node.publish("hello group");
//!
//! // Wire up a channel supplied by the host application
//! node.connect(channel);
//!
//! // Persist across restarts
//! let pickled = node.snapshot()?;
//! let reborn = Node::restore(&pickled)?;
//! ```
//!
//! ## Execution model
//!
//! Single acceptance path, run-to-completion handlers, no blocking, no
//! backpressure. Every public operation and every inbound frame handler
//! finishes before the next one runs for the same node; "waiting" for a
//! peer is expressed by returning and letting a later delivery callback
//! continue the protocol. Subscriber handlers run inside the node's
//! critical section and must not call back into the same node.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, error, trace, warn};

use crate::channel::Channel;
use crate::error::{FloodError, FloodResult};
use crate::log::LogStore;
use crate::protocol::Message;
use crate::snapshot::Snapshot;
use crate::types::{OriginId, PeerId};

/// Handler invoked once per note accepted by the node, past or future
pub type NoteHandler = Box<dyn FnMut(&str) + Send>;

struct NodeState {
    /// This node's own origin identity, fixed for its lifetime
    identity: OriginId,
    /// One append-only log per known origin
    store: LogStore,
    /// Local acceptance order of every held note, for subscriber replay
    journal: Vec<(OriginId, u64)>,
    /// Currently connected peer channels, keyed by stable handle
    peers: BTreeMap<PeerId, Arc<dyn Channel>>,
    /// Next peer handle to hand out; never reused
    next_peer_id: PeerId,
    /// Registered note handlers, in registration order
    subscribers: Vec<NoteHandler>,
}

impl NodeState {
    /// The single acceptance gate shared by local publication and remote
    /// delivery.
    ///
    /// A note is accepted only if it lands exactly at the tail of its
    /// origin's log. Anything else is a duplicate or arrived ahead of a
    /// missing predecessor and is silently discarded; that discard is the
    /// protocol's whole dedup/ordering mechanism, not an error.
    fn accept(&mut self, origin: OriginId, seqno: u64, note: String) {
        let len = self.store.len_of(origin);
        if seqno != len {
            trace!(%origin, seqno, held = len, "discarding note outside acceptance window");
            return;
        }

        debug!(%origin, seqno, "accepted note");
        self.store.append(origin, note.clone());
        self.journal.push((origin, seqno));

        for handler in &mut self.subscribers {
            handler(&note);
        }

        // Re-announce instead of flooding the payload: peers that are
        // behind will request exactly what they miss.
        self.broadcast(&Message::Status {
            origin,
            last: Some(seqno),
        });
    }

    fn handle_message(&mut self, peer: PeerId, msg: Message) -> FloodResult<()> {
        trace!(peer, kind = msg.kind(), origin = %msg.origin(), "inbound message");
        match msg {
            Message::Status { origin, last } => {
                // Learning that an origin exists is itself replicated
                // state: record it and announce the discovery once, so
                // every node converges on the same origin set even for
                // origins that have not published yet.
                if !self.store.contains(origin) {
                    self.store.ensure_origin(origin);
                    self.broadcast(&Message::Status { origin, last: None });
                }
                let held = self.store.len_of(origin);
                if let Some(last) = last {
                    for seqno in held..=last {
                        self.send_to(peer, &Message::Request { origin, seqno });
                    }
                }
                Ok(())
            }
            Message::Request { origin, seqno } => {
                let note = self
                    .store
                    .get(origin, seqno)
                    .ok_or(FloodError::ProtocolViolation { origin, seqno })?
                    .to_owned();
                self.send_to(peer, &Message::Delivery { origin, seqno, note });
                Ok(())
            }
            Message::Delivery {
                origin,
                seqno,
                note,
            } => {
                // Only our own publish calls may extend our own origin log.
                if origin == self.identity && seqno >= self.store.len_of(origin) {
                    warn!(peer, %origin, seqno, "peer tried to extend our own origin log");
                    return Ok(());
                }
                self.accept(origin, seqno, note);
                Ok(())
            }
        }
    }

    fn send_to(&self, peer: PeerId, msg: &Message) {
        // The peer may already be gone if its channel closed; frames to it
        // are dropped, matching the best-effort send contract.
        let Some(channel) = self.peers.get(&peer) else {
            trace!(peer, kind = msg.kind(), "dropping frame for departed peer");
            return;
        };
        match msg.encode() {
            Ok(frame) => channel.send(frame),
            Err(err) => warn!(error = %err, "failed to encode outbound message"),
        }
    }

    fn broadcast(&self, msg: &Message) {
        let frame = match msg.encode() {
            Ok(frame) => frame,
            Err(err) => {
                warn!(error = %err, "failed to encode outbound message");
                return;
            }
        };
        for channel in self.peers.values() {
            channel.send(frame.clone());
        }
    }
}

/// A member of a replication group
///
/// Cheap to clone; clones share the same underlying state, so a node handle
/// can be moved into accept loops or background tasks freely.
#[derive(Clone)]
pub struct Node {
    state: Arc<Mutex<NodeState>>,
}

impl Node {
    /// Create a fresh node with a new random identity and an empty own log
    pub fn new() -> Self {
        let identity = OriginId::new();
        let mut store = LogStore::new();
        store.ensure_origin(identity);
        debug!(%identity, "created fresh node");
        Self {
            state: Arc::new(Mutex::new(NodeState {
                identity,
                store,
                journal: Vec::new(),
                peers: BTreeMap::new(),
                next_peer_id: 0,
                subscribers: Vec::new(),
            })),
        }
    }

    /// Rehydrate a new incarnation of a node from a snapshot string
    ///
    /// The restored node adopts the snapshot's identity and origin logs
    /// verbatim and starts with zero connected peers; reconnecting to the
    /// group is the caller's responsibility.
    pub fn restore(snapshot: &str) -> FloodResult<Self> {
        let Snapshot {
            identity,
            mut origins,
        } = Snapshot::from_json(snapshot)?;
        origins.ensure_origin(identity);

        // Acceptance order is node-local state and is not persisted; the
        // new incarnation replays history in per-origin order.
        let mut journal = Vec::new();
        for (origin, notes) in origins.iter() {
            for seqno in 0..notes.len() as u64 {
                journal.push((*origin, seqno));
            }
        }

        debug!(%identity, notes = origins.note_count(), "restored node from snapshot");
        Ok(Self {
            state: Arc::new(Mutex::new(NodeState {
                identity,
                store: origins,
                journal,
                peers: BTreeMap::new(),
                next_peer_id: 0,
                subscribers: Vec::new(),
            })),
        })
    }

    /// This node's own origin identity
    pub fn identity(&self) -> OriginId {
        self.state.lock().identity
    }

    /// Register a handler for every note this node ever accepts
    ///
    /// The handler is first invoked once per note already held, in local
    /// acceptance order, then once per newly accepted note, forever.
    /// Registering the same logical subscription twice is the caller's
    /// problem; no deduplication happens here. The handler must not call
    /// back into this node.
    pub fn subscribe<F>(&self, mut handler: F)
    where
        F: FnMut(&str) + Send + 'static,
    {
        let mut state = self.state.lock();
        for (origin, seqno) in &state.journal {
            if let Some(note) = state.store.get(*origin, *seqno) {
                handler(note);
            }
        }
        state.subscribers.push(Box::new(handler));
    }

    /// Publish a note to the whole group
    ///
    /// The note is appended to this node's own origin log at the next
    /// sequence number and then runs through the same acceptance path as
    /// remotely received notes, so local and remote notes are
    /// indistinguishable once accepted. Content is treated as an opaque
    /// blob; assigning meaning to it belongs to the application.
    pub fn publish(&self, note: impl Into<String>) {
        let note = note.into();
        let mut state = self.state.lock();
        let identity = state.identity;
        let seqno = state.store.len_of(identity);
        debug!(origin = %identity, seqno, "publishing local note");
        state.accept(identity, seqno, note);
    }

    /// Attach a channel to some other node in the group
    ///
    /// Wires the channel's receive and close callbacks to this node, then
    /// seeds anti-entropy by sending one status message per known origin to
    /// the new peer. No note payload crosses the wire until the peer asks
    /// for something it is missing.
    pub fn connect(&self, channel: Arc<dyn Channel>) {
        let (peer_id, statuses) = {
            let mut state = self.state.lock();
            let peer_id = state.next_peer_id;
            state.next_peer_id += 1;
            state.peers.insert(peer_id, channel.clone());
            let statuses: Vec<Message> = state
                .store
                .iter()
                .map(|(origin, notes)| Message::Status {
                    origin: *origin,
                    last: (notes.len() as u64).checked_sub(1),
                })
                .collect();
            (peer_id, statuses)
        };
        debug!(peer_id, "connected peer channel");

        // The receive callback may fire during registration if the channel
        // already buffered frames, so the node lock is not held here.
        let state = Arc::downgrade(&self.state);
        channel.on_receive(Box::new(move |frame| {
            let Some(state) = state.upgrade() else {
                return;
            };
            if let Err(err) = Self::handle_frame(&state, peer_id, &frame) {
                // A trusted peer broke the protocol contract; there is no
                // local recovery from that.
                error!(peer_id, error = %err, "fatal protocol error");
                panic!("fatal protocol error from peer {peer_id}: {err}");
            }
        }));

        let state = Arc::downgrade(&self.state);
        channel.on_close(Box::new(move || {
            let Some(state) = state.upgrade() else {
                return;
            };
            state.lock().peers.remove(&peer_id);
            debug!(peer_id, "peer channel closed");
        }));

        for msg in &statuses {
            match msg.encode() {
                Ok(frame) => channel.send(frame),
                Err(err) => warn!(error = %err, "failed to encode outbound message"),
            }
        }
    }

    /// Serialize this node's identity and full log state
    ///
    /// The returned string is sufficient to reconstruct an equivalent node
    /// via [`Node::restore`]. Peer connections are not captured.
    pub fn snapshot(&self) -> FloodResult<String> {
        let state = self.state.lock();
        Snapshot {
            identity: state.identity,
            origins: state.store.clone(),
        }
        .to_json()
    }

    /// Clone of the full origin-to-notes mapping, for inspection
    pub fn origins(&self) -> LogStore {
        self.state.lock().store.clone()
    }

    /// Number of currently connected peer channels
    pub fn peer_count(&self) -> usize {
        self.state.lock().peers.len()
    }

    fn handle_frame(state: &Mutex<NodeState>, peer: PeerId, frame: &[u8]) -> FloodResult<()> {
        let msg = Message::decode(frame)?;
        state.lock().handle_message(peer, msg)
    }
}

impl Default for Node {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{CloseHandler, FrameHandler};

    /// Channel stub that records outbound messages and lets tests inject
    /// inbound frames by hand.
    struct TestChannel {
        sent: Mutex<Vec<Message>>,
        receive: Mutex<Option<FrameHandler>>,
        close: Mutex<Option<CloseHandler>>,
    }

    impl TestChannel {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
                receive: Mutex::new(None),
                close: Mutex::new(None),
            })
        }

        fn inject(&self, msg: Message) {
            let mut handler = self.receive.lock();
            let handler = handler.as_mut().expect("no receive handler registered");
            handler(msg.encode().unwrap());
        }

        fn drain(&self) -> Vec<Message> {
            std::mem::take(&mut *self.sent.lock())
        }

        fn close(&self) {
            if let Some(handler) = self.close.lock().take() {
                handler();
            }
        }
    }

    impl Channel for TestChannel {
        fn send(&self, frame: Vec<u8>) {
            self.sent.lock().push(Message::decode(&frame).unwrap());
        }

        fn on_receive(&self, handler: FrameHandler) {
            *self.receive.lock() = Some(handler);
        }

        fn on_close(&self, handler: CloseHandler) {
            *self.close.lock() = Some(handler);
        }
    }

    #[test]
    fn test_publish_appends_to_own_log() {
        let node = Node::new();
        node.publish("hi");
        node.publish("bye");
        let origins = node.origins();
        assert_eq!(origins.len_of(node.identity()), 2);
        assert_eq!(origins.get(node.identity(), 0), Some("hi"));
        assert_eq!(origins.get(node.identity(), 1), Some("bye"));
    }

    #[test]
    fn test_subscribe_replays_then_stays_live() {
        let node = Node::new();
        node.publish("hi");
        node.publish("bye");

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        node.subscribe(move |note| sink.lock().push(note.to_owned()));
        assert_eq!(*seen.lock(), vec!["hi".to_string(), "bye".to_string()]);

        node.publish("new");
        assert_eq!(seen.lock().len(), 3);
        assert_eq!(seen.lock()[2], "new");
    }

    #[test]
    fn test_connect_seeds_status_for_every_origin() {
        let node = Node::new();
        node.publish("hi");
        let channel = TestChannel::new();
        node.connect(channel.clone());

        let sent = channel.drain();
        assert_eq!(
            sent,
            vec![Message::Status {
                origin: node.identity(),
                last: Some(0),
            }]
        );
    }

    #[test]
    fn test_fresh_node_announces_empty_own_log() {
        let node = Node::new();
        let channel = TestChannel::new();
        node.connect(channel.clone());
        assert_eq!(
            channel.drain(),
            vec![Message::Status {
                origin: node.identity(),
                last: None,
            }]
        );
    }

    #[test]
    fn test_status_gap_triggers_exact_requests() {
        let node = Node::new();
        let channel = TestChannel::new();
        node.connect(channel.clone());
        channel.drain();

        let origin = OriginId::from_bytes([9u8; 16]);
        channel.inject(Message::Status {
            origin,
            last: Some(1),
        });
        assert_eq!(
            channel.drain(),
            vec![
                // The origin was unknown, so its discovery is announced
                // before the missing range is requested.
                Message::Status { origin, last: None },
                Message::Request { origin, seqno: 0 },
                Message::Request { origin, seqno: 1 },
            ]
        );
    }

    #[test]
    fn test_empty_status_spreads_discovery_once() {
        let node = Node::new();
        let channel = TestChannel::new();
        node.connect(channel.clone());
        channel.drain();

        let origin = OriginId::from_bytes([9u8; 16]);
        let status = Message::Status { origin, last: None };
        channel.inject(status.clone());
        // An empty log is a valid state worth replicating: the node
        // records the origin and re-announces it to its peers.
        assert_eq!(channel.drain(), vec![status.clone()]);
        assert!(node.origins().contains(origin));
        assert_eq!(node.origins().len_of(origin), 0);

        // Already known: no further requests or announcements.
        channel.inject(status);
        assert!(channel.drain().is_empty());
    }

    #[test]
    fn test_delivery_accepted_in_order_and_reannounced() {
        let node = Node::new();
        let channel = TestChannel::new();
        node.connect(channel.clone());
        channel.drain();

        let origin = OriginId::from_bytes([9u8; 16]);
        channel.inject(Message::Delivery {
            origin,
            seqno: 0,
            note: "first".into(),
        });
        assert_eq!(node.origins().get(origin, 0), Some("first"));
        // Acceptance re-announces to every current peer, this one included.
        assert_eq!(
            channel.drain(),
            vec![Message::Status {
                origin,
                last: Some(0),
            }]
        );
    }

    #[test]
    fn test_duplicate_delivery_is_a_noop() {
        let node = Node::new();
        let channel = TestChannel::new();
        node.connect(channel.clone());
        channel.drain();

        let origin = OriginId::from_bytes([9u8; 16]);
        let delivery = Message::Delivery {
            origin,
            seqno: 0,
            note: "only once".into(),
        };
        channel.inject(delivery.clone());
        channel.drain();
        channel.inject(delivery);

        assert_eq!(node.origins().len_of(origin), 1);
        // The duplicate is discarded silently: no re-announcement.
        assert!(channel.drain().is_empty());
    }

    #[test]
    fn test_premature_delivery_is_discarded() {
        let node = Node::new();
        let channel = TestChannel::new();
        node.connect(channel.clone());
        channel.drain();

        let origin = OriginId::from_bytes([9u8; 16]);
        channel.inject(Message::Delivery {
            origin,
            seqno: 2,
            note: "too early".into(),
        });
        assert_eq!(node.origins().len_of(origin), 0);
    }

    #[test]
    fn test_request_for_held_note_is_answered() {
        let node = Node::new();
        node.publish("hi");
        let channel = TestChannel::new();
        node.connect(channel.clone());
        channel.drain();

        channel.inject(Message::Request {
            origin: node.identity(),
            seqno: 0,
        });
        assert_eq!(
            channel.drain(),
            vec![Message::Delivery {
                origin: node.identity(),
                seqno: 0,
                note: "hi".into(),
            }]
        );
    }

    #[test]
    #[should_panic(expected = "fatal protocol error")]
    fn test_request_for_missing_note_is_fatal() {
        let node = Node::new();
        let channel = TestChannel::new();
        node.connect(channel.clone());
        channel.inject(Message::Request {
            origin: OriginId::from_bytes([9u8; 16]),
            seqno: 5,
        });
    }

    #[test]
    #[should_panic(expected = "fatal protocol error")]
    fn test_undecodable_frame_is_fatal() {
        let node = Node::new();
        let channel = TestChannel::new();
        node.connect(channel.clone());
        let mut handler = channel.receive.lock();
        (handler.as_mut().unwrap())(vec![0xff, 0xfe, 0xfd]);
    }

    #[test]
    fn test_remote_peer_cannot_extend_own_log() {
        let node = Node::new();
        node.publish("mine");
        let channel = TestChannel::new();
        node.connect(channel.clone());
        channel.drain();

        channel.inject(Message::Delivery {
            origin: node.identity(),
            seqno: 1,
            note: "forged".into(),
        });
        assert_eq!(node.origins().len_of(node.identity()), 1);
    }

    #[test]
    fn test_close_removes_peer_but_keeps_data() {
        let node = Node::new();
        node.publish("kept");
        let channel = TestChannel::new();
        node.connect(channel.clone());
        assert_eq!(node.peer_count(), 1);

        channel.close();
        assert_eq!(node.peer_count(), 0);
        assert_eq!(node.origins().len_of(node.identity()), 1);

        // Publishing after the close no longer reaches the old channel.
        channel.drain();
        node.publish("later");
        assert!(channel.drain().is_empty());
    }

    #[test]
    fn test_snapshot_restore_roundtrip() {
        let node = Node::new();
        node.publish("hi");
        node.publish("bye");

        let pickled = node.snapshot().unwrap();
        let reborn = Node::restore(&pickled).unwrap();
        assert_eq!(reborn.identity(), node.identity());
        assert_eq!(reborn.origins(), node.origins());
        assert_eq!(reborn.peer_count(), 0);

        // The restored incarnation keeps publishing under the same identity
        // with contiguous sequence numbers.
        reborn.publish("lazarus");
        assert_eq!(reborn.origins().get(reborn.identity(), 2), Some("lazarus"));
    }

    #[test]
    fn test_restore_rejects_garbage() {
        assert!(Node::restore("not a snapshot").is_err());
    }
}
