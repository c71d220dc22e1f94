//! Floodsync Core Library
//!
//! Serverless flooding replication of append-only note logs for small,
//! long-lived peer groups.
//!
//! ## Overview
//!
//! A group of fewer than ten nodes (chat clients, bookmark stores, offline
//! mailers) each publishes opaque "notes" and wants every other member to
//! eventually hold every note ever published, including ones published
//! while it was offline. There is no server: nodes talk to whichever peers
//! they can reach, and any connected path is enough for information to
//! spread.
//!
//! ## Core principles
//!
//! - **Local-first**: publishing and reading work fully offline; peers
//!   reconcile whenever a connection exists
//! - **Per-origin logs**: notes are partitioned into one append-only,
//!   gap-free log per publishing node
//! - **Cheap anti-entropy**: reconnection cost is bounded by the number of
//!   genuinely new notes, never by total history size
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  Node                                                           │
//! │  ├── LogStore (one append-only note log per origin)             │
//! │  ├── peers (connected Channel handles, session state only)      │
//! │  └── subscribers (note handlers, replayed then live)            │
//! │                                                                 │
//! │  Protocol (per point-to-point channel)                          │
//! │  ├── Status: announce highest held seqno for an origin          │
//! │  ├── Request: pull one specific missing note                    │
//! │  └── Delivery: the note payload                                 │
//! │                                                                 │
//! │  Transports implementing the Channel contract                   │
//! │  ├── SimChannel (in-memory, discrete-event, for tests/demos)    │
//! │  └── StreamChannel (length-delimited frames over any            │
//! │      already-secured AsyncRead + AsyncWrite stream)             │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```
//! use floodsync_core::{Node, Sim};
//!
//! let sim = Sim::new();
//! let alice = Node::new();
//! let bob = Node::new();
//!
//! alice.publish("hi");
//! alice.publish("bye");
//!
//! sim.connect_nodes(&alice, &bob);
//! sim.run_until_quiescent();
//!
//! assert_eq!(alice.origins(), bob.origins());
//! ```

pub mod channel;
pub mod error;
pub mod log;
pub mod net;
pub mod node;
pub mod protocol;
pub mod sim;
pub mod snapshot;
pub mod types;

// Re-exports
pub use channel::{Channel, CloseHandler, FrameHandler};
pub use error::{FloodError, FloodResult};
pub use log::LogStore;
pub use net::StreamChannel;
pub use node::{Node, NoteHandler};
pub use protocol::Message;
pub use sim::{Sim, SimChannel, SimLink};
pub use snapshot::Snapshot;
pub use types::{OriginId, PeerId};
