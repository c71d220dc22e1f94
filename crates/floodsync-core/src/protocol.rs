//! Anti-entropy sync protocol for per-origin note logs
//!
//! Messages are serialized with postcard and exchanged over point-to-point
//! channels.
//!
//! ## Protocol Overview
//!
//! The protocol separates announcement from payload transfer:
//!
//! 1. **Status**: Announce the highest sequence number held for one origin
//! 2. **Request**: Ask for one specific missing (origin, seqno) note
//! 3. **Delivery**: The note payload answering a request
//!
//! ## Message Flow
//!
//! ```text
//! Node A                              Node B
//!   |                                   |
//!   |--- Status {origin, last: 4} ----->|
//!   |                                   |
//!   |    (B holds 3 notes, so 3..=4     |
//!   |     are missing)                  |
//!   |                                   |
//!   |<-- Request {origin, seqno: 3} ----|
//!   |<-- Request {origin, seqno: 4} ----|
//!   |--- Delivery {origin, 3, note} --->|
//!   |--- Delivery {origin, 4, note} --->|
//!   |                                   |
//!   |    (B accepts in order, then      |
//!   |     re-announces to its peers)    |
//! ```
//!
//! Status messages are cheap (no payload) and bound the cost of a reconnect
//! to the number of genuinely new notes, never the total history size.

use serde::{Deserialize, Serialize};

use crate::types::OriginId;

/// Messages exchanged between peers over a channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    /// Announce the highest sequence number held for an origin
    ///
    /// `last` is `None` when nothing is held for the origin yet; this is a
    /// valid empty state, not an error.
    Status {
        /// The origin whose log is being announced
        origin: OriginId,
        /// Highest sequence number held, or None for an empty log
        last: Option<u64>,
    },

    /// Request one specific note from a peer
    ///
    /// Only ever sent for positions a status message announced, so the
    /// receiving peer must hold the note.
    Request {
        /// The origin whose log the note belongs to
        origin: OriginId,
        /// Zero-based position of the wanted note
        seqno: u64,
    },

    /// A note payload, sent in response to a request
    Delivery {
        /// The origin whose log the note belongs to
        origin: OriginId,
        /// Zero-based position of the note
        seqno: u64,
        /// The opaque note content
        note: String,
    },
}

impl Message {
    /// Encode message to bytes using postcard
    pub fn encode(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(self)
    }

    /// Decode message from bytes using postcard
    pub fn decode(data: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(data)
    }

    /// Get the origin this message relates to
    pub fn origin(&self) -> &OriginId {
        match self {
            Message::Status { origin, .. } => origin,
            Message::Request { origin, .. } => origin,
            Message::Delivery { origin, .. } => origin,
        }
    }

    /// Short name of the message kind, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Status { .. } => "status",
            Message::Request { .. } => "request",
            Message::Delivery { .. } => "delivery",
        }
    }
}
