//! Node persistence snapshots
//!
//! A snapshot captures everything a node needs to survive a restart: its
//! identity and the complete origin-to-notes mapping. Peer connections are
//! session state and are deliberately absent; reconnecting after a restart
//! is the host application's responsibility.
//!
//! The format is plain JSON with no version or integrity marker. A snapshot
//! is produced on demand by [`crate::node::Node::snapshot`] and consumed
//! exactly once, by [`crate::node::Node::restore`].

use serde::{Deserialize, Serialize};

use crate::error::FloodResult;
use crate::log::LogStore;
use crate::types::OriginId;

/// Serialized form of a node's identity and full log state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// The node's own origin identity
    pub identity: OriginId,
    /// Every origin log known to the node, its own included
    pub origins: LogStore,
}

impl Snapshot {
    /// Serialize to a JSON string
    pub fn to_json(&self) -> FloodResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse from a JSON string produced by [`Snapshot::to_json`]
    pub fn from_json(data: &str) -> FloodResult<Self> {
        Ok(serde_json::from_str(data)?)
    }
}
