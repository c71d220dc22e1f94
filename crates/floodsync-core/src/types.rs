//! Core types for Floodsync

use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Identity of an origin node.
///
/// Every node draws one at construction time and keeps it for its whole
/// lifetime, including across restarts via snapshots. Uniqueness within a
/// group is probabilistic: 16 random bytes make collisions negligible at the
/// intended group size (fewer than ten nodes).
///
/// Serializes as a base58 string so it can double as a JSON map key in
/// snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct OriginId([u8; 16]);

impl OriginId {
    /// Create a new random OriginId
    pub fn new() -> Self {
        let mut bytes = [0u8; 16];
        rand::rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create an OriginId from raw bytes
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes of the OriginId
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Convert to base58 string for display/storage
    pub fn to_base58(&self) -> String {
        bs58::encode(&self.0).into_string()
    }

    /// Parse from base58 string
    pub fn from_base58(s: &str) -> Result<Self, bs58::decode::Error> {
        let bytes = bs58::decode(s).into_vec()?;
        if bytes.len() != 16 {
            return Err(bs58::decode::Error::BufferTooSmall);
        }
        let mut arr = [0u8; 16];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl Default for OriginId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<OriginId> for String {
    fn from(id: OriginId) -> Self {
        id.to_base58()
    }
}

impl TryFrom<String> for OriginId {
    type Error = bs58::decode::Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_base58(&s)
    }
}

impl std::fmt::Display for OriginId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "origin_{}", bs58::encode(&self.0[..8]).into_string())
    }
}

/// Stable handle for a connected peer channel.
///
/// Assigned by the node at `connect` time and never reused for the lifetime
/// of the node. Channel close notifications remove peers by this handle, so
/// removal never depends on comparing callback identities.
pub type PeerId = u64;
