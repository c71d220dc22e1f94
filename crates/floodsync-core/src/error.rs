//! Error types for Floodsync

use thiserror::Error;

use crate::types::OriginId;

/// Main error type for Floodsync operations
#[derive(Error, Debug)]
pub enum FloodError {
    /// A trusted peer requested a note this node does not hold.
    ///
    /// Under the protocol a peer only requests sequence numbers that some
    /// node announced via a status message, so a request for a missing note
    /// means the peer is outside the trust model. Unrecoverable.
    #[error("protocol violation: peer requested {origin} seqno {seqno}, which this node does not hold")]
    ProtocolViolation { origin: OriginId, seqno: u64 },

    /// A frame on the wire failed to decode into a known message
    #[error("wire format error: {0}")]
    Wire(#[from] postcard::Error),

    /// Snapshot serialization/deserialization failed
    #[error("snapshot error: {0}")]
    Snapshot(#[from] serde_json::Error),
}

/// Result type alias using FloodError
pub type FloodResult<T> = Result<T, FloodError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OriginId;

    #[test]
    fn test_protocol_violation_display() {
        let origin = OriginId::from_bytes([1u8; 16]);
        let err = FloodError::ProtocolViolation { origin, seqno: 3 };
        let msg = format!("{}", err);
        assert!(msg.contains("protocol violation"));
        assert!(msg.contains("seqno 3"));
    }

    #[test]
    fn test_error_from_snapshot_parse() {
        let parse_err = serde_json::from_str::<u64>("not json").unwrap_err();
        let err: FloodError = parse_err.into();
        assert!(matches!(err, FloodError::Snapshot(_)));
    }
}
