//! Error types for transports and chunked transfers.

use std::io;

use thiserror::Error;

use crate::transport::Endpoint;

/// A failure reported by a single transport send or receive.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The peer went away (channel closed, connection reset at a frame boundary).
    #[error("peer {0} disconnected")]
    Disconnected(Endpoint),

    /// No route to the requested endpoint.
    #[error("unknown peer {0}")]
    UnknownPeer(Endpoint),

    /// The incoming message does not fit the receive buffer.
    #[error("message of {len} bytes truncated to a {capacity}-byte buffer")]
    Truncated { len: u64, capacity: usize },

    /// The outgoing message exceeds what the transport accepts.
    #[error("message of {len} bytes exceeds transport limit of {limit}")]
    MessageTooLarge { len: usize, limit: usize },

    /// Non-success status code from a foreign transport primitive, kept verbatim.
    #[error("transport returned status {0}")]
    Status(i32),
}

/// A failure of a chunked send or receive.
#[derive(Debug, Error)]
pub enum TransferError {
    /// Transport call number `call` (zero-based, header included) failed.
    /// Nothing was sent or received after it.
    #[error("transport call {call} failed: {source}")]
    Transport {
        call: u64,
        #[source]
        source: TransportError,
    },

    #[error("chunk size must be non-zero")]
    InvalidChunkSize,

    #[error("buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall { needed: u64, available: u64 },

    #[error("bad transfer header: {0}")]
    BadHeader(String),

    /// The sender's chunk size exceeds what this receiver accepts.
    #[error("peer chunk size {got} exceeds local limit {limit}")]
    ChunkTooLarge { got: u64, limit: usize },

    /// A chunk arrived with fewer bytes than the plan requires.
    #[error("chunk {index}: expected {expected} bytes, received {received}")]
    ShortChunk {
        index: u64,
        expected: usize,
        received: usize,
    },

    /// The in-place count does not match the expected length.
    #[error("peer announced {announced} chunks, expected {expected}")]
    ChunkCountMismatch { announced: u64, expected: u64 },

    #[error("payload digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    /// The announced total exceeds the configured ceiling for allocation.
    #[error("announced length {len} exceeds limit {limit}")]
    TooLarge { len: u64, limit: u64 },
}

impl TransferError {
    /// The underlying transport error, if this is a transport failure.
    pub fn transport(&self) -> Option<&TransportError> {
        match self {
            Self::Transport { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Invalid configuration value.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var}: cannot parse {value:?}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}
