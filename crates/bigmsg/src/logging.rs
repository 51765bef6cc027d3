/// Transfer logging trait for structured per-transfer logs.
///
/// The sender and receiver report lifecycle and per-chunk events through a
/// `TransferLogger`, so callers can route them to `tracing`, collect them in
/// tests, or drop them.

use std::fmt;

use crate::config::TransferConfig;
use crate::transport::{Endpoint, Tag};

/// Structured log entry for a transfer operation.
#[derive(Debug, Clone)]
pub struct TransferLog {
    pub component: &'static str,
    pub transfer_id: [u8; 16],
    pub event: TransferEvent,
}

/// Transfer events that can be logged.
#[derive(Debug, Clone, PartialEq)]
pub enum TransferEvent {
    /// Sender: about to send `chunk_count` chunks
    TransferStarted {
        peer: Endpoint,
        tag: Tag,
        total_bytes: u64,
        chunk_count: u64,
    },
    /// Receiver: header accepted
    HeaderReceived {
        peer: Endpoint,
        total_bytes: u64,
        chunk_size: u64,
        chunk_count: u64,
    },
    /// Sender: chunk handed to the transport
    ChunkSent {
        chunk_idx: u64,
        chunk_count: u64,
        size: usize,
    },
    /// Receiver: chunk landed in the buffer
    ChunkReceived {
        chunk_idx: u64,
        chunk_count: u64,
        size: usize,
    },
    /// Receiver: payload digest checked
    DigestVerified {
        matched: bool,
    },
    /// Transfer complete
    TransferComplete {
        total_bytes: u64,
        chunk_count: u64,
        duration_ms: u64,
    },
    /// Error occurred
    Error {
        message: String,
    },
}

impl fmt::Display for TransferEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TransferStarted { peer, tag, total_bytes, chunk_count } => {
                write!(f, "transfer_started peer={} tag={} bytes={} chunks={}", peer, tag, total_bytes, chunk_count)
            }
            Self::HeaderReceived { peer, total_bytes, chunk_size, chunk_count } => {
                write!(f, "header_received peer={} bytes={} chunk_size={} chunks={}", peer, total_bytes, chunk_size, chunk_count)
            }
            Self::ChunkSent { chunk_idx, chunk_count, size } => {
                write!(f, "chunk_sent {}/{} size={}", chunk_idx + 1, chunk_count, size)
            }
            Self::ChunkReceived { chunk_idx, chunk_count, size } => {
                write!(f, "chunk_received {}/{} size={}", chunk_idx + 1, chunk_count, size)
            }
            Self::DigestVerified { matched } => {
                write!(f, "digest_verified match={}", matched)
            }
            Self::TransferComplete { total_bytes, chunk_count, duration_ms } => {
                write!(f, "transfer_complete bytes={} chunks={} duration_ms={}", total_bytes, chunk_count, duration_ms)
            }
            Self::Error { message } => {
                write!(f, "error: {}", message)
            }
        }
    }
}

/// Trait for transfer logging. Implementations can write to tracing,
/// collect entries, or discard them.
pub trait TransferLogger: Send + Sync {
    fn log(&self, entry: TransferLog);
}

/// Logger that uses the `tracing` crate.
pub struct TracingLogger;

impl TransferLogger for TracingLogger {
    fn log(&self, entry: TransferLog) {
        let tid = hex::encode(entry.transfer_id);
        // Info for lifecycle events, debug for per-chunk spam
        match &entry.event {
            TransferEvent::ChunkSent { .. } | TransferEvent::ChunkReceived { .. } => {
                tracing::debug!(
                    component = entry.component,
                    transfer_id = %tid,
                    "{}",
                    entry.event,
                );
            }
            TransferEvent::Error { .. } | TransferEvent::DigestVerified { matched: false } => {
                tracing::warn!(
                    component = entry.component,
                    transfer_id = %tid,
                    "{}",
                    entry.event,
                );
            }
            _ => {
                tracing::info!(
                    component = entry.component,
                    transfer_id = %tid,
                    "{}",
                    entry.event,
                );
            }
        }
    }
}

/// No-op logger that discards all log entries.
pub struct NullLogger;

impl TransferLogger for NullLogger {
    fn log(&self, _entry: TransferLog) {}
}

pub(crate) fn emit(
    config: &TransferConfig,
    component: &'static str,
    transfer_id: [u8; 16],
    event: TransferEvent,
) {
    if let Some(ref logger) = config.logger {
        logger.log(TransferLog {
            component,
            transfer_id,
            event,
        });
    }
}
