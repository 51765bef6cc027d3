/// bigmsg: large-buffer transfer over a size-capped point-to-point transport.
///
/// Splits a buffer into chunks no larger than the transport accepts:
/// - Header framing (default): one fixed header message announcing the
///   count, then the chunks; the caller's buffer is never written
/// - In-place framing: count written over the first 8 bytes of the buffer,
///   wire-compatible with peers expecting it there
/// - Blocking, strictly sequential chunks; the first transport failure
///   aborts the transfer and is returned as-is
/// - Optional SHA-256 payload digest in the header
/// - In-process (channel) and TCP transports

pub mod config;
pub mod error;
pub mod logging;
pub mod memory;
pub mod progress;
pub mod protocol;
pub mod receiver;
pub mod sender;
pub mod tcp;
pub mod transport;

// Re-export key types for convenience.
pub use config::TransferConfig;
pub use error::{ConfigError, TransferError, TransportError};
pub use logging::{NullLogger, TracingLogger, TransferEvent, TransferLog, TransferLogger};
pub use memory::MemoryTransport;
pub use progress::TransferProgress;
pub use protocol::{
    COUNT_PREFIX, ChunkPlan, HEADER_LEN, MAX_CHUNK_SIZE, TransferHeader, chunk_count,
};
pub use receiver::{RecvReport, recv_big, recv_big_in_place, recv_big_vec};
pub use sender::{SendReport, payload_digest, send_big, send_big_in_place};
pub use tcp::TcpTransport;
pub use transport::{Endpoint, RecvStatus, Tag, Transport};
