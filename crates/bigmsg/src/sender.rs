/// Chunked sender.
///
/// ```text
/// [Header 80B] ---> [Chunk 0] ---> [Chunk 1] ---> ... ---> [Chunk N-1]
///  count, length     max_chunk_size bytes each, last one may be shorter
/// ```
///
/// Each message is one blocking `Transport::send`. The first failure ends
/// the transfer; nothing after it is sent.

use std::time::Instant;

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::TransferConfig;
use crate::error::TransferError;
use crate::logging::{TransferEvent, emit};
use crate::protocol::*;
use crate::transport::{Endpoint, Tag, Transport};

/// Result of a completed send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReport {
    pub transfer_id: [u8; 16],
    pub total_bytes: u64,
    pub chunk_count: u64,
    pub digest: Option<[u8; 32]>,
    pub duration_ms: u64,
}

/// Send `buf` to `dest` as a header message followed by its chunks.
///
/// `buf` is only read. Blocks until every chunk has been handed to the
/// transport or one send fails.
pub fn send_big<T>(
    transport: &mut T,
    buf: &[u8],
    dest: Endpoint,
    tag: Tag,
    config: &TransferConfig,
) -> Result<SendReport, TransferError>
where
    T: Transport + ?Sized,
{
    let plan = ChunkPlan::new(buf.len(), config.max_chunk_size)?;
    let transfer_id = *Uuid::new_v4().as_bytes();
    let digest = config.digest.then(|| payload_digest(buf));
    let header = TransferHeader::for_plan(transfer_id, &plan, digest);

    let start = Instant::now();
    begin(config, transfer_id, &plan, dest, tag);

    let result = (|| -> Result<(), TransferError> {
        transport
            .send(&header.encode(), dest, tag)
            .map_err(|source| TransferError::Transport { call: 0, source })?;
        send_chunks(&mut *transport, buf, &plan, dest, tag, 1, config, transfer_id)
    })();

    finish(config, transfer_id, &plan, start, result).map(|duration_ms| SendReport {
        transfer_id,
        total_bytes: plan.len() as u64,
        chunk_count: plan.count(),
        digest,
        duration_ms,
    })
}

/// Send `buf` with the chunk count written over its first 8 bytes (u64 LE).
///
/// Wire-compatible with receivers that read the count out of the first
/// chunk. The first 8 bytes of `buf` are overwritten and stay overwritten,
/// whether or not the transfer succeeds. Buffers shorter than 8 bytes and
/// chunk sizes under 8 bytes are rejected.
pub fn send_big_in_place<T>(
    transport: &mut T,
    buf: &mut [u8],
    dest: Endpoint,
    tag: Tag,
    config: &TransferConfig,
) -> Result<SendReport, TransferError>
where
    T: Transport + ?Sized,
{
    if config.max_chunk_size < COUNT_PREFIX {
        return Err(TransferError::InvalidChunkSize);
    }
    let plan = ChunkPlan::new(buf.len(), config.max_chunk_size)?;
    write_count_prefix(buf, plan.count())?;

    // No header on the wire; the id only correlates local log lines.
    let transfer_id = *Uuid::new_v4().as_bytes();
    let start = Instant::now();
    begin(config, transfer_id, &plan, dest, tag);

    let result = send_chunks(transport, buf, &plan, dest, tag, 0, config, transfer_id);

    finish(config, transfer_id, &plan, start, result).map(|duration_ms| SendReport {
        transfer_id,
        total_bytes: plan.len() as u64,
        chunk_count: plan.count(),
        digest: None,
        duration_ms,
    })
}

/// SHA-256 of the payload as carried in the header.
pub fn payload_digest(buf: &[u8]) -> [u8; 32] {
    Sha256::digest(buf).into()
}

#[allow(clippy::too_many_arguments)]
fn send_chunks<T>(
    transport: &mut T,
    buf: &[u8],
    plan: &ChunkPlan,
    dest: Endpoint,
    tag: Tag,
    first_call: u64,
    config: &TransferConfig,
    transfer_id: [u8; 16],
) -> Result<(), TransferError>
where
    T: Transport + ?Sized,
{
    for (idx, range) in plan.iter() {
        let size = range.len();
        transport
            .send(&buf[range], dest, tag)
            .map_err(|source| TransferError::Transport {
                call: first_call + idx,
                source,
            })?;

        if let Some(ref progress) = config.progress {
            progress.chunk_done(size);
        }
        emit(
            config,
            "sender",
            transfer_id,
            TransferEvent::ChunkSent {
                chunk_idx: idx,
                chunk_count: plan.count(),
                size,
            },
        );
    }
    Ok(())
}

fn begin(config: &TransferConfig, transfer_id: [u8; 16], plan: &ChunkPlan, dest: Endpoint, tag: Tag) {
    if let Some(ref progress) = config.progress {
        progress.start(plan.len() as u64, plan.count());
    }
    emit(
        config,
        "sender",
        transfer_id,
        TransferEvent::TransferStarted {
            peer: dest,
            tag,
            total_bytes: plan.len() as u64,
            chunk_count: plan.count(),
        },
    );
}

fn finish(
    config: &TransferConfig,
    transfer_id: [u8; 16],
    plan: &ChunkPlan,
    start: Instant,
    result: Result<(), TransferError>,
) -> Result<u64, TransferError> {
    let duration_ms = start.elapsed().as_millis() as u64;
    match result {
        Ok(()) => {
            if let Some(ref progress) = config.progress {
                progress.complete();
            }
            emit(
                config,
                "sender",
                transfer_id,
                TransferEvent::TransferComplete {
                    total_bytes: plan.len() as u64,
                    chunk_count: plan.count(),
                    duration_ms,
                },
            );
            Ok(duration_ms)
        }
        Err(e) => {
            if let Some(ref progress) = config.progress {
                progress.fail(e.to_string());
            }
            emit(
                config,
                "sender",
                transfer_id,
                TransferEvent::Error {
                    message: e.to_string(),
                },
            );
            Err(e)
        }
    }
}
