/// Chunked receiver.
///
/// Mirrors the sender: one header receive, then one receive per planned
/// chunk into consecutive slices of the destination buffer. Every chunk must
/// arrive with exactly its planned size.

use std::time::Instant;

use crate::config::TransferConfig;
use crate::error::TransferError;
use crate::logging::{TransferEvent, emit};
use crate::protocol::*;
use crate::sender::payload_digest;
use crate::transport::{Endpoint, RecvStatus, Tag, Transport};

/// Result of a completed receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecvReport {
    pub transfer_id: [u8; 16],
    pub total_bytes: u64,
    pub chunk_count: u64,
    /// Status of the last receive (the header for an empty transfer).
    pub status: RecvStatus,
    /// True when a digest was present and checked.
    pub digest_verified: bool,
    pub duration_ms: u64,
}

/// Receive a header-framed transfer from `source` into `buf`.
///
/// The payload lands in `buf[..report.total_bytes]`. Fails with
/// `BufferTooSmall` when the announced length exceeds `buf`.
pub fn recv_big<T>(
    transport: &mut T,
    buf: &mut [u8],
    source: Endpoint,
    tag: Tag,
    config: &TransferConfig,
) -> Result<RecvReport, TransferError>
where
    T: Transport + ?Sized,
{
    let start = Instant::now();
    let (header, status) = recv_header(transport, source, tag, config)?;
    if header.total_len > buf.len() as u64 {
        return Err(fail(
            config,
            header.transfer_id,
            TransferError::BufferTooSmall {
                needed: header.total_len,
                available: buf.len() as u64,
            },
        ));
    }
    let total = header.total_len as usize;
    recv_payload(transport, &mut buf[..total], &header, status, source, tag, config, start)
}

/// Receive a header-framed transfer into a freshly allocated buffer sized
/// from the header. Lengths above `config.max_total_len` are refused before
/// allocating.
pub fn recv_big_vec<T>(
    transport: &mut T,
    source: Endpoint,
    tag: Tag,
    config: &TransferConfig,
) -> Result<(Vec<u8>, RecvReport), TransferError>
where
    T: Transport + ?Sized,
{
    let start = Instant::now();
    let (header, status) = recv_header(transport, source, tag, config)?;
    if header.total_len > config.max_total_len || usize::try_from(header.total_len).is_err() {
        return Err(fail(
            config,
            header.transfer_id,
            TransferError::TooLarge {
                len: header.total_len,
                limit: config.max_total_len,
            },
        ));
    }
    let mut buf = vec![0u8; header.total_len as usize];
    let report = recv_payload(transport, &mut buf, &header, status, source, tag, config, start)?;
    Ok((buf, report))
}

/// Receive a transfer whose chunk count travels in the first 8 bytes of the
/// first chunk (u64 LE), into a buffer of the expected total length.
///
/// After return the first 8 bytes of `buf` hold the count, not payload.
/// The announced count must equal `ceil(buf.len() / max_chunk_size)`.
pub fn recv_big_in_place<T>(
    transport: &mut T,
    buf: &mut [u8],
    source: Endpoint,
    tag: Tag,
    config: &TransferConfig,
) -> Result<RecvReport, TransferError>
where
    T: Transport + ?Sized,
{
    if config.max_chunk_size < COUNT_PREFIX {
        return Err(TransferError::InvalidChunkSize);
    }
    if buf.len() < COUNT_PREFIX {
        return Err(TransferError::BufferTooSmall {
            needed: COUNT_PREFIX as u64,
            available: buf.len() as u64,
        });
    }

    let start = Instant::now();
    let plan = ChunkPlan::new(buf.len(), config.max_chunk_size)?;
    // Local id for log correlation only.
    let transfer_id = [0u8; 16];

    let result = (|| -> Result<RecvStatus, TransferError> {
        let mut status = recv_chunk(&mut *transport, &mut *buf, &plan, 0, 0, source, tag)?;

        let announced = read_count_prefix(buf)?;
        if announced != plan.count() {
            return Err(TransferError::ChunkCountMismatch {
                announced,
                expected: plan.count(),
            });
        }
        started(config, transfer_id, &plan, source);
        chunk_received(config, transfer_id, &plan, 0);

        for idx in 1..plan.count() {
            status = recv_chunk(&mut *transport, &mut *buf, &plan, idx, idx, source, tag)?;
            chunk_received(config, transfer_id, &plan, idx);
        }
        Ok(status)
    })();

    match result {
        Ok(status) => Ok(complete(config, transfer_id, &plan, status, false, start)),
        Err(e) => Err(fail(config, transfer_id, e)),
    }
}

fn recv_header<T>(
    transport: &mut T,
    source: Endpoint,
    tag: Tag,
    config: &TransferConfig,
) -> Result<(TransferHeader, RecvStatus), TransferError>
where
    T: Transport + ?Sized,
{
    let mut raw = [0u8; HEADER_LEN];
    let status = transport
        .recv(&mut raw, source, tag)
        .map_err(|source| fail(config, [0u8; 16], TransferError::Transport { call: 0, source }))?;
    let header = TransferHeader::decode(&raw[..status.len]).map_err(|e| fail(config, [0u8; 16], e))?;

    if header.chunk_size > config.max_chunk_size as u64 {
        return Err(fail(
            config,
            header.transfer_id,
            TransferError::ChunkTooLarge {
                got: header.chunk_size,
                limit: config.max_chunk_size,
            },
        ));
    }
    Ok((header, status))
}

#[allow(clippy::too_many_arguments)]
fn recv_payload<T>(
    transport: &mut T,
    buf: &mut [u8],
    header: &TransferHeader,
    header_status: RecvStatus,
    source: Endpoint,
    tag: Tag,
    config: &TransferConfig,
    start: Instant,
) -> Result<RecvReport, TransferError>
where
    T: Transport + ?Sized,
{
    let transfer_id = header.transfer_id;
    // chunk_size <= max_chunk_size (a usize) was checked with the header.
    let plan = ChunkPlan::new(buf.len(), header.chunk_size as usize)?;
    started(config, transfer_id, &plan, source);

    let result = (|| -> Result<(RecvStatus, bool), TransferError> {
        let mut status = header_status;
        for idx in 0..plan.count() {
            status = recv_chunk(&mut *transport, &mut *buf, &plan, idx, idx + 1, source, tag)?;
            chunk_received(config, transfer_id, &plan, idx);
        }

        let mut verified = false;
        if let (Some(expected), true) = (header.digest, config.verify_digest) {
            let actual = payload_digest(buf);
            let matched = actual == expected;
            emit(config, "receiver", transfer_id, TransferEvent::DigestVerified { matched });
            if !matched {
                return Err(TransferError::DigestMismatch {
                    expected: hex::encode(expected),
                    actual: hex::encode(actual),
                });
            }
            verified = true;
        }
        Ok((status, verified))
    })();

    match result {
        Ok((status, verified)) => Ok(complete(config, transfer_id, &plan, status, verified, start)),
        Err(e) => Err(fail(config, transfer_id, e)),
    }
}

/// Receive chunk `idx` of `plan` into its slice of `buf`.
fn recv_chunk<T>(
    transport: &mut T,
    buf: &mut [u8],
    plan: &ChunkPlan,
    idx: u64,
    call: u64,
    source: Endpoint,
    tag: Tag,
) -> Result<RecvStatus, TransferError>
where
    T: Transport + ?Sized,
{
    let Some(range) = plan.range(idx) else {
        return Err(TransferError::ChunkCountMismatch {
            announced: idx + 1,
            expected: plan.count(),
        });
    };
    let expected = range.len();
    let status = transport
        .recv(&mut buf[range], source, tag)
        .map_err(|source| TransferError::Transport { call, source })?;
    if status.len != expected {
        return Err(TransferError::ShortChunk {
            index: idx,
            expected,
            received: status.len,
        });
    }
    Ok(status)
}

fn started(config: &TransferConfig, transfer_id: [u8; 16], plan: &ChunkPlan, source: Endpoint) {
    if let Some(ref progress) = config.progress {
        progress.start(plan.len() as u64, plan.count());
    }
    emit(
        config,
        "receiver",
        transfer_id,
        TransferEvent::HeaderReceived {
            peer: source,
            total_bytes: plan.len() as u64,
            chunk_size: plan.chunk_size() as u64,
            chunk_count: plan.count(),
        },
    );
}

fn chunk_received(config: &TransferConfig, transfer_id: [u8; 16], plan: &ChunkPlan, idx: u64) {
    let size = plan.range(idx).map(|r| r.len()).unwrap_or(0);
    if let Some(ref progress) = config.progress {
        progress.chunk_done(size);
    }
    emit(
        config,
        "receiver",
        transfer_id,
        TransferEvent::ChunkReceived {
            chunk_idx: idx,
            chunk_count: plan.count(),
            size,
        },
    );
}

fn complete(
    config: &TransferConfig,
    transfer_id: [u8; 16],
    plan: &ChunkPlan,
    status: RecvStatus,
    digest_verified: bool,
    start: Instant,
) -> RecvReport {
    let duration_ms = start.elapsed().as_millis() as u64;
    if let Some(ref progress) = config.progress {
        progress.complete();
    }
    emit(
        config,
        "receiver",
        transfer_id,
        TransferEvent::TransferComplete {
            total_bytes: plan.len() as u64,
            chunk_count: plan.count(),
            duration_ms,
        },
    );
    RecvReport {
        transfer_id,
        total_bytes: plan.len() as u64,
        chunk_count: plan.count(),
        status,
        digest_verified,
        duration_ms,
    }
}

fn fail(config: &TransferConfig, transfer_id: [u8; 16], e: TransferError) -> TransferError {
    if let Some(ref progress) = config.progress {
        progress.fail(e.to_string());
    }
    emit(
        config,
        "receiver",
        transfer_id,
        TransferEvent::Error {
            message: e.to_string(),
        },
    );
    e
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::error::TransportError;

    /// Replays scripted messages; fails receive number `fail_at` with status 7.
    struct Script {
        inbox: VecDeque<Vec<u8>>,
        calls: usize,
        fail_at: Option<usize>,
    }

    impl Script {
        fn new(messages: Vec<Vec<u8>>) -> Self {
            Self {
                inbox: messages.into(),
                calls: 0,
                fail_at: None,
            }
        }
    }

    impl Transport for Script {
        fn local(&self) -> Endpoint {
            Endpoint(1)
        }

        fn send(&mut self, _buf: &[u8], _dest: Endpoint, _tag: Tag) -> Result<(), TransportError> {
            unreachable!("receiver never sends")
        }

        fn recv(&mut self, buf: &mut [u8], source: Endpoint, tag: Tag) -> Result<RecvStatus, TransportError> {
            let call = self.calls;
            self.calls += 1;
            if self.fail_at == Some(call) {
                return Err(TransportError::Status(7));
            }
            let msg = self.inbox.pop_front().ok_or(TransportError::Disconnected(source))?;
            if msg.len() > buf.len() {
                return Err(TransportError::Truncated {
                    len: msg.len() as u64,
                    capacity: buf.len(),
                });
            }
            buf[..msg.len()].copy_from_slice(&msg);
            Ok(RecvStatus { source, tag, len: msg.len() })
        }
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    fn framed(payload: &[u8], chunk: usize, digest: Option<[u8; 32]>) -> Vec<Vec<u8>> {
        let plan = ChunkPlan::new(payload.len(), chunk).unwrap();
        let mut msgs = vec![TransferHeader::for_plan([9u8; 16], &plan, digest).encode().to_vec()];
        msgs.extend(plan.iter().map(|(_, r)| payload[r].to_vec()));
        msgs
    }

    fn config(chunk: usize) -> TransferConfig {
        TransferConfig::default().with_max_chunk_size(chunk)
    }

    #[test]
    fn test_receive_framed() {
        let payload = pattern(25);
        let mut t = Script::new(framed(&payload, 10, None));
        let mut buf = vec![0u8; 25];
        let report = recv_big(&mut t, &mut buf, Endpoint(0), Tag(3), &config(10)).unwrap();

        assert_eq!(buf, payload);
        assert_eq!(report.chunk_count, 3);
        assert_eq!(report.transfer_id, [9u8; 16]);
        assert_eq!(report.status.len, 5);
        assert_eq!(report.status.tag, Tag(3));
        assert!(!report.digest_verified);
        assert_eq!(t.calls, 4);
    }

    #[test]
    fn test_receive_into_larger_buffer() {
        let payload = pattern(20);
        let mut t = Script::new(framed(&payload, 10, None));
        let mut buf = vec![0xEEu8; 32];
        let report = recv_big(&mut t, &mut buf, Endpoint(0), Tag(0), &config(10)).unwrap();
        assert_eq!(report.total_bytes, 20);
        assert_eq!(&buf[..20], &payload[..]);
        assert_eq!(&buf[20..], &[0xEE; 12]);
    }

    #[test]
    fn test_buffer_too_small() {
        let payload = pattern(25);
        let mut t = Script::new(framed(&payload, 10, None));
        let mut buf = vec![0u8; 24];
        let err = recv_big(&mut t, &mut buf, Endpoint(0), Tag(0), &config(10)).unwrap_err();
        assert!(matches!(err, TransferError::BufferTooSmall { needed: 25, available: 24 }));
        assert_eq!(t.calls, 1);
    }

    #[test]
    fn test_chunk_too_large_for_receiver() {
        let payload = pattern(25);
        let mut t = Script::new(framed(&payload, 10, None));
        let mut buf = vec![0u8; 25];
        let err = recv_big(&mut t, &mut buf, Endpoint(0), Tag(0), &config(8)).unwrap_err();
        assert!(matches!(err, TransferError::ChunkTooLarge { got: 10, limit: 8 }));
    }

    #[test]
    fn test_short_chunk_rejected() {
        let payload = pattern(25);
        let mut msgs = framed(&payload, 10, None);
        msgs[2].truncate(6);
        let mut t = Script::new(msgs);
        let mut buf = vec![0u8; 25];
        let err = recv_big(&mut t, &mut buf, Endpoint(0), Tag(0), &config(10)).unwrap_err();
        assert!(matches!(err, TransferError::ShortChunk { index: 1, expected: 10, received: 6 }));
    }

    #[test]
    fn test_failure_stops_further_receives() {
        let payload = pattern(45);
        let mut t = Script::new(framed(&payload, 10, None));
        t.fail_at = Some(2);
        let mut buf = vec![0u8; 45];
        let err = recv_big(&mut t, &mut buf, Endpoint(0), Tag(0), &config(10)).unwrap_err();
        assert!(matches!(
            err,
            TransferError::Transport { call: 2, source: TransportError::Status(7) }
        ));
        assert_eq!(t.calls, 3);
    }

    #[test]
    fn test_digest_checked() {
        let payload = pattern(25);
        let digest = payload_digest(&payload);
        let mut t = Script::new(framed(&payload, 10, Some(digest)));
        let mut buf = vec![0u8; 25];
        let report = recv_big(&mut t, &mut buf, Endpoint(0), Tag(0), &config(10)).unwrap();
        assert!(report.digest_verified);

        let mut msgs = framed(&payload, 10, Some(digest));
        msgs[1][0] ^= 0xFF;
        let mut t = Script::new(msgs);
        let err = recv_big(&mut t, &mut buf, Endpoint(0), Tag(0), &config(10)).unwrap_err();
        assert!(matches!(err, TransferError::DigestMismatch { .. }));
    }

    #[test]
    fn test_digest_check_can_be_disabled() {
        let payload = pattern(25);
        let mut msgs = framed(&payload, 10, Some([0u8; 32]));
        msgs[1][0] ^= 0xFF;
        let mut t = Script::new(msgs);
        let mut cfg = config(10);
        cfg.verify_digest = false;
        let mut buf = vec![0u8; 25];
        let report = recv_big(&mut t, &mut buf, Endpoint(0), Tag(0), &cfg).unwrap();
        assert!(!report.digest_verified);
    }

    #[test]
    fn test_recv_vec_sizes_from_header() {
        let payload = pattern(33);
        let mut t = Script::new(framed(&payload, 10, None));
        let (data, report) = recv_big_vec(&mut t, Endpoint(0), Tag(0), &config(10)).unwrap();
        assert_eq!(data, payload);
        assert_eq!(report.chunk_count, 4);
    }

    #[test]
    fn test_recv_vec_limit() {
        let payload = pattern(33);
        let mut t = Script::new(framed(&payload, 10, None));
        let mut cfg = config(10);
        cfg.max_total_len = 32;
        let err = recv_big_vec(&mut t, Endpoint(0), Tag(0), &cfg).unwrap_err();
        assert!(matches!(err, TransferError::TooLarge { len: 33, limit: 32 }));
    }

    #[test]
    fn test_empty_transfer() {
        let mut t = Script::new(framed(&[], 10, None));
        let mut buf = [0u8; 0];
        let report = recv_big(&mut t, &mut buf, Endpoint(0), Tag(0), &config(10)).unwrap();
        assert_eq!(report.chunk_count, 0);
        assert_eq!(report.status.len, HEADER_LEN);
    }

    #[test]
    fn test_in_place_receive() {
        let mut payload = pattern(25);
        write_count_prefix(&mut payload, 3).unwrap();
        let msgs = vec![payload[..10].to_vec(), payload[10..20].to_vec(), payload[20..].to_vec()];
        let mut t = Script::new(msgs);
        let mut buf = vec![0u8; 25];
        let report = recv_big_in_place(&mut t, &mut buf, Endpoint(0), Tag(0), &config(10)).unwrap();
        assert_eq!(buf, payload);
        assert_eq!(report.chunk_count, 3);
        assert_eq!(report.status.len, 5);
    }

    #[test]
    fn test_in_place_exact_multiple() {
        let mut payload = pattern(20);
        write_count_prefix(&mut payload, 2).unwrap();
        let mut t = Script::new(vec![payload[..10].to_vec(), payload[10..].to_vec()]);
        let mut buf = vec![0u8; 20];
        let report = recv_big_in_place(&mut t, &mut buf, Endpoint(0), Tag(0), &config(10)).unwrap();
        assert_eq!(report.status.len, 10);
        assert_eq!(buf, payload);
    }

    #[test]
    fn test_in_place_count_mismatch() {
        let mut payload = pattern(25);
        write_count_prefix(&mut payload, 5).unwrap();
        let mut t = Script::new(vec![payload[..10].to_vec()]);
        let mut buf = vec![0u8; 25];
        let err = recv_big_in_place(&mut t, &mut buf, Endpoint(0), Tag(0), &config(10)).unwrap_err();
        assert!(matches!(err, TransferError::ChunkCountMismatch { announced: 5, expected: 3 }));
        assert_eq!(t.calls, 1);
    }

    #[test]
    fn test_in_place_rejects_tiny_buffer() {
        let mut t = Script::new(vec![]);
        let mut buf = [0u8; 7];
        assert!(matches!(
            recv_big_in_place(&mut t, &mut buf, Endpoint(0), Tag(0), &config(10)),
            Err(TransferError::BufferTooSmall { .. })
        ));
        assert_eq!(t.calls, 0);
    }
}
