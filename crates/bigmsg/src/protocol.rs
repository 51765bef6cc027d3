/// Chunk planning and the transfer header format.
///
/// A transfer is one header message followed by `chunk_count` payload
/// messages on the same (endpoint, tag):
///
/// ```text
/// [0..4]    Magic "BMSG"
/// [4]       Version
/// [5]       Flags (bit 0: payload digest present)
/// [6..8]    Reserved, zero
/// [8..24]   Transfer ID (UUID, 16 bytes)
/// [24..32]  Total length (u64 BE)
/// [32..40]  Chunk size (u64 BE)
/// [40..48]  Chunk count (u64 BE)
/// [48..80]  SHA-256 of the payload (zero when the flag is clear)
/// ```
///
/// The legacy in-place framing carries no header: the chunk count sits in
/// the first `COUNT_PREFIX` bytes of the first chunk (u64 LE).

use std::ops::Range;

use crate::error::TransferError;

/// Largest single message the transport is trusted with (1 GiB).
pub const MAX_CHUNK_SIZE: usize = 1 << 30;

/// Header magic.
pub const MAGIC: [u8; 4] = *b"BMSG";

/// Header format version.
pub const VERSION: u8 = 1;

/// Header size in bytes.
pub const HEADER_LEN: usize = 80;

/// Header flag: bytes 48..80 hold the SHA-256 of the payload.
pub const FLAG_DIGEST: u8 = 1 << 0;

/// Bytes of the first chunk holding the count in the in-place framing.
pub const COUNT_PREFIX: usize = 8;

/// Number of chunks needed for `len` bytes: `ceil(len / chunk_size)`.
pub fn chunk_count(len: usize, chunk_size: usize) -> Result<u64, TransferError> {
    if chunk_size == 0 {
        return Err(TransferError::InvalidChunkSize);
    }
    Ok(len.div_ceil(chunk_size) as u64)
}

/// The ordered chunk layout of a buffer.
///
/// Every chunk except the last is exactly `chunk_size` bytes. The last one
/// carries the remainder, or a full chunk when `len` is an exact multiple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    len: usize,
    chunk_size: usize,
    count: u64,
}

impl ChunkPlan {
    pub fn new(len: usize, chunk_size: usize) -> Result<Self, TransferError> {
        let count = chunk_count(len, chunk_size)?;
        Ok(Self {
            len,
            chunk_size,
            count,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// Byte range of chunk `index`, or None past the end.
    pub fn range(&self, index: u64) -> Option<Range<usize>> {
        if index >= self.count {
            return None;
        }
        let start = index as usize * self.chunk_size;
        let end = (start + self.chunk_size).min(self.len);
        Some(start..end)
    }

    /// Size of the final chunk (0 for an empty plan).
    pub fn last_chunk_len(&self) -> usize {
        self.range(self.count.saturating_sub(1))
            .map(|r| r.len())
            .unwrap_or(0)
    }

    pub fn iter(&self) -> ChunkIter {
        ChunkIter {
            plan: *self,
            next: 0,
        }
    }
}

impl IntoIterator for &ChunkPlan {
    type Item = (u64, Range<usize>);
    type IntoIter = ChunkIter;

    fn into_iter(self) -> ChunkIter {
        self.iter()
    }
}

/// Iterator over `(index, byte range)` of a [`ChunkPlan`].
#[derive(Debug, Clone)]
pub struct ChunkIter {
    plan: ChunkPlan,
    next: u64,
}

impl Iterator for ChunkIter {
    type Item = (u64, Range<usize>);

    fn next(&mut self) -> Option<Self::Item> {
        let range = self.plan.range(self.next)?;
        let index = self.next;
        self.next += 1;
        Some((index, range))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.plan.count - self.next) as usize;
        (left, Some(left))
    }
}

impl ExactSizeIterator for ChunkIter {}

/// Parsed transfer header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferHeader {
    pub transfer_id: [u8; 16],
    pub total_len: u64,
    pub chunk_size: u64,
    pub chunk_count: u64,
    pub digest: Option<[u8; 32]>,
}

impl TransferHeader {
    /// Header describing `len` bytes sent in chunks of `chunk_size`.
    pub fn for_plan(transfer_id: [u8; 16], plan: &ChunkPlan, digest: Option<[u8; 32]>) -> Self {
        Self {
            transfer_id,
            total_len: plan.len() as u64,
            chunk_size: plan.chunk_size() as u64,
            chunk_count: plan.count(),
            digest,
        }
    }

    /// Serialize into a fixed-size header message.
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0..4].copy_from_slice(&MAGIC);
        buf[4] = VERSION;
        buf[8..24].copy_from_slice(&self.transfer_id);
        buf[24..32].copy_from_slice(&self.total_len.to_be_bytes());
        buf[32..40].copy_from_slice(&self.chunk_size.to_be_bytes());
        buf[40..48].copy_from_slice(&self.chunk_count.to_be_bytes());
        if let Some(digest) = self.digest {
            buf[5] |= FLAG_DIGEST;
            buf[48..80].copy_from_slice(&digest);
        }
        buf
    }

    /// Parse and validate a header message.
    pub fn decode(data: &[u8]) -> Result<Self, TransferError> {
        if data.len() != HEADER_LEN {
            return Err(TransferError::BadHeader(format!(
                "expected {} bytes, got {}",
                HEADER_LEN,
                data.len()
            )));
        }
        if data[0..4] != MAGIC {
            return Err(TransferError::BadHeader("bad magic".into()));
        }
        if data[4] != VERSION {
            return Err(TransferError::BadHeader(format!(
                "unsupported version {}",
                data[4]
            )));
        }
        let flags = data[5];
        if flags & !FLAG_DIGEST != 0 || data[6..8] != [0, 0] {
            return Err(TransferError::BadHeader("reserved bits set".into()));
        }

        let mut transfer_id = [0u8; 16];
        transfer_id.copy_from_slice(&data[8..24]);
        let total_len = read_u64(&data[24..32]);
        let chunk_size = read_u64(&data[32..40]);
        let chunk_count = read_u64(&data[40..48]);

        if chunk_size == 0 {
            return Err(TransferError::BadHeader("zero chunk size".into()));
        }
        if chunk_count != total_len.div_ceil(chunk_size) {
            return Err(TransferError::BadHeader(format!(
                "chunk count {} does not cover {} bytes in chunks of {}",
                chunk_count, total_len, chunk_size
            )));
        }

        let digest = if flags & FLAG_DIGEST != 0 {
            let mut d = [0u8; 32];
            d.copy_from_slice(&data[48..80]);
            Some(d)
        } else {
            None
        };

        Ok(Self {
            transfer_id,
            total_len,
            chunk_size,
            chunk_count,
            digest,
        })
    }
}

/// Write the in-place chunk count into the first `COUNT_PREFIX` bytes.
pub fn write_count_prefix(buf: &mut [u8], count: u64) -> Result<(), TransferError> {
    let available = buf.len() as u64;
    let prefix = buf
        .get_mut(..COUNT_PREFIX)
        .ok_or(TransferError::BufferTooSmall {
            needed: COUNT_PREFIX as u64,
            available,
        })?;
    prefix.copy_from_slice(&count.to_le_bytes());
    Ok(())
}

/// Read the in-place chunk count from the first `COUNT_PREFIX` bytes.
pub fn read_count_prefix(buf: &[u8]) -> Result<u64, TransferError> {
    let prefix = buf.get(..COUNT_PREFIX).ok_or(TransferError::BufferTooSmall {
        needed: COUNT_PREFIX as u64,
        available: buf.len() as u64,
    })?;
    let mut bytes = [0u8; COUNT_PREFIX];
    bytes.copy_from_slice(prefix);
    Ok(u64::from_le_bytes(bytes))
}

fn read_u64(b: &[u8]) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(b);
    u64::from_be_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sizes(len: usize, chunk: usize) -> Vec<usize> {
        ChunkPlan::new(len, chunk)
            .unwrap()
            .iter()
            .map(|(_, r)| r.len())
            .collect()
    }

    #[test]
    fn test_chunk_count_boundaries() {
        assert_eq!(chunk_count(0, 10).unwrap(), 0);
        assert_eq!(chunk_count(1, 10).unwrap(), 1);
        assert_eq!(chunk_count(9, 10).unwrap(), 1);
        assert_eq!(chunk_count(10, 10).unwrap(), 1);
        assert_eq!(chunk_count(11, 10).unwrap(), 2);
        assert_eq!(chunk_count(30, 10).unwrap(), 3);
        assert_eq!(chunk_count(MAX_CHUNK_SIZE + 1, MAX_CHUNK_SIZE).unwrap(), 2);
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        assert!(matches!(
            chunk_count(5, 0),
            Err(TransferError::InvalidChunkSize)
        ));
        assert!(ChunkPlan::new(5, 0).is_err());
    }

    #[test]
    fn test_plan_sizes() {
        assert_eq!(sizes(25, 10), vec![10, 10, 5]);
        // Exact multiple: last chunk is full, not empty.
        assert_eq!(sizes(20, 10), vec![10, 10]);
        assert_eq!(sizes(10, 10), vec![10]);
        assert_eq!(sizes(11, 10), vec![10, 1]);
        assert_eq!(sizes(7, 10), vec![7]);
        assert!(sizes(0, 10).is_empty());
        assert_eq!(sizes(40, 10), vec![10, 10, 10, 10]);
    }

    #[test]
    fn test_plan_covers_length() {
        for len in 0..=55 {
            let plan = ChunkPlan::new(len, 10).unwrap();
            let mut expected_start = 0;
            for (idx, r) in plan.iter() {
                assert_eq!(r.start, expected_start, "len={} idx={}", len, idx);
                assert!(!r.is_empty());
                expected_start = r.end;
            }
            assert_eq!(expected_start, len);
            assert_eq!(plan.iter().len() as u64, plan.count());
        }
    }

    #[test]
    fn test_last_chunk_len() {
        assert_eq!(ChunkPlan::new(25, 10).unwrap().last_chunk_len(), 5);
        assert_eq!(ChunkPlan::new(20, 10).unwrap().last_chunk_len(), 10);
        assert_eq!(ChunkPlan::new(0, 10).unwrap().last_chunk_len(), 0);
        assert!(ChunkPlan::new(20, 10).unwrap().range(2).is_none());
    }

    #[test]
    fn test_header_encode_decode() {
        let plan = ChunkPlan::new(25, 10).unwrap();
        let header = TransferHeader::for_plan([7u8; 16], &plan, Some([0xAB; 32]));
        let bytes = header.encode();
        assert_eq!(&bytes[0..4], b"BMSG");
        assert_eq!(bytes[5], FLAG_DIGEST);

        let parsed = TransferHeader::decode(&bytes).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(parsed.chunk_count, 3);
    }

    #[test]
    fn test_header_rejects_garbage() {
        let plan = ChunkPlan::new(25, 10).unwrap();
        let good = TransferHeader::for_plan([1u8; 16], &plan, None).encode();

        let mut bad_magic = good;
        bad_magic[0] = b'X';
        assert!(TransferHeader::decode(&bad_magic).is_err());

        let mut bad_version = good;
        bad_version[4] = 9;
        assert!(TransferHeader::decode(&bad_version).is_err());

        let mut bad_count = good;
        bad_count[40..48].copy_from_slice(&2u64.to_be_bytes());
        assert!(TransferHeader::decode(&bad_count).is_err());

        let mut zero_chunk = good;
        zero_chunk[32..40].copy_from_slice(&0u64.to_be_bytes());
        assert!(TransferHeader::decode(&zero_chunk).is_err());

        let mut reserved = good;
        reserved[6] = 1;
        assert!(TransferHeader::decode(&reserved).is_err());

        assert!(TransferHeader::decode(&good[..40]).is_err());
    }

    #[test]
    fn test_count_prefix() {
        let mut buf = [0xFFu8; 12];
        write_count_prefix(&mut buf, 3).unwrap();
        assert_eq!(&buf[..8], &3u64.to_le_bytes());
        assert_eq!(&buf[8..], &[0xFF; 4]);
        assert_eq!(read_count_prefix(&buf).unwrap(), 3);

        let mut short = [0u8; 5];
        assert!(matches!(
            write_count_prefix(&mut short, 1),
            Err(TransferError::BufferTooSmall { needed: 8, available: 5 })
        ));
        assert!(read_count_prefix(&short).is_err());
    }
}
