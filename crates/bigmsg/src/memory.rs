/// In-process transport: a full mesh of endpoints joined by channels.
///
/// Each endpoint owns one inbox. Messages from other sources or tags that
/// arrive while a receive is waiting are parked and handed out later in
/// arrival order, so per-(source, tag) ordering holds.

use std::collections::{HashMap, VecDeque};

use bytes::Bytes;
use crossbeam_channel::{Receiver, Sender, unbounded};

use crate::error::TransportError;
use crate::transport::{Endpoint, RecvStatus, Tag, Transport};

struct Envelope {
    source: Endpoint,
    tag: Tag,
    data: Bytes,
}

pub struct MemoryTransport {
    local: Endpoint,
    peers: HashMap<Endpoint, Sender<Envelope>>,
    inbox: Receiver<Envelope>,
    parked: VecDeque<Envelope>,
    max_message_size: Option<usize>,
}

impl MemoryTransport {
    /// `n` endpoints numbered 0..n, each able to reach every other (and itself).
    pub fn mesh(n: u32) -> Vec<Self> {
        let channels: Vec<(Sender<Envelope>, Receiver<Envelope>)> =
            (0..n).map(|_| unbounded()).collect();

        channels
            .iter()
            .enumerate()
            .map(|(i, (_, rx))| {
                let peers = channels
                    .iter()
                    .enumerate()
                    .map(|(j, (tx, _))| (Endpoint(j as u32), tx.clone()))
                    .collect();
                Self {
                    local: Endpoint(i as u32),
                    peers,
                    inbox: rx.clone(),
                    parked: VecDeque::new(),
                    max_message_size: None,
                }
            })
            .collect()
    }

    /// Two connected endpoints, 0 and 1.
    pub fn pair() -> (Self, Self) {
        let mut mesh = Self::mesh(2);
        let b = mesh.pop();
        let a = mesh.pop();
        match (a, b) {
            (Some(a), Some(b)) => (a, b),
            _ => unreachable!("mesh(2) yields two endpoints"),
        }
    }

    /// Refuse to send messages longer than `limit`, like a transport with a
    /// fixed-width length field.
    pub fn with_max_message_size(mut self, limit: usize) -> Self {
        self.max_message_size = Some(limit);
        self
    }

    /// Messages received but not yet claimed by a matching `recv`.
    pub fn parked(&self) -> usize {
        self.parked.len()
    }

    fn deliver(env: Envelope, buf: &mut [u8]) -> Result<RecvStatus, TransportError> {
        let len = env.data.len();
        if len > buf.len() {
            return Err(TransportError::Truncated {
                len: len as u64,
                capacity: buf.len(),
            });
        }
        buf[..len].copy_from_slice(&env.data);
        Ok(RecvStatus {
            source: env.source,
            tag: env.tag,
            len,
        })
    }
}

impl Transport for MemoryTransport {
    fn local(&self) -> Endpoint {
        self.local
    }

    fn send(&mut self, buf: &[u8], dest: Endpoint, tag: Tag) -> Result<(), TransportError> {
        if let Some(limit) = self.max_message_size {
            if buf.len() > limit {
                return Err(TransportError::MessageTooLarge {
                    len: buf.len(),
                    limit,
                });
            }
        }
        let tx = self.peers.get(&dest).ok_or(TransportError::UnknownPeer(dest))?;
        tx.send(Envelope {
            source: self.local,
            tag,
            data: Bytes::copy_from_slice(buf),
        })
        .map_err(|_| TransportError::Disconnected(dest))
    }

    fn recv(
        &mut self,
        buf: &mut [u8],
        source: Endpoint,
        tag: Tag,
    ) -> Result<RecvStatus, TransportError> {
        if let Some(pos) = self
            .parked
            .iter()
            .position(|e| e.source == source && e.tag == tag)
        {
            if let Some(env) = self.parked.remove(pos) {
                return Self::deliver(env, buf);
            }
        }

        loop {
            let env = self
                .inbox
                .recv()
                .map_err(|_| TransportError::Disconnected(source))?;
            if env.source == source && env.tag == tag {
                return Self::deliver(env, buf);
            }
            self.parked.push_back(env);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_roundtrip() {
        let (mut a, mut b) = MemoryTransport::pair();
        a.send(b"hello", Endpoint(1), Tag(1)).unwrap();
        let mut buf = [0u8; 16];
        let status = b.recv(&mut buf, Endpoint(0), Tag(1)).unwrap();
        assert_eq!(status.len, 5);
        assert_eq!(status.source, Endpoint(0));
        assert_eq!(&buf[..5], b"hello");
    }

    #[test]
    fn test_tag_matching_parks_others() {
        let (mut a, mut b) = MemoryTransport::pair();
        a.send(b"one", Endpoint(1), Tag(1)).unwrap();
        a.send(b"two", Endpoint(1), Tag(2)).unwrap();
        a.send(b"three", Endpoint(1), Tag(1)).unwrap();

        let mut buf = [0u8; 8];
        let s = b.recv(&mut buf, Endpoint(0), Tag(2)).unwrap();
        assert_eq!(&buf[..s.len], b"two");
        assert_eq!(b.parked(), 1);

        let s = b.recv(&mut buf, Endpoint(0), Tag(1)).unwrap();
        assert_eq!(&buf[..s.len], b"one");
        let s = b.recv(&mut buf, Endpoint(0), Tag(1)).unwrap();
        assert_eq!(&buf[..s.len], b"three");
    }

    #[test]
    fn test_truncation() {
        let (mut a, mut b) = MemoryTransport::pair();
        a.send(&[1u8; 10], Endpoint(1), Tag(0)).unwrap();
        let mut buf = [0u8; 4];
        assert!(matches!(
            b.recv(&mut buf, Endpoint(0), Tag(0)),
            Err(TransportError::Truncated { len: 10, capacity: 4 })
        ));
    }

    #[test]
    fn test_message_limit() {
        let (a, _b) = MemoryTransport::pair();
        let mut a = a.with_max_message_size(8);
        assert!(a.send(&[0u8; 8], Endpoint(1), Tag(0)).is_ok());
        assert!(matches!(
            a.send(&[0u8; 9], Endpoint(1), Tag(0)),
            Err(TransportError::MessageTooLarge { len: 9, limit: 8 })
        ));
    }

    #[test]
    fn test_unknown_peer() {
        let (mut a, _b) = MemoryTransport::pair();
        assert!(matches!(
            a.send(b"x", Endpoint(5), Tag(0)),
            Err(TransportError::UnknownPeer(Endpoint(5)))
        ));
    }

    #[test]
    fn test_mesh_sources() {
        let mut mesh = MemoryTransport::mesh(3);
        let mut c = mesh.pop().unwrap();
        let mut b = mesh.pop().unwrap();
        let mut a = mesh.pop().unwrap();
        a.send(b"from-a", Endpoint(2), Tag(0)).unwrap();
        b.send(b"from-b", Endpoint(2), Tag(0)).unwrap();

        let mut buf = [0u8; 8];
        let s = c.recv(&mut buf, Endpoint(1), Tag(0)).unwrap();
        assert_eq!(&buf[..s.len], b"from-b");
        let s = c.recv(&mut buf, Endpoint(0), Tag(0)).unwrap();
        assert_eq!(&buf[..s.len], b"from-a");
    }
}
