/// Blocking point-to-point transport seam.
///
/// A transport is the communication context: it knows its own endpoint and
/// moves whole messages to and from peers. Messages between one pair of
/// endpoints with the same tag are delivered in send order.

use std::fmt;

use crate::error::TransportError;

/// Peer identifier (a rank).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Endpoint(pub u32);

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Message tag. Receives match on (source, tag).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tag(pub i32);

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Descriptor of a completed receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecvStatus {
    pub source: Endpoint,
    pub tag: Tag,
    /// Bytes written into the receive buffer.
    pub len: usize,
}

/// Blocking, reliable, ordered message transport.
pub trait Transport {
    /// This side's endpoint.
    fn local(&self) -> Endpoint;

    /// Send one message. Blocks until the transport has taken it.
    fn send(&mut self, buf: &[u8], dest: Endpoint, tag: Tag) -> Result<(), TransportError>;

    /// Receive the next message from `source` carrying `tag` into the front
    /// of `buf`. Messages longer than `buf` fail with `Truncated`.
    fn recv(
        &mut self,
        buf: &mut [u8],
        source: Endpoint,
        tag: Tag,
    ) -> Result<RecvStatus, TransportError>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn local(&self) -> Endpoint {
        (**self).local()
    }

    fn send(&mut self, buf: &[u8], dest: Endpoint, tag: Tag) -> Result<(), TransportError> {
        (**self).send(buf, dest, tag)
    }

    fn recv(
        &mut self,
        buf: &mut [u8],
        source: Endpoint,
        tag: Tag,
    ) -> Result<RecvStatus, TransportError> {
        (**self).recv(buf, source, tag)
    }
}
