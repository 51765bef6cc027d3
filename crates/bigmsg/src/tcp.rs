/// TCP transport: one stream per peer.
///
/// ```text
/// hello (once per connection):  [0..4]  sender endpoint (u32 BE)
/// message:                      [0..4]  tag (i32 BE)
///                               [4..12] length (u64 BE)
///                               [12..]  payload
/// ```
///
/// Payloads for the tag being waited on are read straight into the caller's
/// buffer; messages for other tags are parked per peer.

use std::collections::{HashMap, VecDeque};
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};

use socket2::{Domain, Protocol, SockRef, Socket, Type};

use crate::error::TransportError;
use crate::transport::{Endpoint, RecvStatus, Tag, Transport};

/// Frame header size in bytes.
pub const FRAME_HEADER: usize = 12;

/// Socket send/receive buffer size (8 MB).
pub const SOCKET_BUFFER: usize = 8 * 1024 * 1024;

struct Peer {
    stream: TcpStream,
    parked: VecDeque<(Tag, Vec<u8>)>,
}

pub struct TcpTransport {
    local: Endpoint,
    peers: HashMap<Endpoint, Peer>,
}

impl TcpTransport {
    pub fn new(local: Endpoint) -> Self {
        Self {
            local,
            peers: HashMap::new(),
        }
    }

    /// Bind a listener with address reuse and the transport's buffer sizes.
    pub fn bind(addr: SocketAddr) -> io::Result<TcpListener> {
        let sock = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        sock.set_reuse_address(true)?;
        sock.set_recv_buffer_size(SOCKET_BUFFER)?;
        sock.bind(&addr.into())?;
        sock.listen(16)?;
        Ok(sock.into())
    }

    /// Connect to `peer` at `addr` and introduce ourselves.
    pub fn connect(&mut self, peer: Endpoint, addr: SocketAddr) -> Result<(), TransportError> {
        let sock = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        tune(&sock)?;
        sock.connect(&addr.into())?;
        let mut stream: TcpStream = sock.into();
        stream.write_all(&self.local.0.to_be_bytes())?;

        tracing::debug!(local = %self.local, %peer, %addr, "tcp peer connected");
        self.add_peer(peer, stream);
        Ok(())
    }

    /// Accept one connection and register the peer it introduces itself as.
    pub fn accept(&mut self, listener: &TcpListener) -> Result<Endpoint, TransportError> {
        let (mut stream, addr) = listener.accept()?;
        tune(&SockRef::from(&stream))?;

        let mut hello = [0u8; 4];
        stream.read_exact(&mut hello)?;
        let peer = Endpoint(u32::from_be_bytes(hello));

        tracing::debug!(local = %self.local, %peer, %addr, "tcp peer accepted");
        self.add_peer(peer, stream);
        Ok(peer)
    }

    /// Register an already-connected stream whose hello has been exchanged.
    pub fn add_peer(&mut self, peer: Endpoint, stream: TcpStream) {
        self.peers.insert(
            peer,
            Peer {
                stream,
                parked: VecDeque::new(),
            },
        );
    }

    pub fn peers(&self) -> impl Iterator<Item = Endpoint> + '_ {
        self.peers.keys().copied()
    }
}

impl Transport for TcpTransport {
    fn local(&self) -> Endpoint {
        self.local
    }

    fn send(&mut self, buf: &[u8], dest: Endpoint, tag: Tag) -> Result<(), TransportError> {
        let peer = self
            .peers
            .get_mut(&dest)
            .ok_or(TransportError::UnknownPeer(dest))?;

        let mut header = [0u8; FRAME_HEADER];
        header[0..4].copy_from_slice(&tag.0.to_be_bytes());
        header[4..12].copy_from_slice(&(buf.len() as u64).to_be_bytes());

        peer.stream
            .write_all(&header)
            .and_then(|_| peer.stream.write_all(buf))
            .map_err(|e| stream_error(dest, e))
    }

    fn recv(
        &mut self,
        buf: &mut [u8],
        source: Endpoint,
        tag: Tag,
    ) -> Result<RecvStatus, TransportError> {
        let peer = self
            .peers
            .get_mut(&source)
            .ok_or(TransportError::UnknownPeer(source))?;

        if let Some(pos) = peer.parked.iter().position(|(t, _)| *t == tag) {
            if let Some((_, data)) = peer.parked.remove(pos) {
                if data.len() > buf.len() {
                    return Err(TransportError::Truncated {
                        len: data.len() as u64,
                        capacity: buf.len(),
                    });
                }
                buf[..data.len()].copy_from_slice(&data);
                return Ok(RecvStatus {
                    source,
                    tag,
                    len: data.len(),
                });
            }
        }

        loop {
            let mut header = [0u8; FRAME_HEADER];
            peer.stream
                .read_exact(&mut header)
                .map_err(|e| stream_error(source, e))?;
            let frame_tag = Tag(i32::from_be_bytes([header[0], header[1], header[2], header[3]]));
            let mut len_bytes = [0u8; 8];
            len_bytes.copy_from_slice(&header[4..12]);
            let len = u64::from_be_bytes(len_bytes);

            if frame_tag == tag {
                if len > buf.len() as u64 {
                    // Consume the payload so the stream stays in sync.
                    io::copy(&mut (&peer.stream).take(len), &mut io::sink())
                        .map_err(|e| stream_error(source, e))?;
                    return Err(TransportError::Truncated {
                        len,
                        capacity: buf.len(),
                    });
                }
                let len = len as usize;
                peer.stream
                    .read_exact(&mut buf[..len])
                    .map_err(|e| stream_error(source, e))?;
                return Ok(RecvStatus { source, tag, len });
            }

            let mut data = Vec::new();
            (&peer.stream)
                .take(len)
                .read_to_end(&mut data)
                .map_err(|e| stream_error(source, e))?;
            if (data.len() as u64) < len {
                return Err(TransportError::Disconnected(source));
            }
            peer.parked.push_back((frame_tag, data));
        }
    }
}

fn tune(sock: &Socket) -> io::Result<()> {
    sock.set_nodelay(true)?;
    sock.set_send_buffer_size(SOCKET_BUFFER)?;
    sock.set_recv_buffer_size(SOCKET_BUFFER)?;
    Ok(())
}

fn stream_error(peer: Endpoint, e: io::Error) -> TransportError {
    match e.kind() {
        io::ErrorKind::UnexpectedEof
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe => TransportError::Disconnected(peer),
        _ => TransportError::Io(e),
    }
}
