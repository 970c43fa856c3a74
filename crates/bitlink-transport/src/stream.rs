use std::io::{ErrorKind, Read, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::time::Instant;

use bytes::{Buf, BytesMut};
use tracing::{debug, warn};

use crate::error::{Result, TransportError};
use crate::traits::Transport;

const READ_CHUNK_SIZE: usize = 1024;

/// Nominal outbound headroom reported for OS-buffered streams.
///
/// Socket send buffers are far larger than any frame, so the headroom wait
/// in the engine effectively never blocks on this adapter.
const STREAM_TX_HEADROOM: usize = 64 * 1024;

/// Adapts a nonblocking `Read + Write` byte stream to the [`Transport`]
/// capability surface.
///
/// Incoming bytes are pumped into an internal buffer on every
/// [`bytes_available`](Transport::bytes_available) call, so the engine's
/// byte-at-a-time polling never blocks on the OS. The wrapped stream must
/// already be in nonblocking mode; use the [`connect_unix`] /
/// [`StreamTransport::unix`] constructors for sockets, which arrange that.
pub struct StreamTransport<S> {
    stream: S,
    rx: BytesMut,
    epoch: Instant,
    peer_gone: bool,
}

/// Connect to a Unix domain socket and wrap it as a transport.
pub fn connect_unix(path: impl AsRef<Path>) -> Result<StreamTransport<UnixStream>> {
    let path = path.as_ref();
    let stream = UnixStream::connect(path).map_err(|source| TransportError::Connect {
        path: path.to_path_buf(),
        source,
    })?;
    StreamTransport::unix(stream)
}

impl StreamTransport<UnixStream> {
    /// Wrap an already-connected Unix domain socket stream.
    pub fn unix(stream: UnixStream) -> Result<Self> {
        stream.set_nonblocking(true)?;
        Ok(Self::from_nonblocking(stream))
    }
}

impl StreamTransport<std::net::TcpStream> {
    /// Wrap an already-connected TCP stream.
    pub fn tcp(stream: std::net::TcpStream) -> Result<Self> {
        stream.set_nonblocking(true)?;
        Ok(Self::from_nonblocking(stream))
    }
}

impl<S: Read + Write> StreamTransport<S> {
    /// Wrap a stream that is already in nonblocking mode.
    pub fn from_nonblocking(stream: S) -> Self {
        Self {
            stream,
            rx: BytesMut::with_capacity(READ_CHUNK_SIZE),
            epoch: Instant::now(),
            peer_gone: false,
        }
    }

    /// Whether the peer has closed its end of the stream.
    pub fn peer_gone(&self) -> bool {
        self.peer_gone
    }

    /// Consume the adapter and return the inner stream.
    pub fn into_inner(self) -> S {
        self.stream
    }

    /// Drain everything the OS currently has for us into the rx buffer.
    fn pump(&mut self) {
        if self.peer_gone {
            return;
        }
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => {
                    debug!("stream peer closed the connection");
                    self.peer_gone = true;
                    return;
                }
                Ok(n) => self.rx.extend_from_slice(&chunk[..n]),
                Err(err) if err.kind() == ErrorKind::WouldBlock => return,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    warn!(%err, "stream read failed, treating peer as gone");
                    self.peer_gone = true;
                    return;
                }
            }
        }
    }
}

impl<S: Read + Write> Transport for StreamTransport<S> {
    fn write_bytes(&mut self, bytes: &[u8]) {
        let mut offset = 0usize;
        while offset < bytes.len() {
            match self.stream.write(&bytes[offset..]) {
                Ok(0) => {
                    debug!("stream write returned 0, peer gone");
                    self.peer_gone = true;
                    return;
                }
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    warn!(%err, "stream write failed, dropping remaining bytes");
                    self.peer_gone = true;
                    return;
                }
            }
        }
    }

    fn read_byte(&mut self) -> u8 {
        if self.rx.is_empty() {
            return 0;
        }
        self.rx.get_u8()
    }

    fn bytes_available(&mut self) -> usize {
        self.pump();
        self.rx.len()
    }

    fn tx_headroom(&mut self) -> usize {
        if self.peer_gone {
            0
        } else {
            STREAM_TX_HEADROOM
        }
    }

    fn flush_tx(&mut self) {
        loop {
            match self.stream.flush() {
                Ok(()) => return,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    warn!(%err, "stream flush failed");
                    return;
                }
            }
        }
    }

    fn now_millis(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }
}
