//! Per-connection state: the socket, its buffers, and its lifecycle.
//!
//! All teardown paths (peer EOF, transport error, protocol quit, server
//! shutdown) funnel through [`Connection::close`], which is idempotent.

use bytes::{Buf, BytesMut};
use mio::net::TcpStream;
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use tracing::debug;

/// Lifecycle state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    /// Accepting reads and writes.
    Open,
    /// Close requested; pending output is still being flushed.
    Closing,
    /// Terminal. No further I/O is issued.
    Closed,
}

/// Outcome of draining a readable socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Bytes appended to the read buffer (zero on a spurious wakeup).
    Data(usize),
    /// Peer closed its end of the connection.
    Eof,
}

/// A single accepted client connection.
pub struct Connection {
    pub(crate) stream: TcpStream,
    peer: SocketAddr,
    /// Accumulates raw reads until the framer extracts complete lines.
    pub(crate) read_buf: BytesMut,
    /// Output enqueued by the protocol handler, flushed by the reactor.
    write_buf: BytesMut,
    state: ConnState,
}

impl Connection {
    pub fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        Self {
            stream,
            peer,
            read_buf: BytesMut::new(),
            write_buf: BytesMut::new(),
            state: ConnState::Open,
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn state(&self) -> ConnState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == ConnState::Open
    }

    pub fn has_pending_output(&self) -> bool {
        !self.write_buf.is_empty()
    }

    /// Drain all currently available bytes into the read buffer.
    ///
    /// Reads until the socket would block. A wakeup with no data is a
    /// no-op and reports zero bytes.
    pub fn read_ready(&mut self) -> io::Result<ReadOutcome> {
        if self.state != ConnState::Open {
            return Ok(ReadOutcome::Data(0));
        }

        let mut total = 0;
        let mut chunk = [0u8; 4096];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => return Ok(ReadOutcome::Eof),
                Ok(n) => {
                    self.read_buf.extend_from_slice(&chunk[..n]);
                    total += n;
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(ReadOutcome::Data(total))
    }

    /// Enqueue bytes for transmission. The reactor flushes asynchronously.
    ///
    /// Writes after close are dropped (logged, not fatal).
    pub fn write(&mut self, bytes: &[u8]) {
        if self.state != ConnState::Open {
            debug!(peer = %self.peer, "dropped write on non-open connection");
            return;
        }
        self.write_buf.extend_from_slice(bytes);
    }

    /// Flush pending output until drained or the socket would block.
    pub fn flush(&mut self) -> io::Result<()> {
        while !self.write_buf.is_empty() {
            match self.stream.write(&self.write_buf) {
                Ok(0) => {
                    return Err(io::Error::new(io::ErrorKind::WriteZero, "write returned 0"))
                }
                Ok(n) => self.write_buf.advance(n),
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Request teardown. Idempotent: the single entry point for the peer
    /// EOF, transport error, protocol quit, and server shutdown paths.
    ///
    /// With pending output the connection lingers in `Closing` until the
    /// reactor drains it; calling again once drained completes the
    /// transition to `Closed`.
    pub fn close(&mut self) {
        if self.state == ConnState::Closed {
            return;
        }
        self.read_buf = BytesMut::new();
        self.state = if self.write_buf.is_empty() {
            ConnState::Closed
        } else {
            ConnState::Closing
        };
    }

    /// Teardown that discards pending output, for error and EOF paths.
    pub fn abort(&mut self) {
        self.write_buf.clear();
        self.close();
    }
}
