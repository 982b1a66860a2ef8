//! mio event loop: the single-threaded reactor core.
//!
//! Readiness-based model: poll tells us when the listener or a connection
//! is ready, then we perform non-blocking accept/read/write syscalls.
//! Every handler runs to completion before the next event is dispatched,
//! so connection and registry state need no locking.

use crate::framer::extract_line;
use crate::runtime::connection::{ConnState, Connection, ReadOutcome};
use crate::runtime::registry::ConnectionRegistry;
use crate::runtime::ServerError;
use mio::net::TcpListener;
use mio::{Events, Interest, Poll, Token, Waker};
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const LISTENER_TOKEN: Token = Token(usize::MAX);
const WAKER_TOKEN: Token = Token(usize::MAX - 1);
const EVENT_BATCH: usize = 256;

/// Protocol seam: invoked once per complete line, in arrival order.
///
/// The handler may write to the connection or close it; after a close,
/// no further lines from that connection are delivered.
pub trait LineHandler {
    fn on_line(&mut self, conn: &mut Connection, line: &str);
}

/// Cloneable handle that requests loop termination.
#[derive(Clone)]
pub struct StopHandle {
    stop: Arc<AtomicBool>,
    waker: Arc<Waker>,
}

impl StopHandle {
    /// Stop the loop after its current dispatch pass. Subsequent calls
    /// are no-ops.
    pub fn stop(&self) {
        if !self.stop.swap(true, Ordering::SeqCst) {
            if let Err(e) = self.waker.wake() {
                warn!(error = %e, "failed to wake event loop");
            }
        }
    }
}

/// The reactor: owns the poll instance, the listener, and the registry
/// of live connections.
pub struct EventLoop {
    poll: Poll,
    listener: TcpListener,
    local_addr: SocketAddr,
    connections: ConnectionRegistry,
    stop: Arc<AtomicBool>,
    waker: Arc<Waker>,
}

impl EventLoop {
    /// Bind the listening endpoint and set up the poll instance.
    ///
    /// Bind failure is fatal; it is surfaced to the caller and never
    /// retried.
    pub fn bind(addr: SocketAddr, max_connections: usize) -> Result<Self, ServerError> {
        let poll = Poll::new().map_err(ServerError::Poll)?;
        let waker =
            Arc::new(Waker::new(poll.registry(), WAKER_TOKEN).map_err(ServerError::Poll)?);

        let listener = create_listener(addr).map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Bind { addr, source })?;

        let mut listener = TcpListener::from_std(listener);
        poll.registry()
            .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)
            .map_err(|source| ServerError::Bind { addr, source })?;

        Ok(Self {
            poll,
            listener,
            local_addr,
            connections: ConnectionRegistry::new(max_connections),
            stop: Arc::new(AtomicBool::new(false)),
            waker,
        })
    }

    /// The bound listening address (resolves port 0 to the real port).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            stop: Arc::clone(&self.stop),
            waker: Arc::clone(&self.waker),
        }
    }

    /// Block, dispatching readiness events until a stop is requested.
    ///
    /// On stop, every live connection is closed and the listening
    /// endpoint is released.
    pub fn run<H: LineHandler>(&mut self, handler: &mut H) -> Result<(), ServerError> {
        let mut events = Events::with_capacity(EVENT_BATCH);

        while !self.stop.load(Ordering::SeqCst) {
            if let Err(e) = self.poll.poll(&mut events, None) {
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(ServerError::Poll(e));
            }

            for event in events.iter() {
                match event.token() {
                    WAKER_TOKEN => {} // stop flag is checked at the top of the loop
                    LISTENER_TOKEN => self.accept_ready(),
                    Token(id) => self.connection_ready(id, event.is_readable(), handler),
                }
            }
        }

        self.shutdown();
        Ok(())
    }

    /// Accept every pending connection. Accept errors are logged and do
    /// not stop the listener.
    fn accept_ready(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    let Some(id) = self.connections.insert(Connection::new(stream, peer)) else {
                        warn!(%peer, "connection limit reached, rejecting");
                        continue;
                    };

                    // Re-borrow after insert to register under the slab token.
                    if let Some(conn) = self.connections.get_mut(id) {
                        if let Err(e) = self.poll.registry().register(
                            &mut conn.stream,
                            Token(id),
                            Interest::READABLE,
                        ) {
                            error!(%peer, error = %e, "failed to register connection");
                            self.connections.remove(id);
                            continue;
                        }
                    }

                    debug!(conn_id = id, %peer, "accepted connection");
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!(error = %e, "accept error");
                    break;
                }
            }
        }
    }

    /// Dispatch a readiness event for one connection, then reconcile its
    /// interest set or finish its teardown.
    fn connection_ready<H: LineHandler>(&mut self, id: usize, readable: bool, handler: &mut H) {
        // Stale event for a connection already torn down this pass.
        if !self.connections.contains(id) {
            return;
        }

        if readable {
            self.handle_readable(id, handler);
        }

        self.reconcile(id);
    }

    /// Drain the socket, then deliver every complete buffered line.
    fn handle_readable<H: LineHandler>(&mut self, id: usize, handler: &mut H) {
        let Some(conn) = self.connections.get_mut(id) else {
            return;
        };

        let outcome = match conn.read_ready() {
            Ok(outcome) => outcome,
            Err(e) => {
                debug!(peer = %conn.peer(), error = %e, "transport error");
                conn.abort();
                return;
            }
        };

        while conn.is_open() {
            match extract_line(&mut conn.read_buf) {
                Some(line) => handler.on_line(conn, &line),
                None => break,
            }
        }

        if outcome == ReadOutcome::Eof {
            debug!(peer = %conn.peer(), "peer closed connection");
            conn.close();
        }
    }

    /// Flush pending output, complete an in-progress close once drained,
    /// and keep the poll interest in sync with the connection state.
    fn reconcile(&mut self, id: usize) {
        let remove = {
            let Some(conn) = self.connections.get_mut(id) else {
                return;
            };

            if conn.has_pending_output() {
                if let Err(e) = conn.flush() {
                    debug!(peer = %conn.peer(), error = %e, "flush failed");
                    conn.abort();
                }
            }

            if conn.state() == ConnState::Closing && !conn.has_pending_output() {
                conn.close();
            }

            if conn.state() == ConnState::Closed {
                true
            } else {
                let interest = if conn.has_pending_output() {
                    Interest::READABLE | Interest::WRITABLE
                } else {
                    Interest::READABLE
                };
                match self
                    .poll
                    .registry()
                    .reregister(&mut conn.stream, Token(id), interest)
                {
                    Ok(()) => false,
                    Err(e) => {
                        debug!(peer = %conn.peer(), error = %e, "reregister failed");
                        conn.abort();
                        true
                    }
                }
            }
        };

        if remove {
            self.finalize_close(id);
        }
    }

    /// Release a closed connection: deregister its stream and drop it.
    fn finalize_close(&mut self, id: usize) {
        if let Some(mut conn) = self.connections.remove(id) {
            let _ = self.poll.registry().deregister(&mut conn.stream);
            debug!(conn_id = id, peer = %conn.peer(), "connection closed");
        }
    }

    /// Force-close every live connection and release the listener.
    fn shutdown(&mut self) {
        let live = self.connections.len();
        if live > 0 {
            info!(connections = live, "closing live connections");
        }
        for mut conn in self.connections.shutdown_all() {
            let _ = self.poll.registry().deregister(&mut conn.stream);
        }
        let _ = self.poll.registry().deregister(&mut self.listener);
        info!("server stopped");
    }
}

/// Create the listening socket: address reuse on, non-blocking, ready
/// for mio registration.
fn create_listener(addr: SocketAddr) -> io::Result<std::net::TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(1024)?;

    Ok(socket.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopHandler;

    impl LineHandler for NoopHandler {
        fn on_line(&mut self, _conn: &mut Connection, _line: &str) {}
    }

    #[test]
    fn test_bind_ephemeral_port() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let event_loop = EventLoop::bind(addr, 16).unwrap();
        assert_ne!(event_loop.local_addr().port(), 0);
    }

    #[test]
    fn test_bind_conflict_is_fatal() {
        let holder = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = holder.local_addr().unwrap();

        match EventLoop::bind(addr, 16) {
            Err(ServerError::Bind { addr: failed, .. }) => assert_eq!(failed, addr),
            other => panic!("expected bind error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_stop_terminates_run() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let mut event_loop = EventLoop::bind(addr, 16).unwrap();
        let stop = event_loop.stop_handle();

        let joiner = std::thread::spawn(move || event_loop.run(&mut NoopHandler));
        std::thread::sleep(std::time::Duration::from_millis(50));

        stop.stop();
        // Second call is a no-op.
        stop.stop();

        joiner.join().unwrap().unwrap();
    }
}
