//! Server composition and the echo protocol.
//!
//! The protocol is line-oriented text: every line is echoed back with an
//! `[ECHO] ` prefix; a case-insensitive `quit` or `q` gets a farewell
//! and a server-side close.

use crate::config::Config;
use crate::runtime::{Connection, EventLoop, LineHandler, ServerError, StopHandle};
use std::net::SocketAddr;
use tracing::{debug, info};

const ECHO_PREFIX: &str = "[ECHO] ";
const FAREWELL: &str = "Good bye!\n";

fn is_quit(line: &str) -> bool {
    line.eq_ignore_ascii_case("quit") || line.eq_ignore_ascii_case("q")
}

/// Echo protocol handler, one per server.
pub struct EchoHandler;

impl LineHandler for EchoHandler {
    fn on_line(&mut self, conn: &mut Connection, line: &str) {
        debug!(peer = %conn.peer(), line, "received line");

        if is_quit(line) {
            conn.write(FAREWELL.as_bytes());
            conn.close();
            return;
        }

        let mut reply = String::with_capacity(ECHO_PREFIX.len() + line.len() + 1);
        reply.push_str(ECHO_PREFIX);
        reply.push_str(line);
        reply.push('\n');
        conn.write(reply.as_bytes());
    }
}

/// Server instance: the bound reactor plus the echo protocol.
pub struct Server {
    event_loop: EventLoop,
}

impl Server {
    /// Bind the listening endpoint. Bind failure is fatal and reported
    /// to the caller.
    pub fn new(config: &Config) -> Result<Self, ServerError> {
        let listen = format!("{}:{}", config.host, config.port);
        let addr: SocketAddr = listen
            .parse()
            .map_err(|_| ServerError::InvalidAddr(listen))?;

        let event_loop = EventLoop::bind(addr, config.max_connections)?;
        info!(addr = %event_loop.local_addr(), "server listening");

        Ok(Self { event_loop })
    }

    /// The bound address (resolves a configured port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.event_loop.local_addr()
    }

    /// Handle for requesting a clean shutdown.
    pub fn stop_handle(&self) -> StopHandle {
        self.event_loop.stop_handle()
    }

    /// Serve until [`StopHandle::stop`] is called. On stop, every live
    /// connection is closed before the listener is released.
    pub fn run(&mut self) -> Result<(), ServerError> {
        self.event_loop.run(&mut EchoHandler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::ConnState;
    use mio::net::TcpStream;
    use std::io::Read;

    fn socket_pair() -> (Connection, std::net::TcpStream) {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let client = std::net::TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (accepted, peer) = listener.accept().unwrap();
        accepted.set_nonblocking(true).unwrap();
        (Connection::new(TcpStream::from_std(accepted), peer), client)
    }

    #[test]
    fn test_quit_tokens_are_case_insensitive() {
        for token in ["quit", "Quit", "QUIT", "q", "Q"] {
            assert!(is_quit(token), "{token} should quit");
        }
        for token in ["quits", "qq", "exit", ""] {
            assert!(!is_quit(token), "{token} should not quit");
        }
    }

    #[test]
    fn test_echo_reply_format() {
        let (mut conn, mut client) = socket_pair();

        EchoHandler.on_line(&mut conn, "hello");
        conn.flush().unwrap();

        let mut out = [0u8; 32];
        let n = client.read(&mut out).unwrap();
        assert_eq!(&out[..n], b"[ECHO] hello\n");
        assert_eq!(conn.state(), ConnState::Open);
    }

    #[test]
    fn test_quit_writes_farewell_and_closes() {
        let (mut conn, mut client) = socket_pair();

        EchoHandler.on_line(&mut conn, "Quit");
        assert_eq!(conn.state(), ConnState::Closing);

        conn.flush().unwrap();
        conn.close();
        assert_eq!(conn.state(), ConnState::Closed);

        let mut out = [0u8; 32];
        let n = client.read(&mut out).unwrap();
        assert_eq!(&out[..n], b"Good bye!\n");
    }
}
