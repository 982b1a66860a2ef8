//! Single-threaded reactor runtime.
//!
//! One mio poll instance multiplexes the listener and every accepted
//! connection. Shared abstractions:
//! - `Connection`: per-client socket, buffers, and lifecycle state
//! - `ConnectionRegistry`: slab arena of live connections
//! - `EventLoop`: the readiness loop that owns both

mod connection;
mod event_loop;
mod registry;

pub use connection::{ConnState, Connection, ReadOutcome};
pub use event_loop::{EventLoop, LineHandler, StopHandle};
pub use registry::ConnectionRegistry;

use std::io;
use std::net::SocketAddr;

/// Fatal server errors, surfaced to the startup caller.
///
/// Accept failures and per-connection transport errors are not listed
/// here: they are contained within the runtime, logged, and never stop
/// the loop.
#[derive(Debug)]
pub enum ServerError {
    /// The configured host/port did not parse as a socket address.
    InvalidAddr(String),
    /// The listening endpoint could not be created.
    Bind { addr: SocketAddr, source: io::Error },
    /// The poll instance failed.
    Poll(io::Error),
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerError::InvalidAddr(addr) => {
                write!(f, "invalid listen address '{addr}'")
            }
            ServerError::Bind { addr, source } => {
                write!(f, "failed to bind {addr}: {source}")
            }
            ServerError::Poll(e) => write!(f, "event loop failure: {e}"),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServerError::InvalidAddr(_) => None,
            ServerError::Bind { source, .. } => Some(source),
            ServerError::Poll(e) => Some(e),
        }
    }
}
