//! echoplex: an event-driven TCP echo server.
//!
//! A single-threaded mio reactor multiplexes the listener and all client
//! connections. Reads accumulate in per-connection buffers until a
//! complete newline-delimited line is available; each line is handed to
//! the protocol handler, which echoes it back or closes the session on a
//! quit command.

pub mod config;
pub mod framer;
pub mod runtime;
pub mod server;
