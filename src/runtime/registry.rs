//! Registry of live connections, backed by slab allocation.
//!
//! Slab keys double as `mio::Token` values, so readiness events map back
//! to their connection in O(1). A connection is present iff it has not
//! reached `Closed`; the reactor removes it in the same dispatch pass
//! that completes the close.

use crate::runtime::connection::Connection;
use slab::Slab;

pub struct ConnectionRegistry {
    connections: Slab<Connection>,
    max_connections: usize,
}

impl ConnectionRegistry {
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: Slab::with_capacity(max_connections),
            max_connections,
        }
    }

    /// Insert a new connection, returning its token id.
    ///
    /// Returns `None` if the registry is at capacity.
    pub fn insert(&mut self, conn: Connection) -> Option<usize> {
        if self.connections.len() >= self.max_connections {
            return None;
        }
        Some(self.connections.insert(conn))
    }

    pub fn get_mut(&mut self, id: usize) -> Option<&mut Connection> {
        self.connections.get_mut(id)
    }

    /// Remove a connection. Idempotent: removing an absent id is a no-op.
    pub fn remove(&mut self, id: usize) -> Option<Connection> {
        if self.connections.contains(id) {
            Some(self.connections.remove(id))
        } else {
            None
        }
    }

    pub fn contains(&self, id: usize) -> bool {
        self.connections.contains(id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Close every live connection and drain the registry.
    ///
    /// Used only at server stop. The closed connections are handed back
    /// so the reactor can deregister their streams before dropping them.
    pub fn shutdown_all(&mut self) -> Vec<Connection> {
        let mut drained = Vec::with_capacity(self.connections.len());
        for (_, mut conn) in std::mem::take(&mut self.connections) {
            conn.abort();
            drained.push(conn);
        }
        drained
    }
}
