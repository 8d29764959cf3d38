//! Connection: an opaque handle to a peer adjacency with a globally
//! unique id, plus the table that allocates and tracks them.
//! See spec.md §3 ("Connection").

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

/// A globally unique connection id. `LOCALHOST` is a sentinel that
/// never appears in the FIB (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(pub u32);

impl ConnectionId {
    pub const LOCALHOST: ConnectionId = ConnectionId(u32::MAX);

    pub fn is_localhost(self) -> bool {
        self == Self::LOCALHOST
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_localhost() {
            write!(f, "localhost")
        } else {
            write!(f, "conn{}", self.0)
        }
    }
}

/// An opaque adjacency handle. Identity, equality, and ordering follow
/// the id only — two `Connection`s with the same id are the same
/// connection regardless of open/closed state.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    open: AtomicBool,
}

impl Connection {
    pub fn new(id: ConnectionId) -> Self {
        Self {
            id,
            open: AtomicBool::new(true),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Relaxed)
    }

    pub fn close(&self) {
        self.open.store(false, Ordering::Relaxed);
    }
}

impl PartialEq for Connection {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl Eq for Connection {}

impl PartialOrd for Connection {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Connection {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.id.cmp(&other.id)
    }
}

/// The `ConnectionList` of spec.md §2: a table of live connections,
/// shared between the transport layer and any table that references a
/// connection as a next hop or reverse hop.
#[derive(Debug, Default)]
pub struct ConnectionTable {
    next_id: AtomicU32,
    connections: std::sync::Mutex<HashMap<ConnectionId, Arc<Connection>>>,
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a new connection with a fresh, globally unique id and
    /// registers it.
    pub fn allocate(&self) -> Arc<Connection> {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let conn = Arc::new(Connection::new(id));
        self.connections.lock().unwrap().insert(id, conn.clone());
        conn
    }

    pub fn get(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.connections.lock().unwrap().get(&id).cloned()
    }

    pub fn remove(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        let removed = self.connections.lock().unwrap().remove(&id);
        if let Some(conn) = &removed {
            conn.close();
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.connections.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_yields_unique_ids() {
        let table = ConnectionTable::new();
        let a = table.allocate();
        let b = table.allocate();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn localhost_sentinel_is_distinct() {
        assert!(ConnectionId::LOCALHOST.is_localhost());
        assert!(!ConnectionId(0).is_localhost());
    }

    #[test]
    fn remove_closes_connection() {
        let table = ConnectionTable::new();
        let conn = table.allocate();
        let id = conn.id();
        table.remove(id);
        assert!(!conn.is_open());
        assert!(table.get(id).is_none());
    }
}
