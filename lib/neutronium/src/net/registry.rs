//! Process-wide map from `ConnectionId` to the live `Connection` handle. Both the IO workers
//! (on accept/close) and the game thread (on broadcast) touch this, so it's a plain
//! mutex-protected table rather than anything thread-affine.

use crate::identity::ConnectionId;
use crate::net::connection::Connection;
use hashbrown::HashMap;
use std::sync::{Arc, Mutex};

pub struct ConnectionRegistry {
    conns: Mutex<HashMap<ConnectionId, Arc<Connection>>>,
}

impl ConnectionRegistry {
    pub fn new() -> ConnectionRegistry {
        ConnectionRegistry {
            conns: Mutex::new(HashMap::new()),
        }
    }

    pub fn insert(&self, conn: Arc<Connection>) {
        let mut conns = self.conns.lock().expect("registry poisoned");
        conns.insert(conn.id, conn);
    }

    pub fn remove(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        let mut conns = self.conns.lock().expect("registry poisoned");
        conns.remove(&id)
    }

    pub fn get(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        let conns = self.conns.lock().expect("registry poisoned");
        conns.get(&id).cloned()
    }

    pub fn count(&self) -> usize {
        self.conns.lock().expect("registry poisoned").len()
    }

    /// A point-in-time snapshot of every live handle. Taken under the lock and then released
    /// immediately so callers can iterate and enqueue/read without holding it across I/O.
    pub fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.conns
            .lock()
            .expect("registry poisoned")
            .values()
            .cloned()
            .collect()
    }

    /// Enqueues `frame` on every connection currently registered.
    pub fn broadcast_all(&self, frame: &[u8]) {
        for conn in self.snapshot() {
            conn.enqueue(frame.to_vec());
        }
    }

    /// Enqueues `frame` on every connection except `exclude`.
    pub fn broadcast_others(&self, exclude: ConnectionId, frame: &[u8]) {
        for conn in self.snapshot() {
            if conn.id != exclude {
                conn.enqueue(frame.to_vec());
            }
        }
    }

    /// Begins a single-shot disconnect and closes the socket for every registered connection.
    /// Used at shutdown; does not remove entries (the IO workers' own cleanup path does that
    /// once they observe the closed socket).
    pub fn close_all(&self) {
        for conn in self.snapshot() {
            if conn.begin_disconnect() {
                conn.close_socket();
            }
        }
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mio::net::TcpStream;
    use std::net::{TcpListener, TcpStream as StdTcpStream};
    use std::time::Duration;

    fn make_conn(id: u64) -> Arc<Connection> {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let _client = StdTcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        server.set_nonblocking(true).unwrap();
        Arc::new(Connection::new(
            ConnectionId::new(id),
            "127.0.0.1".to_string(),
            TcpStream::from_std(server),
            Duration::from_secs(5),
        ))
    }

    #[test]
    fn insert_get_remove_round_trip() {
        let reg = ConnectionRegistry::new();
        let conn = make_conn(1);
        reg.insert(conn.clone());
        assert_eq!(reg.count(), 1);
        assert!(reg.get(ConnectionId::new(1)).is_some());
        assert!(reg.remove(ConnectionId::new(1)).is_some());
        assert_eq!(reg.count(), 0);
    }

    #[test]
    fn broadcast_others_skips_excluded() {
        let reg = ConnectionRegistry::new();
        let a = make_conn(1);
        let b = make_conn(2);
        reg.insert(a.clone());
        reg.insert(b.clone());

        reg.broadcast_others(ConnectionId::new(1), &[0xAB]);
        assert!(!a.has_pending_writes());
        assert!(b.has_pending_writes());
    }
}
