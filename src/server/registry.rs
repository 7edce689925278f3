// Map from connection identity to its live entry
use std::collections::HashMap;
use std::sync::Arc;

// Async-aware lock: many broadcasts may snapshot at once, insert/remove take it exclusively
use tokio::sync::RwLock;

// Zero-copy payload shared by every recipient of a broadcast
use bytes::Bytes;

use crate::error::ChatError;
use crate::logger::Logger;
use crate::server::connection::{Connection, ConnectionId};

/// What a single broadcast achieved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Entries the line was written to successfully.
    pub delivered: usize,
    /// Entries whose write failed and which were evicted as dead.
    pub evicted: usize,
}

struct RegistryInner {
    entries: HashMap<ConnectionId, Arc<Connection>>,
    // Set once by teardown; refuses every later registration
    sealed: bool,
}

/// The single source of truth for "who is currently connected".
///
/// Every mutation takes the write lock, and broadcast copies the entry list
/// under the read lock and releases it before doing any I/O, so a removal
/// in the middle of a broadcast can never invalidate the iteration.
/// Removal moves the entry to `Terminating` under the same write lock, so a
/// broadcast holding an older snapshot can no longer write to it. Whoever
/// removes an entry owns its release; removal is the exactly-once gate.
pub struct Registry {
    inner: RwLock<RegistryInner>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Registry {
            inner: RwLock::new(RegistryInner {
                entries: HashMap::new(),
                sealed: false,
            }),
        }
    }

    /// Insert an entry. Fails if teardown has already sealed the registry or
    /// if the id is already present.
    pub async fn register(&self, conn: Arc<Connection>) -> Result<(), ChatError> {
        let mut inner = self.inner.write().await;
        if inner.sealed {
            return Err(ChatError::RegistryClosed(conn.id()));
        }
        if inner.entries.contains_key(&conn.id()) {
            return Err(ChatError::DuplicateConnection(conn.id()));
        }
        inner.entries.insert(conn.id(), conn);
        Ok(())
    }

    /// Remove an entry, begin its termination, and hand it to the caller, who
    /// must then `release` it. Returns `None` when the id is gone already or
    /// when its termination was started elsewhere.
    pub async fn deregister(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        let mut inner = self.inner.write().await;
        let conn = inner.entries.remove(&id)?;
        conn.begin_close().then_some(conn)
    }

    /// Copy of the current entries, taken atomically.
    pub async fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.inner.read().await.entries.values().cloned().collect()
    }

    pub async fn contains(&self, id: ConnectionId) -> bool {
        self.inner.read().await.entries.contains_key(&id)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn is_sealed(&self) -> bool {
        self.inner.read().await.sealed
    }

    /// Refuse all further registrations and take every current entry out in
    /// one step, beginning each one's termination. The caller releases the
    /// returned entries. Calling it again yields an empty list.
    pub async fn seal_and_drain(&self) -> Vec<Arc<Connection>> {
        let mut inner = self.inner.write().await;
        inner.sealed = true;
        inner
            .entries
            .drain()
            .map(|(_, conn)| conn)
            .filter(|conn| conn.begin_close())
            .collect()
    }

    /// Remove an entry judged dead and run its termination sequence.
    /// Returns `false` when somebody else already removed it.
    pub async fn evict(&self, id: ConnectionId, logger: &Logger) -> bool {
        let Some(conn) = self.deregister(id).await else {
            return false;
        };
        if let Err(e) = conn.release().await {
            logger.warn(&format!(
                "Error closing evicted connection {} ({}): {}",
                id,
                conn.peer(),
                e
            ));
        }
        true
    }

    /// Write `line` to every registered connection, the sender included.
    ///
    /// A failed write does not stop delivery to the others; the failing entry
    /// is evicted instead.
    pub async fn broadcast(&self, line: &str, logger: &Logger) -> BroadcastReport {
        let mut payload = String::with_capacity(line.len() + 1);
        payload.push_str(line);
        payload.push('\n');
        let payload = Bytes::from(payload);

        let mut report = BroadcastReport::default();
        for conn in self.snapshot().await {
            match conn.write_line(&payload).await {
                Ok(()) => report.delivered += 1,
                Err(ChatError::ConnectionClosed(_)) => {
                    // Closed between snapshot and write; its remover handles it
                }
                Err(e) => {
                    logger.warn(&format!(
                        "Failed to send to {} ({}): {}; dropping connection",
                        conn.id(),
                        conn.peer(),
                        e
                    ));
                    if self.evict(conn.id(), logger).await {
                        report.evicted += 1;
                    }
                }
            }
        }
        report
    }
}
