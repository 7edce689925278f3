// Peer address of the client, kept for log lines
use std::net::SocketAddr;

// Lock-free state word and the id counter
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::Arc;

// Async write side of the transport
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;

// - Mutex: serialises writers so concurrent broadcasts never interleave bytes of two lines
// - Notify: wakes the owning worker out of its blocked read
use tokio::sync::{Mutex, Notify};

// Reference-counted payload shared by every recipient of one broadcast
use bytes::Bytes;

use crate::error::ChatError;

/// The write half of a client transport. Boxed so that TCP halves and
/// in-memory pipes can sit in the same registry.
pub type LineWriter = Box<dyn AsyncWrite + Send + Unpin>;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identity of one connection, unique for the life of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Hand out the next unused id.
    pub fn next() -> Self {
        ConnectionId(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle of a single connection. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum ConnectionState {
    Active = 0,
    Terminating = 1,
    Closed = 2,
}

impl ConnectionState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => ConnectionState::Active,
            1 => ConnectionState::Terminating,
            _ => ConnectionState::Closed,
        }
    }
}

/// One live client link: its identity, its state word, the write half of its
/// transport, and the wake-up used to pull its worker out of a blocked read.
///
/// The read half never lives here. It stays inside the worker, so the only
/// way another task can end a read is `begin_close()` (directly or through
/// `close()`), which flips the state and notifies the worker.
pub struct Connection {
    id: ConnectionId,
    peer: SocketAddr,
    state: AtomicU8,
    writer: Mutex<Option<LineWriter>>,
    terminate: Notify,
}

impl Connection {
    /// Build a fresh, `Active` connection around the given write half.
    pub fn new(peer: SocketAddr, writer: LineWriter) -> Arc<Self> {
        Arc::new(Connection {
            id: ConnectionId::next(),
            peer,
            state: AtomicU8::new(ConnectionState::Active as u8),
            writer: Mutex::new(Some(writer)),
            terminate: Notify::new(),
        })
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_active(&self) -> bool {
        self.state() == ConnectionState::Active
    }

    /// Write one line (the payload must already carry its trailing newline).
    ///
    /// The state is checked while the writer lock is held, so once `close()`
    /// has run no further bytes reach this transport.
    pub async fn write_line(&self, payload: &Bytes) -> Result<(), ChatError> {
        let mut guard = self.writer.lock().await;
        if !self.is_active() {
            return Err(ChatError::ConnectionClosed(self.id));
        }
        let writer = guard
            .as_mut()
            .ok_or(ChatError::ConnectionClosed(self.id))?;
        writer.write_all(payload).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Run the whole termination sequence: Active → Terminating, wake the
    /// worker, shut down and drop the write half, → Closed.
    ///
    /// Returns `Ok(false)` when some other caller already started the
    /// sequence; in that case nothing is released a second time. An error
    /// from the transport shutdown is returned, but the connection still
    /// ends up `Closed` and its writer is dropped.
    pub async fn close(&self) -> std::io::Result<bool> {
        if !self.begin_close() {
            return Ok(false);
        }
        self.release().await.map(|_| true)
    }

    /// Active → Terminating, then wake the worker out of its read.
    ///
    /// Only the caller that gets `true` may go on to `release`. From this
    /// point `write_line` refuses every new write.
    pub(crate) fn begin_close(&self) -> bool {
        let won = self
            .state
            .compare_exchange(
                ConnectionState::Active as u8,
                ConnectionState::Terminating as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if won {
            self.terminate.notify_one();
        }
        won
    }

    /// Shut down and drop the write half, then mark the connection `Closed`.
    ///
    /// Waits for a write already in flight to finish first.
    pub async fn release(&self) -> std::io::Result<()> {
        let taken = self.writer.lock().await.take();
        let result = match taken {
            Some(mut writer) => writer.shutdown().await,
            None => Ok(()),
        };
        self.mark_closed();
        result
    }

    /// Like `release`, but gives up at `deadline`.
    ///
    /// A write blocked on a peer that stopped reading holds the writer lock
    /// for as long as it stays blocked. Past the deadline the connection is
    /// marked `Closed` anyway and a `TimedOut` error is returned; the writer
    /// is dropped with the last reference to the connection.
    pub async fn release_until(&self, deadline: Instant) -> std::io::Result<()> {
        match tokio::time::timeout_at(deadline, self.release()).await {
            Ok(result) => result,
            Err(_) => {
                self.mark_closed();
                Err(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "a pending write still holds the transport",
                ))
            }
        }
    }

    fn mark_closed(&self) {
        self.state
            .store(ConnectionState::Closed as u8, Ordering::Release);
    }

    /// Resolves once termination of this connection has begun.
    pub async fn terminated(&self) {
        if !self.is_active() {
            return;
        }
        self.terminate.notified().await;
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("state", &self.state())
            .finish()
    }
}
