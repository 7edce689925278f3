// Watch channel: one current value, any number of observers that can await a change
use tokio::sync::watch;

/// Process-wide server lifecycle. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ServerState {
    Starting,
    Running,
    ShuttingDown,
    Stopped,
}

impl ServerState {
    /// True once shutdown has begun (ShuttingDown or Stopped).
    pub fn is_shutting_down(self) -> bool {
        self >= ServerState::ShuttingDown
    }
}

/// Single atomically-observed lifecycle value with guarded transitions.
///
/// Every transition goes through `send_if_modified`, which runs the check and
/// the write under the channel's lock, so two racing callers can never both
/// win the same transition.
#[derive(Debug)]
pub struct Lifecycle {
    tx: watch::Sender<ServerState>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ServerState::Starting);
        Lifecycle { tx }
    }

    pub fn current(&self) -> ServerState {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ServerState> {
        self.tx.subscribe()
    }

    /// Starting → Running.
    pub fn mark_running(&self) -> bool {
        self.advance(ServerState::Starting, ServerState::Running)
    }

    /// Starting/Running → ShuttingDown. Only the first caller gets `true`.
    pub fn begin_shutdown(&self) -> bool {
        self.tx.send_if_modified(|state| {
            if state.is_shutting_down() {
                false
            } else {
                *state = ServerState::ShuttingDown;
                true
            }
        })
    }

    /// ShuttingDown → Stopped.
    pub fn mark_stopped(&self) -> bool {
        self.advance(ServerState::ShuttingDown, ServerState::Stopped)
    }

    fn advance(&self, from: ServerState, to: ServerState) -> bool {
        self.tx.send_if_modified(|state| {
            if *state == from {
                *state = to;
                true
            } else {
                false
            }
        })
    }

    /// Resolve once shutdown has begun.
    pub async fn shutdown_requested(&self) {
        let mut rx = self.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait
        let _ = rx.wait_for(|s| s.is_shutting_down()).await;
    }

    /// Resolve once the server reached `Stopped`.
    pub async fn stopped(&self) {
        let mut rx = self.subscribe();
        let _ = rx.wait_for(|s| *s == ServerState::Stopped).await;
    }
}
