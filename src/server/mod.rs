// === IMPORTS ===

// Standard library type for holding an IP address and port together.
use std::net::SocketAddr;

// Arc lets the registry, lifecycle and coordinator be shared by every task.
use std::sync::Arc;

// Tokio's non-blocking TCP listener for incoming connections.
use tokio::net::TcpListener;

// Operator commands arrive line by line on stdin.
use tokio::io::{AsyncBufRead, BufReader};

// Worker tasks are tracked as a set so teardown can join them all.
use tokio::task::{JoinHandle, JoinSet};


// === MODULES ===

pub mod connection;  // one live client link and its termination sequence
pub mod lifecycle;   // Starting → Running → ShuttingDown → Stopped
pub mod operator;    // `exit` on the operator's console
pub mod registry;    // who is connected, and broadcast across them
pub mod session;     // the per-connection worker
pub mod shutdown;    // the coordinator that tears everything down


use crate::config::ServerConfig;
use crate::error::ChatError;
use crate::logger::Logger;

use connection::Connection;
use lifecycle::Lifecycle;
use registry::Registry;
use session::{Session, SessionEnd};
use shutdown::{ShutdownCoordinator, ShutdownReport, ShutdownTrigger, spawn_signal_listener};


// === SERVER ===

/// A bound listener plus the shared state its workers coordinate through.
///
/// `bind` either returns a server that owns its endpoint or fails with
/// `ChatError::Bind`; there is no retry.
pub struct ChatServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    coordinator: Arc<ShutdownCoordinator>,
    auxiliary: Vec<JoinHandle<()>>,
    config: ServerConfig,
    logger: Logger,
}

impl ChatServer {
    pub async fn bind(config: ServerConfig, logger: Logger) -> Result<Self, ChatError> {
        let addr = config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ChatError::Bind { addr: addr.clone(), source })?;
        let local_addr = listener.local_addr()?;

        let lifecycle = Arc::new(Lifecycle::new());
        let registry = Arc::new(Registry::new());
        let coordinator = Arc::new(ShutdownCoordinator::new(
            lifecycle,
            registry,
            config.shutdown_grace,
            logger,
        ));

        logger.info(&format!("🚀 Chat server listening on {}", local_addr));

        Ok(ChatServer {
            listener,
            local_addr,
            coordinator,
            auxiliary: Vec::new(),
            config,
            logger,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Handle used to trigger and observe shutdown from outside the accept loop.
    pub fn coordinator(&self) -> Arc<ShutdownCoordinator> {
        self.coordinator.clone()
    }

    /// Start the Operator Command Watcher on `input`. It is joined during teardown.
    pub fn watch_operator<R>(&mut self, input: R)
    where
        R: AsyncBufRead + Unpin + Send + 'static,
    {
        let handle = operator::spawn_operator_watcher(input, self.coordinator.clone(), self.logger);
        self.auxiliary.push(handle);
    }

    /// Turn Ctrl+C into a shutdown trigger.
    pub fn watch_signals(&mut self) {
        let handle = spawn_signal_listener(self.coordinator.clone(), self.logger);
        self.auxiliary.push(handle);
    }

    /// Accept connections until shutdown, then tear everything down in order:
    /// close every transport, close the listener, wait for the workers.
    pub async fn run(self) -> ShutdownReport {
        let ChatServer {
            listener,
            coordinator,
            auxiliary,
            config,
            logger,
            ..
        } = self;

        let lifecycle = coordinator.lifecycle().clone();
        let registry = coordinator.registry().clone();
        lifecycle.mark_running();

        let mut workers: JoinSet<SessionEnd> = JoinSet::new();

        loop {
            // Reap finished workers so the set only holds live ones
            while let Some(res) = workers.try_join_next() {
                if let Err(e) = res {
                    logger.error(&format!("Worker task failed: {}", e));
                }
            }

            tokio::select! {
                biased;

                _ = lifecycle.shutdown_requested() => {
                    logger.info("🧹 Server received shutdown signal.");
                    break;
                }

                accept_result = listener.accept() => match accept_result {
                    Ok((stream, peer)) => {
                        if let Err(e) = stream.set_nodelay(true) {
                            logger.debug(&format!("Could not set TCP_NODELAY for {}: {}", peer, e));
                        }
                        let (reader, writer) = stream.into_split();
                        let conn = Connection::new(peer, Box::new(writer));
                        logger.info(&format!("🔌 {} connected as {}.", peer, conn.id()));

                        let session = Session::new(
                            conn,
                            reader,
                            registry.clone(),
                            config.idle_timeout,
                            logger,
                        );
                        workers.spawn(session.run());
                    }
                    Err(e) => {
                        logger.error(&format!("⚠️ Failed to accept connection: {}", e));
                        coordinator.trigger(ShutdownTrigger::AcceptFailure);
                        break;
                    }
                },
            }
        }

        let mut report = ShutdownReport::default();

        // A blocked read only ends once its transport is closed, so close first, then wait
        coordinator.close_connections(&mut report).await;

        drop(listener);
        logger.info("Listener closed.");

        coordinator.await_workers(workers, auxiliary, &mut report).await;
        report
    }
}

/// Bind, watch stdin and Ctrl+C, and serve until shutdown.
pub async fn run_server(config: ServerConfig, logger: Logger) -> Result<ShutdownReport, ChatError> {
    let mut server = ChatServer::bind(config, logger).await?;
    server.watch_operator(BufReader::new(tokio::io::stdin()));
    server.watch_signals();
    logger.info("Type 'exit' to stop the server.");
    Ok(server.run().await)
}
