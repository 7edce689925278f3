use std::sync::{Arc, OnceLock};
use std::time::Duration;

// Set of worker tasks joined during teardown
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;

use serde::Serialize;

use crate::logger::Logger;
use crate::server::lifecycle::{Lifecycle, ServerState};
use crate::server::registry::Registry;
use crate::server::session::SessionEnd;

/// What started the shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ShutdownTrigger {
    /// The operator typed `exit`.
    Operator,
    /// The accept loop failed unexpectedly.
    AcceptFailure,
    /// The process received an interrupt.
    Signal,
}

/// Outcome of a teardown, logged as JSON and returned to the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ShutdownReport {
    pub trigger: Option<ShutdownTrigger>,
    pub connections_closed: usize,
    pub close_failures: usize,
    pub workers_joined: usize,
    pub worker_failures: usize,
    pub timed_out: bool,
}

impl ShutdownReport {
    /// True when every resource was released and nothing stalled.
    pub fn is_clean(&self) -> bool {
        self.close_failures == 0 && self.worker_failures == 0 && !self.timed_out
    }
}

/// Drives the orderly halt of the listener, the workers and the registry.
///
/// `trigger` only flips the lifecycle; the accept loop notices, stops
/// accepting, and then runs `close_connections` followed by `await_workers`.
pub struct ShutdownCoordinator {
    lifecycle: Arc<Lifecycle>,
    registry: Arc<Registry>,
    cause: OnceLock<ShutdownTrigger>,
    grace: Duration,
    logger: Logger,
}

impl ShutdownCoordinator {
    pub fn new(
        lifecycle: Arc<Lifecycle>,
        registry: Arc<Registry>,
        grace: Duration,
        logger: Logger,
    ) -> Self {
        ShutdownCoordinator {
            lifecycle,
            registry,
            cause: OnceLock::new(),
            grace,
            logger,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn lifecycle(&self) -> &Arc<Lifecycle> {
        &self.lifecycle
    }

    pub fn state(&self) -> ServerState {
        self.lifecycle.current()
    }

    /// The trigger that won, once shutdown has begun.
    pub fn cause(&self) -> Option<ShutdownTrigger> {
        self.cause.get().copied()
    }

    /// Request shutdown. Only the first call has any effect; it returns `true`.
    pub fn trigger(&self, trigger: ShutdownTrigger) -> bool {
        if !self.lifecycle.begin_shutdown() {
            self.logger.debug(&format!(
                "Shutdown already in progress; ignoring {:?} trigger",
                trigger
            ));
            return false;
        }
        let _ = self.cause.set(trigger);
        self.logger.warn(&format!("🛑 Shutdown requested ({:?})", trigger));
        true
    }

    /// Seal the registry and close every remaining transport, waking each
    /// worker out of its read. Close errors are logged and counted; the sweep
    /// always visits every entry.
    ///
    /// The whole sweep shares one grace period. A transport still held by a
    /// blocked write when it runs out is counted as a close failure.
    pub async fn close_connections(&self, report: &mut ShutdownReport) {
        let drained = self.registry.seal_and_drain().await;
        self.logger.info(&format!("Closing {} client connection(s)...", drained.len()));

        let deadline = Instant::now() + self.grace;
        for conn in drained {
            report.connections_closed += 1;
            if let Err(e) = conn.release_until(deadline).await {
                report.close_failures += 1;
                self.logger.error(&format!(
                    "Unable to close {} ({}): {}",
                    conn.id(),
                    conn.peer(),
                    e
                ));
            }
        }
    }

    /// Wait, bounded by the grace period, for every worker and auxiliary task
    /// to finish. Marks the server `Stopped` only on a clean result; anything
    /// still running after the grace period is aborted.
    pub async fn await_workers(
        &self,
        mut workers: JoinSet<SessionEnd>,
        auxiliary: Vec<JoinHandle<()>>,
        report: &mut ShutdownReport,
    ) {
        let logger = &self.logger;
        let mut joined = 0;
        let mut failed = 0;

        let drain = async {
            while let Some(res) = workers.join_next().await {
                match res {
                    Ok(_) => joined += 1,
                    Err(e) => {
                        failed += 1;
                        logger.error(&format!("Worker did not finish cleanly: {}", e));
                    }
                }
            }
            for handle in auxiliary {
                if let Err(e) = handle.await {
                    failed += 1;
                    logger.error(&format!("Background task did not finish cleanly: {}", e));
                }
            }
        };

        if tokio::time::timeout(self.grace, drain).await.is_err() {
            report.timed_out = true;
            logger.error(&format!(
                "Teardown did not complete within {:?}; {} worker(s) still running",
                self.grace,
                workers.len()
            ));
            workers.abort_all();
        }

        report.workers_joined += joined;
        report.worker_failures += failed;
        report.trigger = self.cause();

        if !self.registry.is_empty().await {
            // Only reachable if a registration slipped past the seal
            report.close_failures += 1;
            logger.error("Registry still holds connections after teardown");
        }

        match serde_json::to_string(&*report) {
            Ok(json) => logger.info(&format!("Shutdown report: {}", json)),
            Err(e) => logger.warn(&format!("Could not encode shutdown report: {}", e)),
        }

        if report.is_clean() {
            self.lifecycle.mark_stopped();
            logger.info("Clean shutdown complete.");
        } else {
            logger.error("Failed to shut down cleanly.");
        }
    }
}

/// Spawn a task that turns Ctrl+C into a shutdown trigger.
/// It also exits quietly once shutdown starts for any other reason.
pub fn spawn_signal_listener(
    coordinator: Arc<ShutdownCoordinator>,
    logger: Logger,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            res = tokio::signal::ctrl_c() => match res {
                Ok(()) => {
                    logger.warn("🛑 Ctrl+C received — shutting down.");
                    coordinator.trigger(ShutdownTrigger::Signal);
                }
                Err(e) => logger.error(&format!("Failed to listen for ctrl_c: {}", e)),
            },
            _ = coordinator.lifecycle().shutdown_requested() => {}
        }
    })
}
