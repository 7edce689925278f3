use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncRead;

// Line framing on the read half of the transport, capped so one endless line cannot grow the buffer forever
use futures::StreamExt;
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};

use crate::logger::Logger;
use crate::server::connection::Connection;
use crate::server::registry::Registry;

/// Longest line a client may send, in bytes, not counting the newline.
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// How a worker's session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The client closed its side of the stream.
    Disconnected,
    /// Reading from the client failed, or it sent a line over [`MAX_LINE_LENGTH`].
    ReadFailed,
    /// No line arrived within the configured idle timeout.
    IdleTimeout,
    /// Another task closed the connection (shutdown or broadcast eviction).
    Terminated,
    /// Registration was refused because teardown had already begun.
    Rejected,
}

/// The worker for one accepted connection.
///
/// The registry and the connection entry are handed in explicitly; the
/// worker owns the read half and nothing else reads it.
pub struct Session<R> {
    conn: Arc<Connection>,
    reader: R,
    registry: Arc<Registry>,
    idle_timeout: Option<Duration>,
    logger: Logger,
}

enum Step {
    Line(String),
    End(SessionEnd),
}

impl<R> Session<R>
where
    R: AsyncRead + Unpin + Send,
{
    pub fn new(
        conn: Arc<Connection>,
        reader: R,
        registry: Arc<Registry>,
        idle_timeout: Option<Duration>,
        logger: Logger,
    ) -> Self {
        Session {
            conn,
            reader,
            registry,
            idle_timeout,
            logger,
        }
    }

    /// Register, relay every line to the registry until the read side ends,
    /// then run the termination sequence if nobody else has.
    pub async fn run(self) -> SessionEnd {
        let Session {
            conn,
            reader,
            registry,
            idle_timeout,
            logger,
        } = self;
        let id = conn.id();
        let peer = conn.peer();

        if let Err(e) = registry.register(conn.clone()).await {
            logger.info(&format!("Refusing {} ({}): {}", id, peer, e));
            if let Err(e) = conn.close().await {
                logger.warn(&format!("Error closing refused connection {}: {}", id, e));
            }
            return SessionEnd::Rejected;
        }
        logger.debug(&format!("{} ({}) registered", id, peer));

        let mut lines = FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));

        let end = loop {
            let step = tokio::select! {
                biased;

                _ = conn.terminated() => Step::End(SessionEnd::Terminated),

                read = next_line(&mut lines, idle_timeout, &logger) => read,
            };

            match step {
                Step::Line(line) => {
                    logger.debug(&format!("From {} ({}): {}", id, peer, line));
                    let report = registry.broadcast(&line, &logger).await;
                    if report.evicted > 0 {
                        logger.info(&format!(
                            "Broadcast from {} dropped {} dead connection(s)",
                            id, report.evicted
                        ));
                    }
                }
                Step::End(end) => break end,
            }
        };

        // Whoever removes the entry owns its release
        let end = match registry.deregister(id).await {
            Some(owned) => {
                if let Err(e) = owned.release().await {
                    logger.warn(&format!("Unable to close {} ({}) cleanly: {}", id, peer, e));
                }
                end
            }
            None => SessionEnd::Terminated,
        };

        match end {
            SessionEnd::Disconnected => logger.info(&format!("{} ({}) disconnected.", id, peer)),
            SessionEnd::ReadFailed => logger.warn(&format!("{} ({}) dropped after a read error.", id, peer)),
            SessionEnd::IdleTimeout => logger.info(&format!("{} ({}) timed out while idle.", id, peer)),
            SessionEnd::Terminated => logger.info(&format!("{} ({}) terminated.", id, peer)),
            SessionEnd::Rejected => {}
        }
        end
    }
}

async fn next_line<R>(
    lines: &mut FramedRead<R, LinesCodec>,
    idle_timeout: Option<Duration>,
    logger: &Logger,
) -> Step
where
    R: AsyncRead + Unpin,
{
    let read = match idle_timeout {
        Some(limit) => match tokio::time::timeout(limit, lines.next()).await {
            Ok(read) => read,
            Err(_) => return Step::End(SessionEnd::IdleTimeout),
        },
        None => lines.next().await,
    };

    match read {
        Some(Ok(line)) => Step::Line(line),
        None => Step::End(SessionEnd::Disconnected),
        Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
            logger.warn(&format!("Line longer than {} bytes; dropping client", MAX_LINE_LENGTH));
            Step::End(SessionEnd::ReadFailed)
        }
        Some(Err(LinesCodecError::Io(e))) => {
            logger.debug(&format!("Read failed: {}", e));
            Step::End(SessionEnd::ReadFailed)
        }
    }
}
