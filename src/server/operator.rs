use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::task::JoinHandle;

use crate::logger::Logger;
use crate::server::shutdown::{ShutdownCoordinator, ShutdownTrigger};

/// The one operator command.
pub const EXIT_COMMAND: &str = "exit";

/// True if the operator line is the exit command (case-insensitive, surrounding
/// whitespace ignored).
pub fn is_exit_command(line: &str) -> bool {
    line.trim().eq_ignore_ascii_case(EXIT_COMMAND)
}

/// Read operator commands from `input` until `exit`, then trigger shutdown.
///
/// The watcher also stops when shutdown begins for another reason, and when
/// the operator stream ends (without triggering anything).
pub fn spawn_operator_watcher<R>(
    input: R,
    coordinator: Arc<ShutdownCoordinator>,
    logger: Logger,
) -> JoinHandle<()>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = input.lines();
        loop {
            let next = tokio::select! {
                _ = coordinator.lifecycle().shutdown_requested() => return,
                next = lines.next_line() => next,
            };

            match next {
                Ok(Some(line)) if is_exit_command(&line) => {
                    logger.info("Operator requested exit.");
                    coordinator.trigger(ShutdownTrigger::Operator);
                    return;
                }
                Ok(Some(line)) => {
                    if !line.trim().is_empty() {
                        logger.info(&format!(
                            "Unknown operator command '{}'; type '{}' to stop the server",
                            line.trim(),
                            EXIT_COMMAND
                        ));
                    }
                }
                Ok(None) => {
                    logger.warn("Operator input closed; 'exit' command unavailable.");
                    return;
                }
                Err(e) => {
                    logger.warn(&format!("Error reading operator input: {}", e));
                    return;
                }
            }
        }
    })
}
