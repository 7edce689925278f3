use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::Mutex;

use crate::config::BotConfig;
use crate::error::ChatError;
use crate::logger::Logger;

pub mod responder;

/// Shared write half; each reply task takes the lock for one line.
type BotWriter = Arc<Mutex<OwnedWriteHalf>>;

/// Connect as an ordinary client and answer marked lines until the server
/// goes away.
pub async fn run_bot(config: BotConfig, logger: Logger) -> Result<(), ChatError> {
    let addr = config.server_addr();
    let stream = TcpStream::connect(&addr)
        .await
        .map_err(|source| ChatError::Connect { addr: addr.clone(), source })?;
    logger.info(&format!("Connected to server at {}", addr));

    serve(stream, logger).await;
    Ok(())
}

/// Read loop over an established connection. Replies are computed and sent
/// on their own tasks so the read loop never waits on them.
pub async fn serve(stream: TcpStream, logger: Logger) {
    let (reader, writer) = stream.into_split();
    let writer: BotWriter = Arc::new(Mutex::new(writer));
    let mut lines = BufReader::new(reader).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if responder::is_command(&line) {
                    spawn_reply(line, writer.clone(), logger);
                }
            }
            Ok(None) => {
                logger.info("Server socket closed (server shutdown).");
                break;
            }
            Err(e) => {
                logger.warn(&format!("Error reading from server: {}", e));
                break;
            }
        }
    }

    logger.info("Shutting down bot...");
    if let Err(e) = writer.lock().await.shutdown().await {
        logger.debug(&format!("Socket already closed: {}", e));
    }
    logger.info("Clean shutdown complete.");
}

fn spawn_reply(line: String, writer: BotWriter, logger: Logger) {
    tokio::spawn(async move {
        logger.info(&format!("Responding to: {}", line));
        // ThreadRng is not Send; keep it out of scope of any await
        let reply = {
            let mut rng = rand::rng();
            responder::respond(&line, &mut rng)
        };
        let Some(reply) = reply else {
            return;
        };

        let mut w = writer.lock().await;
        let sent = async {
            w.write_all(reply.as_bytes()).await?;
            w.write_all(b"\n").await?;
            w.flush().await
        };
        if let Err(e) = sent.await {
            logger.warn(&format!("Failed to send reply: {}", e));
        }
    });
}
