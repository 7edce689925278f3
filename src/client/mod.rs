// Line-oriented I/O on the socket and on the user's console
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use crate::config::ClientConfig;
use crate::error::ChatError;
use crate::logger::Logger;

/// Username used when none can be read.
pub const DEFAULT_USERNAME: &str = "User";

/// How a client session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientExit {
    /// The server closed the connection.
    ServerClosed,
    /// The user's input ended.
    InputClosed,
}

/// Wrap a typed line with the sender's identity.
pub fn format_message(username: &str, text: &str) -> String {
    format!("[{}]: {}", username, text)
}

/// Read the username from the first input line, falling back to
/// [`DEFAULT_USERNAME`] when the input is empty, closed, or unreadable.
pub async fn read_username<I>(input: &mut tokio::io::Lines<I>) -> String
where
    I: AsyncBufRead + Unpin,
{
    match input.next_line().await {
        Ok(Some(name)) if !name.trim().is_empty() => name.trim().to_string(),
        Ok(_) => DEFAULT_USERNAME.to_string(),
        Err(_) => {
            println!("Unable to read username. Defaulting to '{}'", DEFAULT_USERNAME);
            DEFAULT_USERNAME.to_string()
        }
    }
}

/// Connect to the configured server and chat over stdin/stdout.
pub async fn run_client(config: ClientConfig, logger: Logger) -> Result<ClientExit, ChatError> {
    let addr = config.server_addr();
    let stream = TcpStream::connect(&addr)
        .await
        .map_err(|source| ChatError::Connect { addr: addr.clone(), source })?;
    println!("\nConnected to server:\n>Address: {}\n>Port: {}", config.address, config.port);

    let exit = chat(
        stream,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
        logger,
    )
    .await?;
    Ok(exit)
}

/// Drive one chat session: ask for a username, then relay input lines to the
/// server and server lines to `output` until either side ends.
pub async fn chat<I, O>(
    stream: TcpStream,
    input: I,
    mut output: O,
    logger: Logger,
) -> Result<ClientExit, ChatError>
where
    I: AsyncBufRead + Unpin,
    O: AsyncWrite + Unpin,
{
    let (reader, mut writer) = stream.into_split();
    let mut from_server = BufReader::new(reader).lines();
    let mut input = input.lines();

    output.write_all(b"Enter username: \n").await?;
    output.flush().await?;
    let username = read_username(&mut input).await;
    output
        .write_all(format!("\nWelcome {}!\nFeel free to send messages :)\n", username).as_bytes())
        .await?;
    output.flush().await?;

    let exit = loop {
        tokio::select! {
            incoming = from_server.next_line() => match incoming {
                Ok(Some(line)) => {
                    output.write_all(line.as_bytes()).await?;
                    output.write_all(b"\n").await?;
                    output.flush().await?;
                }
                Ok(None) | Err(_) => {
                    output.write_all(b"\nServer socket closed.\n").await?;
                    break ClientExit::ServerClosed;
                }
            },

            typed = input.next_line() => match typed {
                Ok(Some(text)) => {
                    let msg = format_message(&username, &text);
                    if let Err(e) = writer.write_all(format!("{}\n", msg).as_bytes()).await {
                        logger.warn(&format!("Failed to send message: {}", e));
                        break ClientExit::ServerClosed;
                    }
                }
                Ok(None) | Err(_) => {
                    output.write_all(b"User input stream closed.\n").await?;
                    break ClientExit::InputClosed;
                }
            },
        }
    };

    output.write_all(b"\nClosing connections...\n").await?;
    output.flush().await?;
    let _ = writer.shutdown().await;
    logger.debug("Client connection closed.");
    Ok(exit)
}
