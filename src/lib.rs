// Parsing and validating command-line settings for all three programs.
pub mod config;

// Failure taxonomy shared by server, client and bot.
pub mod error;

// Logging setup over fern/log.
pub mod logger;

// Listener, connection registry, workers and shutdown coordination.
pub mod server;

// Interactive human client.
pub mod client;

// Automated client that answers `BOT.` commands.
pub mod bot;

use std::process::ExitCode;

use config::{BotConfig, ClientConfig, ServerConfig};
use error::ChatError;
use logger::{Logger, init_logger};

/// Build a multi-threaded Tokio runtime with the requested number of workers.
fn build_runtime(worker_threads: usize, thread_name: &str) -> Result<tokio::runtime::Runtime, ChatError> {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads)   // how many threads to use
        .thread_name(thread_name)         // helpful for debugging
        .enable_all()                     // turn on I/O, timers, signals
        .build()
        .map_err(ChatError::Runtime)
}

/// Entry point of the `chat-server` binary.
/// Responsibilities:
/// 1. Read the flags into a `ServerConfig`.
/// 2. Build a Tokio runtime and set up logging.
/// 3. Serve until shutdown.
/// 4. Turn the outcome into an exit code: success for a clean shutdown,
///    failure for a startup error. A teardown that could not release
///    everything ends the process immediately.
pub fn start_server<I, S>(args: I) -> ExitCode
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let config = ServerConfig::from_args(args);
    let logger = init_logger("chat_server", &config.logger);

    let rt = match build_runtime(config.worker_threads, "chat-server-worker") {
        Ok(rt) => rt,
        Err(e) => {
            logger.error(&e.to_string());
            return ExitCode::FAILURE;
        }
    };

    match rt.block_on(server::run_server(config, logger)) {
        Ok(report) if report.is_clean() => {
            // Stdin is read on a blocking thread that cannot be interrupted
            rt.shutdown_background();
            ExitCode::SUCCESS
        }
        Ok(_) => {
            logger.error("Forcing shutdown.");
            log::logger().flush();
            std::process::exit(1);
        }
        Err(e) => {
            logger.error(&format!("Cannot create server: {}", e));
            ExitCode::FAILURE
        }
    }
}

/// Entry point of the `chat-client` binary.
pub fn start_client<I, S>(args: I) -> ExitCode
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut config = ClientConfig::from_args(args);
    // Console logs would interleave with the chat itself; only warnings go to the terminal
    if config.logger.log_level == "info" {
        config.logger.log_level = "warn".to_string();
    }
    let logger = init_logger("chat_client", &config.logger);

    let rt = match build_runtime(2, "chat-client-worker") {
        Ok(rt) => rt,
        Err(e) => {
            logger.error(&e.to_string());
            return ExitCode::FAILURE;
        }
    };

    let result = rt.block_on(client::run_client(config.clone(), logger));
    rt.shutdown_background();
    match result {
        Ok(_) => {
            println!("Clean shutdown complete.");
            ExitCode::SUCCESS
        }
        Err(e @ ChatError::Connect { .. }) => {
            println!(
                "\nUnable to connect to server:\n[ADDRESS]: {}\n[PORT]: {}\nPlease check server details and try again.",
                config.address, config.port
            );
            logger.debug(&e.to_string());
            ExitCode::FAILURE
        }
        Err(e) => {
            logger.error(&format!("Client failed: {}", e));
            ExitCode::FAILURE
        }
    }
}

/// Entry point of the `chat-bot` binary.
pub fn start_bot<I, S>(args: I) -> ExitCode
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let config = BotConfig::from_args(args);
    let logger: Logger = init_logger("chat_bot", &config.logger);

    let rt = match build_runtime(2, "chat-bot-worker") {
        Ok(rt) => rt,
        Err(e) => {
            logger.error(&e.to_string());
            return ExitCode::FAILURE;
        }
    };

    match rt.block_on(bot::run_bot(config, logger)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            logger.error(&e.to_string());
            ExitCode::FAILURE
        }
    }
}
