// Import local time formatting tools from chrono
use chrono::Local;

// Set the global log level (e.g., Debug, Info, Warn, Error)
use log::LevelFilter;

// Set up the dispatch builder and per-level colours
use fern::Dispatch;
use fern::colors::{Color, ColoredLevelConfig};

// JSON envelope for structured file output
use serde_json::json;

// Standard I/O and filesystem operations (stdout, file creation)
use std::{fs, io};

// Used to initialize a static value only once in a thread-safe way
use std::sync::OnceLock;

use crate::config::LoggerConfig;

/// A zero-sized handle over the `log` macros.
/// Clonable so every task can carry its own copy.
#[derive(Clone, Copy, Debug, Default)]
pub struct Logger;

impl Logger {
    pub fn debug(&self, msg: &str) {
        log::debug!("{}", msg);
    }

    pub fn info(&self, msg: &str) {
        log::info!("{}", msg);
    }

    pub fn warn(&self, msg: &str) {
        log::warn!("{}", msg);
    }

    pub fn error(&self, msg: &str) {
        log::error!("{}", msg);
    }
}

/// Static global LOGGER instance, initialized once
static LOGGER: OnceLock<Logger> = OnceLock::new();

/// Path of the log file for `name` under `dir` (dots in the name become underscores).
pub fn log_file_path(dir: &str, name: &str) -> String {
    let file = format!("{}.log", name.replace('.', "_"));
    if dir.is_empty() {
        file
    } else {
        format!("{}/{}", dir.trim_end_matches('/'), file)
    }
}

/// Install the global fern dispatcher exactly once, according to `cfg`.
/// Later calls return the same handle and leave the first configuration in place.
pub fn init_logger(name: &str, cfg: &LoggerConfig) -> Logger {
    *LOGGER.get_or_init(|| {
        // If parsing fails, we default to Info
        let level = cfg
            .log_level
            .parse::<LevelFilter>()
            .unwrap_or(LevelFilter::Info);

        let mut base = Dispatch::new().level(level);

        // ────────────────────────────────────────────────────────────────
        // Console branch: timestamp, name, coloured level, message → stdout
        // ────────────────────────────────────────────────────────────────
        if cfg.enable_console_log {
            let nm = name.to_string();
            let datefmt = cfg.date_format.clone();
            let colors = ColoredLevelConfig::new()
                .info(Color::Green)
                .warn(Color::Yellow)
                .error(Color::Red)
                .debug(Color::Blue);

            base = base.chain(
                Dispatch::new()
                    .format(move |out, message, record| {
                        out.finish(format_args!(
                            "\x1b[92m{}\x1b[0m - \x1b[94m{}\x1b[0m - {} - {}",
                            Local::now().format(&datefmt),
                            nm,
                            colors.color(record.level()),
                            message
                        ))
                    })
                    .chain(io::stdout()),
            );
        }

        // ────────────────────────────────────────────────────────────────
        // File branch: plain text or one JSON object per line
        // ────────────────────────────────────────────────────────────────
        if cfg.enable_file_log {
            if !cfg.log_file_path.is_empty() {
                let _ = fs::create_dir_all(&cfg.log_file_path);
            }

            let nm = name.to_string();
            let datefmt = cfg.date_format.clone();
            let enable_json = cfg.enable_json_log;
            let filepath = log_file_path(&cfg.log_file_path, name);

            let log_format_file = move |out: fern::FormatCallback, message: &std::fmt::Arguments, record: &log::Record| {
                if enable_json {
                    let envelope = json!({
                        "timestamp": Local::now().format(&datefmt).to_string(),
                        "name":      nm,
                        "level":     record.level().to_string(),
                        "message":   message.to_string(),
                    });
                    out.finish(format_args!("{}", envelope))
                } else {
                    out.finish(format_args!(
                        "{} - {} - {} - {}",
                        Local::now().format(&datefmt),
                        nm,
                        record.level(),
                        message
                    ))
                }
            };

            // Attempt to open the logfile, but don't panic—fallback to sink on error
            let file_output: Box<dyn io::Write + Send> = match fern::log_file(&filepath) {
                Ok(fh) => Box::new(fh),
                Err(err) => {
                    eprintln!("Warning: could not open log file {}: {}", filepath, err);
                    Box::new(io::sink())
                }
            };

            base = base.chain(Dispatch::new().format(log_format_file).chain(file_output));
        }

        if let Err(e) = base.apply() {
            eprintln!("Warning: a global logger is already installed: {}", e);
        }

        Logger
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_file_names() {
        assert_eq!(log_file_path("", "chat.server"), "chat_server.log");
        assert_eq!(log_file_path("logs/", "chat-bot"), "logs/chat-bot.log");
    }
}
