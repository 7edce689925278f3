// We need Duration to turn milliseconds/seconds into a Rust time value
use std::time::Duration;

// Generic "parse from text" bound for flag values
use std::str::FromStr;

/// Port used by the server, client and bot when none is given.
pub const DEFAULT_PORT: u16 = 14001;

/// Address the client and bot connect to when none is given.
pub const DEFAULT_ADDRESS: &str = "localhost";

//////////////////////
// Flag lookup      //
//////////////////////

/// Raw command-line words, searched flag by flag.
#[derive(Debug, Clone, Default)]
pub struct Flags {
    words: Vec<String>,
}

impl Flags {
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Flags {
            words: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Value following the first occurrence of `flag` (case-insensitive).
    /// `Some(None)` means the flag is present but has nothing after it.
    fn value(&self, flag: &str) -> Option<Option<&str>> {
        let pos = self.words.iter().position(|w| w.eq_ignore_ascii_case(flag))?;
        Some(self.words.get(pos + 1).map(String::as_str))
    }

    /// True if the switch appears anywhere.
    pub fn has(&self, flag: &str) -> bool {
        self.words.iter().any(|w| w.eq_ignore_ascii_case(flag))
    }

    // Look up `flag`, or fall back to `default`.
    // If the value is missing or does not parse, we warn but still use `default`.
    fn extract_or<T: FromStr>(&self, flag: &str, default: T) -> T {
        match self.value(flag) {
            Some(Some(raw)) => match raw.parse::<T>() {
                Ok(val) => val,
                Err(_) => {
                    eprintln!("Usage: '{}' is not a valid value for {}; using the default.", raw, flag);
                    default
                }
            },
            Some(None) => {
                eprintln!("Usage: {} expects a value; using the default.", flag);
                default
            }
            None => default,
        }
    }
}

//////////////////////
// LoggerConfig     //
//////////////////////

/// Settings for the fern dispatcher.
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    /// `trace`, `debug`, `info`, `warn`, `error` or `off`
    pub log_level: String,
    pub enable_console_log: bool,
    pub enable_file_log: bool,
    /// Emit one JSON object per line in the log file instead of plain text
    pub enable_json_log: bool,
    /// Directory for `<name>.log`; empty means the working directory
    pub log_file_path: String,
    /// chrono format string for timestamps
    pub date_format: String,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        LoggerConfig {
            log_level: "info".to_string(),
            enable_console_log: true,
            enable_file_log: false,
            enable_json_log: false,
            log_file_path: String::new(),
            date_format: "%Y-%m-%d %H:%M:%S".to_string(),
        }
    }
}

impl LoggerConfig {
    /// `--log-level`, `--log-dir` (turns file logging on), `--log-json`, `--quiet`.
    pub fn from_flags(flags: &Flags) -> Self {
        let defaults = LoggerConfig::default();
        let log_dir: Option<String> = match flags.value("--log-dir") {
            Some(Some(dir)) => Some(dir.to_string()),
            Some(None) => {
                eprintln!("Usage: --log-dir expects a value; file logging stays off.");
                None
            }
            None => None,
        };

        LoggerConfig {
            log_level: flags.extract_or("--log-level", defaults.log_level),
            enable_console_log: !flags.has("--quiet"),
            enable_file_log: log_dir.is_some(),
            enable_json_log: flags.has("--log-json"),
            log_file_path: log_dir.unwrap_or_default(),
            date_format: defaults.date_format,
        }
    }
}

//////////////////////
// ServerConfig     //
//////////////////////

/// Everything the server needs.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Interface to bind (e.g. `"0.0.0.0"`)
    pub host: String,

    /// Port number (`-csp`)
    pub port: u16,

    /// Upper bound on waiting for workers during teardown
    pub shutdown_grace: Duration,

    /// Drop a client that sends nothing for this long; `None` never drops
    pub idle_timeout: Option<Duration>,

    /// How many Tokio worker threads to spin up (defaults to cpu-1)
    pub worker_threads: usize,

    pub logger: LoggerConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            shutdown_grace: Duration::from_millis(5000),
            idle_timeout: None,
            worker_threads: default_worker_threads(),
            logger: LoggerConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_args<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let flags = Flags::new(args);
        let d = ServerConfig::default();

        let idle_timeout = match flags.extract_or::<u64>("--idle-timeout-secs", 0) {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        ServerConfig {
            host: flags.extract_or("--host", d.host),
            port: flags.extract_or("-csp", d.port),
            shutdown_grace: Duration::from_millis(
                flags.extract_or("--grace-ms", d.shutdown_grace.as_millis() as u64),
            ),
            idle_timeout,
            worker_threads: flags.extract_or::<usize>("--workers", d.worker_threads).max(1),
            logger: LoggerConfig::from_flags(&flags),
        }
    }

    /// `host:port` for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

///////////////////////////////
// Client and bot settings   //
///////////////////////////////

/// Where a client connects.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub address: String,
    pub port: u16,
    pub logger: LoggerConfig,
}

impl ClientConfig {
    /// `-cca <address>` and `-ccp <port>`.
    pub fn from_args<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let flags = Flags::new(args);
        ClientConfig {
            address: flags.extract_or("-cca", DEFAULT_ADDRESS.to_string()),
            port: flags.extract_or("-ccp", DEFAULT_PORT),
            logger: LoggerConfig::from_flags(&flags),
        }
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

/// Where the bot connects.
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub address: String,
    pub port: u16,
    pub logger: LoggerConfig,
}

impl BotConfig {
    /// `-cba <address>` and `-cbp <port>`.
    pub fn from_args<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let flags = Flags::new(args);
        BotConfig {
            address: flags.extract_or("-cba", DEFAULT_ADDRESS.to_string()),
            port: flags.extract_or("-cbp", DEFAULT_PORT),
            logger: LoggerConfig::from_flags(&flags),
        }
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

// Default worker threads = #cores minus one (num_cpus), but at least one
fn default_worker_threads() -> usize {
    num_cpus::get().saturating_sub(1).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_defaults() {
        let cfg = ServerConfig::from_args(Vec::<String>::new());
        assert_eq!(cfg.port, 14001);
        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.idle_timeout, None);
        assert!(cfg.worker_threads >= 1);
        assert!(cfg.logger.enable_console_log);
        assert!(!cfg.logger.enable_file_log);
    }

    #[test]
    fn server_port_flag_is_case_insensitive() {
        let cfg = ServerConfig::from_args(["-CSP", "15000"]);
        assert_eq!(cfg.port, 15000);
        assert_eq!(cfg.bind_addr(), "0.0.0.0:15000");
    }

    #[test]
    fn invalid_port_keeps_default() {
        assert_eq!(ServerConfig::from_args(["-csp", "abc"]).port, DEFAULT_PORT);
        assert_eq!(ServerConfig::from_args(["-csp"]).port, DEFAULT_PORT);
        assert_eq!(ClientConfig::from_args(["-ccp", "70000"]).port, DEFAULT_PORT);
    }

    #[test]
    fn first_occurrence_wins() {
        let cfg = ServerConfig::from_args(["-csp", "15001", "-csp", "15002"]);
        assert_eq!(cfg.port, 15001);
    }

    #[test]
    fn client_and_bot_flags() {
        let client = ClientConfig::from_args(["-cca", "10.0.0.5", "-ccp", "2000"]);
        assert_eq!(client.server_addr(), "10.0.0.5:2000");

        let bot = BotConfig::from_args(["-cbp", "2001"]);
        assert_eq!(bot.address, "localhost");
        assert_eq!(bot.server_addr(), "localhost:2001");
    }

    #[test]
    fn hardening_and_logging_flags() {
        let cfg = ServerConfig::from_args([
            "--idle-timeout-secs", "90", "--grace-ms", "250", "--log-dir", "/tmp/chat", "--log-json", "--quiet",
        ]);
        assert_eq!(cfg.idle_timeout, Some(Duration::from_secs(90)));
        assert_eq!(cfg.shutdown_grace, Duration::from_millis(250));
        assert!(cfg.logger.enable_file_log);
        assert!(cfg.logger.enable_json_log);
        assert!(!cfg.logger.enable_console_log);
        assert_eq!(cfg.logger.log_file_path, "/tmp/chat");
    }
}
