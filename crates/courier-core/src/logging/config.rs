//! Logging configuration.
//!
//! Level: `-v`/`-q` beat `COURIER_LOG`, which beats the default (`info`).
//! When neither is given, a `RUST_LOG` directive is used verbatim instead.
//! Format: `--log-format` beats `COURIER_LOG_FORMAT`, default human.

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

pub const ENV_LOG: &str = "COURIER_LOG";
pub const ENV_LOG_FORMAT: &str = "COURIER_LOG_FORMAT";
pub const ENV_RUST_LOG: &str = "RUST_LOG";

/// Crates whose events the level applies to.
const CRATES: [&str; 5] = [
    "courier",
    "courier_core",
    "courier_store",
    "courier_gate",
    "courier_config",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines on stderr.
    #[default]
    Human,
    /// One JSON object per line on stderr.
    Jsonl,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "human" => Ok(LogFormat::Human),
            "jsonl" | "json" => Ok(LogFormat::Jsonl),
            _ => Err(format!("unknown log format: {} (expected human or jsonl)", s)),
        }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Human => write!(f, "human"),
            LogFormat::Jsonl => write!(f, "jsonl"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Off,
}

impl LogLevel {
    /// Level for a `-v` count: 0 keeps the default, 1 is debug, 2+ is trace.
    pub fn from_verbosity(verbose: u8) -> Option<Self> {
        match verbose {
            0 => None,
            1 => Some(LogLevel::Debug),
            _ => Some(LogLevel::Trace),
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            "off" => Ok(LogLevel::Off),
            _ => Err(format!("unknown log level: {}", s)),
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Off => "off",
        };
        f.write_str(name)
    }
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Off => LevelFilter::OFF,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogConfig {
    pub format: LogFormat,
    pub level: LogLevel,
    /// `RUST_LOG` directive, kept only when no explicit level was given.
    pub rust_log: Option<String>,
}

impl LogConfig {
    /// Resolve from the environment, with CLI values taking precedence.
    pub fn from_env(cli_level: Option<LogLevel>, cli_format: Option<LogFormat>) -> Self {
        let env_level = std::env::var(ENV_LOG)
            .ok()
            .and_then(|val| val.parse::<LogLevel>().ok());
        let explicit = cli_level.or(env_level);
        let rust_log = match explicit {
            Some(_) => None,
            None => std::env::var(ENV_RUST_LOG)
                .ok()
                .filter(|val| !val.trim().is_empty()),
        };
        let env_format = std::env::var(ENV_LOG_FORMAT)
            .ok()
            .and_then(|val| val.parse::<LogFormat>().ok());

        LogConfig {
            format: cli_format.or(env_format).unwrap_or_default(),
            level: explicit.unwrap_or_default(),
            rust_log,
        }
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self.rust_log = None;
        self
    }

    /// Filter for the subscriber. An unparsable `RUST_LOG` falls back to the
    /// level.
    pub fn filter(&self) -> EnvFilter {
        self.rust_log
            .as_deref()
            .and_then(|directive| EnvFilter::try_new(directive).ok())
            .unwrap_or_else(|| level_filter(self.level))
    }
}

fn level_filter(level: LogLevel) -> EnvFilter {
    EnvFilter::new(
        CRATES
            .iter()
            .map(|krate| format!("{}={}", krate, level))
            .collect::<Vec<_>>()
            .join(","),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> std::sync::MutexGuard<'static, ()> {
        ENV_LOCK
            .get_or_init(|| Mutex::new(()))
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    struct EnvGuard {
        saved: Vec<(&'static str, Option<String>)>,
    }

    impl EnvGuard {
        fn clear(keys: &[&'static str]) -> Self {
            let saved = keys.iter().map(|k| (*k, std::env::var(k).ok())).collect();
            for k in keys {
                std::env::remove_var(k);
            }
            Self { saved }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (k, v) in &self.saved {
                match v {
                    Some(v) => std::env::set_var(k, v),
                    None => std::env::remove_var(k),
                }
            }
        }
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Jsonl);
        assert!("xml".parse::<LogFormat>().is_err());
        assert_eq!("WARNING".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert!("loud".parse::<LogLevel>().is_err());
        assert_eq!(LogLevel::from_verbosity(1), Some(LogLevel::Debug));
        assert_eq!(LogLevel::from_verbosity(5), Some(LogLevel::Trace));
    }

    #[test]
    fn test_explicit_level_beats_rust_log() {
        let _lock = env_lock();
        let _guard = EnvGuard::clear(&[ENV_LOG, ENV_RUST_LOG, ENV_LOG_FORMAT]);
        std::env::set_var(ENV_RUST_LOG, "debug");

        let quiet = LogConfig::from_env(Some(LogLevel::Error), None);
        assert_eq!(quiet.rust_log, None);
        assert_eq!(quiet.filter().max_level_hint(), Some(LevelFilter::ERROR));

        std::env::set_var(ENV_LOG, "warn");
        let from_env = LogConfig::from_env(None, None);
        assert_eq!(from_env.level, LogLevel::Warn);
        assert_eq!(from_env.filter().max_level_hint(), Some(LevelFilter::WARN));

        let cli = LogConfig::from_env(Some(LogLevel::Trace), None);
        assert_eq!(cli.level, LogLevel::Trace);
    }

    #[test]
    fn test_rust_log_used_without_explicit_level() {
        let _lock = env_lock();
        let _guard = EnvGuard::clear(&[ENV_LOG, ENV_RUST_LOG, ENV_LOG_FORMAT]);

        assert_eq!(LogConfig::from_env(None, None), LogConfig::default());

        std::env::set_var(ENV_RUST_LOG, "courier_core=trace");
        let config = LogConfig::from_env(None, None);
        assert_eq!(config.rust_log.as_deref(), Some("courier_core=trace"));
        assert_eq!(config.filter().max_level_hint(), Some(LevelFilter::TRACE));
    }

    #[test]
    fn test_format_precedence() {
        let _lock = env_lock();
        let _guard = EnvGuard::clear(&[ENV_LOG, ENV_RUST_LOG, ENV_LOG_FORMAT]);

        std::env::set_var(ENV_LOG_FORMAT, "jsonl");
        assert_eq!(LogConfig::from_env(None, None).format, LogFormat::Jsonl);
        let cli = LogConfig::from_env(None, Some(LogFormat::Human));
        assert_eq!(cli.format, LogFormat::Human);
    }
}
