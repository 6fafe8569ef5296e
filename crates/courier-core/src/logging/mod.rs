//! Structured logging for the delivery engine.
//!
//! stdout is reserved for command output; every log line goes to stderr,
//! either human-readable or as JSON lines. Events carry an `event` field
//! from [`event_names`].

pub mod config;
pub mod events;

pub use config::{LogConfig, LogFormat, LogLevel};
pub use events::event_names;

use std::io::IsTerminal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::fmt;

/// Initialize the global subscriber with the filter from
/// [`LogConfig::filter`]. Calling this twice is a no-op.
pub fn init_logging(config: &LogConfig) {
    let filter = config.filter();

    let result = match config.format {
        LogFormat::Human => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .with_thread_names(true)
                    .with_ansi(std::io::stderr().is_terminal()),
            )
            .try_init(),
        LogFormat::Jsonl => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_current_span(false)
                    .with_thread_names(true)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
    };
    if result.is_err() {
        tracing::debug!("logging already initialized");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_filter_covers_workspace() {
        let filter = LogConfig::default().with_level(LogLevel::Debug).filter().to_string();
        assert!(filter.contains("courier_core=debug"));
        assert!(filter.contains("courier_store=debug"));
    }

    #[test]
    fn test_init_twice_is_harmless() {
        let config = LogConfig::default().with_level(LogLevel::Off);
        init_logging(&config);
        init_logging(&config.with_format(LogFormat::Jsonl));
    }
}
