//! Internal logging facilities, not to be confused with the final report,
//! which records simulation results. This module (re)exports the five
//! logging macros: `error!`, `warn!`, `info!`, `debug!` and `trace!`.
//!
//! Logging is disabled by default. It is controlled with:
//!
//!  - `enable_logging()`: turns on all log messages
//!  - `disable_logging()`: turns off all log messages
//!  - `set_log_level(level: LevelFilter)`: enables only log messages with
//!    priority at least `level`

pub use log::{debug, error, info, trace, warn, LevelFilter};

use log4rs::append::console::ConsoleAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;
use log4rs::Handle;
use std::sync::{LazyLock, Mutex};

// ISO 8601 timestamp and a color coded level tag.
const DEFAULT_LOG_PATTERN: &str = "{d(%Y-%m-%dT%H:%M:%SZ)} {h({l})} {t} - {m}{n}";
// Logging disabled.
const DEFAULT_LOG_LEVEL: LevelFilter = LevelFilter::Off;

/// A global instance of the logging configuration.
static LOG_CONFIGURATION: LazyLock<Mutex<LogConfiguration>> = LazyLock::new(Mutex::default);

/// Holds the logging configuration and a handle to the installed logger.
/// Because loggers are installed globally, only one instance of this struct
/// exists; the public API are free functions which lock the singleton.
struct LogConfiguration {
    global_log_level: LevelFilter,
    /// Handle to the `log4rs` logger, once installed. The handle lets the
    /// configuration be swapped after installation.
    root_handle: Option<Handle>,
}

impl Default for LogConfiguration {
    fn default() -> Self {
        LogConfiguration {
            global_log_level: DEFAULT_LOG_LEVEL,
            root_handle: None,
        }
    }
}

impl LogConfiguration {
    fn set_config(&mut self) {
        let encoder = Box::new(PatternEncoder::new(DEFAULT_LOG_PATTERN));
        let stdout = ConsoleAppender::builder().encoder(encoder).build();
        let config = Config::builder()
            .appender(Appender::builder().build("stdout", Box::new(stdout)))
            .build(Root::builder().appender("stdout").build(self.global_log_level));
        let config = match config {
            Ok(config) => config,
            Err(e) => panic!("failed to build logging config: {e}"),
        };

        match self.root_handle {
            Some(ref mut handle) => handle.set_config(config),
            None => self.root_handle = Some(log4rs::init_config(config).unwrap()),
        }
    }
}

/// Enables the logger with no level filter / full logging. Equivalent to
/// `set_log_level(LevelFilter::Trace)`.
pub fn enable_logging() {
    set_log_level(LevelFilter::Trace);
}

/// Disables logging completely. Equivalent to
/// `set_log_level(LevelFilter::Off)`.
pub fn disable_logging() {
    set_log_level(LevelFilter::Off);
}

/// Sets the global log level. `LevelFilter::Off` disables logging.
pub fn set_log_level(level: LevelFilter) {
    let mut configuration = LOG_CONFIGURATION.lock().unwrap();
    configuration.global_log_level = level;
    configuration.set_config();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_level_can_be_changed_repeatedly() {
        set_log_level(LevelFilter::Info);
        assert_eq!(log::max_level(), LevelFilter::Info);
        set_log_level(LevelFilter::Error);
        assert_eq!(log::max_level(), LevelFilter::Error);
        disable_logging();
        assert_eq!(log::max_level(), LevelFilter::Off);
    }
}
