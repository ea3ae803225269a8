#![deny(missing_docs)]
//! Shared logging utilities for the tool change tracker workspace.
//!
//! This crate provides the `tracker_*` logging macros used across the codebase
//! plus logger initializers for the command line tool and for tests.
//!
//! Log records always go to stderr (and optionally a file). Stdout belongs to
//! the printer host, which relays it to the operator console.

use std::fs::File;
use std::path::Path;

use log::LevelFilter;
use simplelog::{
    ColorChoice, CombinedLogger, Config, ConfigBuilder, SharedLogger, TermLogger, TerminalMode,
    WriteLogger,
};

/// Logs a trace-level message using the global logging facade.
#[macro_export]
macro_rules! tracker_trace {
    ($($arg:tt)*) => {{
        log::trace!($($arg)*);
    }};
}

/// Logs a debug-level message using the global logging facade.
#[macro_export]
macro_rules! tracker_debug {
    ($($arg:tt)*) => {{
        log::debug!($($arg)*);
    }};
}

/// Logs an info-level message using the global logging facade.
#[macro_export]
macro_rules! tracker_info {
    ($($arg:tt)*) => {{
        log::info!($($arg)*);
    }};
}

/// Logs a warn-level message using the global logging facade.
#[macro_export]
macro_rules! tracker_warn {
    ($($arg:tt)*) => {{
        log::warn!($($arg)*);
    }};
}

/// Logs an error-level message using the global logging facade.
#[macro_export]
macro_rules! tracker_error {
    ($($arg:tt)*) => {{
        log::error!($($arg)*);
    }};
}

/// Verbosity requested on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    /// Warnings and errors only.
    Quiet,
    /// Everything down to debug.
    Verbose,
}

impl Verbosity {
    fn level(self) -> LevelFilter {
        match self {
            Verbosity::Quiet => LevelFilter::Warn,
            Verbosity::Verbose => LevelFilter::Debug,
        }
    }
}

/// Initializes the process logger for a command line invocation.
///
/// Logs go to stderr, and additionally to `log_file` when one is given. A log
/// file that cannot be created is reported on stderr and otherwise ignored.
pub fn initialize(verbosity: Verbosity, log_file: Option<&Path>) {
    let level = verbosity.level();
    let config = build_config();

    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        level,
        config.clone(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )];
    if let Some(path) = log_file {
        match File::create(path) {
            Ok(file) => loggers.push(WriteLogger::new(level, config, file)),
            Err(err) => {
                eprintln!("Warning: Could not create log file at {:?}: {}", path, err);
            }
        }
    }

    let _ = CombinedLogger::init(loggers);
}

fn build_config() -> Config {
    ConfigBuilder::new()
        .set_time_format_rfc3339()
        .set_target_level(LevelFilter::Error)
        .build()
}

/// Initializes a simple terminal logger for use in unit tests.
///
/// This safely no-ops if another logger has already been initialized.
pub fn initialize_for_tests() {
    // Use debug level in debug builds, info in release builds.
    let level = if cfg!(debug_assertions) {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    // Ignore the error if a logger was already set by another test.
    let _ = CombinedLogger::init(vec![TermLogger::new(
        level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )]);
}
