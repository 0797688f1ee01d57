//! Structured logging utilities for vprj components.
//!
//! Provides consistent logging with component prefixes and structured fields.
//!
//! # Usage
//!
//! ```ignore
//! use vprj_config::log_dispatch_debug;
//!
//! log_dispatch_debug!("Enumeration started", entries = 12, path = %path);
//! ```

use std::str::FromStr;

use crate::ConfigError;

/// Component identifiers for log filtering
pub struct Component;

impl Component {
    pub const DISPATCH: &'static str = "DISPATCH";
    pub const TREE: &'static str = "TREE";
    pub const CLI: &'static str = "CLI";
}

/// Log levels for runtime configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(ConfigError::Invalid(format!("unknown log level: {}", other))),
        }
    }
}

// === DISPATCH logging macros ===

#[macro_export]
macro_rules! log_dispatch_error {
    ($msg:literal $(, $($field:tt)+)?) => {
        tracing::error!(component = "DISPATCH", $($($field)+ ,)? $msg)
    };
}

#[macro_export]
macro_rules! log_dispatch_warn {
    ($msg:literal $(, $($field:tt)+)?) => {
        tracing::warn!(component = "DISPATCH", $($($field)+ ,)? $msg)
    };
}

#[macro_export]
macro_rules! log_dispatch_info {
    ($msg:literal $(, $($field:tt)+)?) => {
        tracing::info!(component = "DISPATCH", $($($field)+ ,)? $msg)
    };
}

#[macro_export]
macro_rules! log_dispatch_debug {
    ($msg:literal $(, $($field:tt)+)?) => {
        tracing::debug!(component = "DISPATCH", $($($field)+ ,)? $msg)
    };
}

#[macro_export]
macro_rules! log_dispatch_trace {
    ($msg:literal $(, $($field:tt)+)?) => {
        tracing::trace!(component = "DISPATCH", $($($field)+ ,)? $msg)
    };
}

// === TREE logging macros ===

#[macro_export]
macro_rules! log_tree_info {
    ($msg:literal $(, $($field:tt)+)?) => {
        tracing::info!(component = "TREE", $($($field)+ ,)? $msg)
    };
}

#[macro_export]
macro_rules! log_tree_debug {
    ($msg:literal $(, $($field:tt)+)?) => {
        tracing::debug!(component = "TREE", $($($field)+ ,)? $msg)
    };
}

// === CLI logging macros ===

#[macro_export]
macro_rules! log_cli_info {
    ($msg:literal $(, $($field:tt)+)?) => {
        tracing::info!(component = "CLI", $($($field)+ ,)? $msg)
    };
}

#[macro_export]
macro_rules! log_cli_debug {
    ($msg:literal $(, $($field:tt)+)?) => {
        tracing::debug!(component = "CLI", $($($field)+ ,)? $msg)
    };
}

/// Initialize logging with the given level filter.
/// Call this once at application startup.
///
/// `VPRJ_LOG` wins over `RUST_LOG`, which wins over `level`.
pub fn init_logging(level: LogLevel) {
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_env("VPRJ_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    // A subscriber may already be installed (tests, embedding hosts).
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .try_init();
}
