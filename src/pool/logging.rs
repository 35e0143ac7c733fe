//! SQL statement logging
//!
//! Two mutually exclusive modes: structured logging at a configured level, or
//! a plain echo of each statement. Structured logging wins when both are
//! enabled.

use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::backend::redact_dsn;
use crate::config::{SqlLogConfig, Tuning};

/// Target used for every SQL log event
pub const SQL_LOG_TARGET: &str = "dbcluster::sql";

/// Verbosity of structured SQL logging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SqlLogLevel {
    Debug,
    Info,
    Warn,
    Error,
    /// Unrecognized level name; produces no output
    #[default]
    Unknown,
}

impl SqlLogLevel {
    /// Map a configured level name (DEBUG, INFO, WARN, ERROR)
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_uppercase().as_str() {
            "DEBUG" => Self::Debug,
            "INFO" => Self::Info,
            "WARN" => Self::Warn,
            "ERROR" => Self::Error,
            _ => Self::Unknown,
        }
    }
}

/// SQL logging mode of a pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SqlLogging {
    #[default]
    Off,
    /// Bare statement echo
    Echo,
    /// Structured events at the given level
    Structured(SqlLogLevel),
}

impl SqlLogging {
    pub fn resolve(tuning: &Tuning, sql_log: &SqlLogConfig) -> Self {
        if tuning.log {
            Self::Structured(sql_log.level())
        } else if tuning.show_sql {
            Self::Echo
        } else {
            Self::Off
        }
    }
}

/// Emits SQL log events for one backend
#[derive(Debug, Clone)]
pub struct SqlLogger {
    mode: SqlLogging,
    dsn: String,
}

impl SqlLogger {
    pub fn new(mode: SqlLogging, dsn: &str) -> Self {
        Self {
            mode,
            dsn: redact_dsn(dsn),
        }
    }

    pub fn mode(&self) -> SqlLogging {
        self.mode
    }

    /// Log one executed statement
    pub fn log(&self, sql: &str, elapsed: Duration) {
        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
        match self.mode {
            SqlLogging::Off => {}
            SqlLogging::Echo => info!(target: SQL_LOG_TARGET, "[SQL] {}", sql),
            SqlLogging::Structured(level) => match level {
                SqlLogLevel::Debug => {
                    debug!(target: SQL_LOG_TARGET, dsn = %self.dsn, sql = %sql, elapsed_ms, "SQL executed")
                }
                SqlLogLevel::Info => {
                    info!(target: SQL_LOG_TARGET, dsn = %self.dsn, sql = %sql, elapsed_ms, "SQL executed")
                }
                SqlLogLevel::Warn => {
                    warn!(target: SQL_LOG_TARGET, dsn = %self.dsn, sql = %sql, elapsed_ms, "SQL executed")
                }
                SqlLogLevel::Error => {
                    error!(target: SQL_LOG_TARGET, dsn = %self.dsn, sql = %sql, elapsed_ms, "SQL executed")
                }
                SqlLogLevel::Unknown => {}
            },
        }
    }
}
