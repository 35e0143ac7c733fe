//! Backend and dialer seam
//!
//! A [`Backend`] is one connection pool bound to one connection string. A
//! [`Dialer`] opens backends; the group builder only ever talks to these two
//! traits, so the MySQL driver can be swapped for an in-memory fake in tests.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use super::logging::SqlLogging;
use crate::config::{SqlLogConfig, Tuning};

/// Error while opening or closing a backend
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Invalid connection string: {0}")]
    InvalidDsn(String),
    #[error("Dial failed: {0}")]
    Dial(String),
    #[error("MySQL error: {0}")]
    Driver(#[from] mysql_async::Error),
}

/// Liveness probe failure
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Group is closed")]
    Closed,
    #[error("Ping failed: {0}")]
    Ping(String),
    #[error("MySQL error: {0}")]
    Driver(#[from] mysql_async::Error),
}

/// Pool settings applied to every backend of a group
///
/// Each limit is an independent override; `None` keeps the driver default.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolTuning {
    pub max_idle: Option<usize>,
    pub max_open: Option<usize>,
    pub max_lifetime: Option<Duration>,
    pub sql_logging: SqlLogging,
}

impl PoolTuning {
    pub fn from_settings(tuning: &Tuning, sql_log: &SqlLogConfig) -> Self {
        Self {
            max_idle: tuning.max_idle(),
            max_open: tuning.max_open(),
            max_lifetime: tuning.max_lifetime(),
            sql_logging: SqlLogging::resolve(tuning, sql_log),
        }
    }
}

/// A connection pool bound to one connection string
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Connection string this pool was opened with
    fn dsn(&self) -> &str;

    /// Check that the pool can reach its server
    async fn ping(&self) -> Result<(), ProbeError>;

    /// Release every connection held by the pool
    async fn close(&self) -> Result<(), ConnectionError>;
}

/// Opens backends from connection strings
#[async_trait]
pub trait Dialer: Send + Sync + 'static {
    type Backend: Backend;

    async fn dial(&self, dsn: &str, tuning: &PoolTuning) -> Result<Self::Backend, ConnectionError>;
}

/// Hide the password part of a URL-style connection string
///
/// Only the authority (between `://` and the first `/`, `?` or `#`) can hold
/// credentials.
pub fn redact_dsn(dsn: &str) -> String {
    let Some(scheme_end) = dsn.find("://") else {
        return dsn.to_string();
    };
    let rest = &dsn[scheme_end + 3..];
    let authority_end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let authority = &rest[..authority_end];
    let Some(at) = authority.rfind('@') else {
        return dsn.to_string();
    };
    let userinfo = &authority[..at];
    match userinfo.find(':') {
        Some(colon) => format!(
            "{}{}:***{}",
            &dsn[..scheme_end + 3],
            &userinfo[..colon],
            &rest[at..]
        ),
        None => dsn.to_string(),
    }
}
