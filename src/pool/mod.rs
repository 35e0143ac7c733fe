//! Backend connection pools
//!
//! The group layer works against the [`Backend`]/[`Dialer`] traits; the
//! shipped implementation wraps `mysql_async` pools.

mod backend;
mod logging;
mod mysql;

pub use backend::{redact_dsn, Backend, ConnectionError, Dialer, PoolTuning, ProbeError};
pub use logging::{SqlLogLevel, SqlLogger, SqlLogging, SQL_LOG_TARGET};
pub use mysql::{MysqlBackend, MysqlDialer};
