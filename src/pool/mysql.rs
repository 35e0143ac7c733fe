use std::fmt;
use std::time::Instant;

use async_trait::async_trait;
use mysql_async::prelude::{FromRow, Queryable};
use mysql_async::{Conn, Opts, OptsBuilder, Params, Pool, PoolConstraints, PoolOpts};
use tracing::{debug, info};

use super::backend::{redact_dsn, Backend, ConnectionError, Dialer, PoolTuning, ProbeError};
use super::logging::SqlLogger;

/// Opens `mysql_async` pools from `mysql://` URLs
///
/// Pools connect lazily: dialing validates the URL and applies tuning, the
/// first probe or query opens the first connection.
#[derive(Debug, Clone, Copy, Default)]
pub struct MysqlDialer;

#[async_trait]
impl Dialer for MysqlDialer {
    type Backend = MysqlBackend;

    async fn dial(&self, dsn: &str, tuning: &PoolTuning) -> Result<MysqlBackend, ConnectionError> {
        let opts = Opts::from_url(dsn)
            .map_err(|e| ConnectionError::InvalidDsn(format!("{}: {}", redact_dsn(dsn), e)))?;
        let pool_opts = apply_tuning(opts.pool_opts().clone(), tuning);
        let constraints = pool_opts.constraints();

        let pool = Pool::new(OptsBuilder::from_opts(opts).pool_opts(pool_opts));

        info!(
            dsn = %redact_dsn(dsn),
            min_idle = constraints.min(),
            max_open = constraints.max(),
            max_lifetime = ?tuning.max_lifetime,
            sql_logging = ?tuning.sql_logging,
            "MySQL connection pool created"
        );

        Ok(MysqlBackend {
            pool,
            dsn: dsn.to_string(),
            logger: SqlLogger::new(tuning.sql_logging, dsn),
        })
    }
}

/// Apply the configured overrides on top of the driver's pool options
///
/// `max_open` bounds the pool size; `max_idle` is the number of idle
/// connections the pool keeps, clamped to `max_open`.
fn apply_tuning(base: PoolOpts, tuning: &PoolTuning) -> PoolOpts {
    let defaults = base.constraints();
    let max = tuning.max_open.unwrap_or(defaults.max()).max(1);
    let min = tuning.max_idle.unwrap_or(defaults.min()).min(max);
    let constraints = PoolConstraints::new(min, max).unwrap_or(defaults);

    let opts = base.with_constraints(constraints);
    match tuning.max_lifetime {
        Some(lifetime) => opts.with_abs_conn_ttl(Some(lifetime)),
        None => opts,
    }
}

/// A `mysql_async` pool bound to one connection string
///
/// Every statement goes through this type so that it reaches the SQL log; the
/// driver pool and its connections are not handed out.
#[derive(Clone)]
pub struct MysqlBackend {
    pool: Pool,
    dsn: String,
    logger: SqlLogger,
}

impl MysqlBackend {
    async fn conn(&self) -> Result<Conn, ConnectionError> {
        Ok(self.pool.get_conn().await?)
    }

    /// Run a text statement and discard its result
    pub async fn query_drop(&self, sql: &str) -> Result<(), ConnectionError> {
        let start = Instant::now();
        let mut conn = self.conn().await?;
        conn.query_drop(sql).await?;
        self.logger.log(sql, start.elapsed());
        Ok(())
    }

    /// Run a text statement and collect its rows
    pub async fn query<T>(&self, sql: &str) -> Result<Vec<T>, ConnectionError>
    where
        T: FromRow + Send + 'static,
    {
        let start = Instant::now();
        let mut conn = self.conn().await?;
        let rows = conn.query(sql).await?;
        self.logger.log(sql, start.elapsed());
        Ok(rows)
    }

    /// Run a text statement and return its first row
    pub async fn query_first<T>(&self, sql: &str) -> Result<Option<T>, ConnectionError>
    where
        T: FromRow + Send + 'static,
    {
        let start = Instant::now();
        let mut conn = self.conn().await?;
        let row = conn.query_first(sql).await?;
        self.logger.log(sql, start.elapsed());
        Ok(row)
    }

    /// Execute a prepared statement and discard its result
    pub async fn exec_drop<P>(&self, stmt: &str, params: P) -> Result<(), ConnectionError>
    where
        P: Into<Params> + Send,
    {
        let start = Instant::now();
        let mut conn = self.conn().await?;
        conn.exec_drop(stmt, params).await?;
        self.logger.log(stmt, start.elapsed());
        Ok(())
    }

    /// Execute a prepared statement and collect its rows
    pub async fn exec<T, P>(&self, stmt: &str, params: P) -> Result<Vec<T>, ConnectionError>
    where
        T: FromRow + Send + 'static,
        P: Into<Params> + Send,
    {
        let start = Instant::now();
        let mut conn = self.conn().await?;
        let rows = conn.exec(stmt, params).await?;
        self.logger.log(stmt, start.elapsed());
        Ok(rows)
    }
}

impl fmt::Debug for MysqlBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MysqlBackend")
            .field("dsn", &redact_dsn(&self.dsn))
            .field("sql_logging", &self.logger.mode())
            .finish()
    }
}

#[async_trait]
impl Backend for MysqlBackend {
    fn dsn(&self) -> &str {
        &self.dsn
    }

    async fn ping(&self) -> Result<(), ProbeError> {
        let mut conn = self.pool.get_conn().await?;
        conn.ping().await?;
        debug!(dsn = %redact_dsn(&self.dsn), "Ping ok");
        Ok(())
    }

    async fn close(&self) -> Result<(), ConnectionError> {
        self.pool.clone().disconnect().await?;
        info!(dsn = %redact_dsn(&self.dsn), "MySQL connection pool closed");
        Ok(())
    }
}
