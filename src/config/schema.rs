use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use super::ConfigError;
use crate::pool::SqlLogLevel;

/// Section holding `instance name -> { role -> connection string }`
pub const CLUSTERS_SECTION: &str = "clusters";
/// Section holding pool tuning shared by every instance
pub const TUNING_SECTION: &str = "tuning";
/// Section holding SQL log sink settings
pub const SQL_LOG_SECTION: &str = "sql_log";
/// Section holding health monitor settings
pub const MONITOR_SECTION: &str = "monitor";

/// Role key that marks the primary connection string
pub const PRIMARY_KEY: &str = "master";

// ============================================================================
// Instance Configuration
// ============================================================================

/// Typed connection strings for one instance
///
/// Produced from the raw role map: the `master` key is the primary, every
/// other key is a replica. Replicas keep the table's key order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceConfig {
    /// Primary (writable) connection string
    pub primary: String,
    /// Replica (read-only) connection strings
    pub replicas: Vec<String>,
}

impl InstanceConfig {
    pub fn new(primary: impl Into<String>, replicas: Vec<String>) -> Self {
        Self {
            primary: primary.into(),
            replicas,
        }
    }

    /// Parse one instance's role map
    pub fn from_value(name: &str, value: &toml::Value) -> Result<Self, ConfigError> {
        let roles = value.as_table().ok_or_else(|| {
            ConfigError::format(format!(
                "instance {name}: expected a table of role -> connection string, got {}",
                value.type_str()
            ))
        })?;

        let mut primary = None;
        let mut replicas = Vec::with_capacity(roles.len().saturating_sub(1));
        for (role, dsn) in roles {
            let dsn = scalar_to_string(dsn).ok_or_else(|| {
                ConfigError::format(format!(
                    "instance {name}: connection string for {role} must be a scalar, got {}",
                    dsn.type_str()
                ))
            })?;
            if role == PRIMARY_KEY {
                primary = Some(dsn);
            } else {
                replicas.push(dsn);
            }
        }

        let primary = primary.ok_or_else(|| {
            ConfigError::format(format!("instance {name}: missing `{PRIMARY_KEY}` entry"))
        })?;

        Ok(Self { primary, replicas })
    }

    /// Check if this instance has replicas
    pub fn has_replicas(&self) -> bool {
        !self.replicas.is_empty()
    }
}

fn scalar_to_string(value: &toml::Value) -> Option<String> {
    match value {
        toml::Value::String(s) => Some(s.clone()),
        toml::Value::Integer(i) => Some(i.to_string()),
        toml::Value::Float(f) => Some(f.to_string()),
        toml::Value::Boolean(b) => Some(b.to_string()),
        toml::Value::Datetime(d) => Some(d.to_string()),
        toml::Value::Array(_) | toml::Value::Table(_) => None,
    }
}

fn clusters_table(doc: &toml::Table) -> Result<&toml::Table, ConfigError> {
    let section = doc
        .get(CLUSTERS_SECTION)
        .ok_or_else(|| ConfigError::format(format!("`{CLUSTERS_SECTION}` section is missing")))?;
    section.as_table().ok_or_else(|| {
        ConfigError::format(format!(
            "`{CLUSTERS_SECTION}` must be a table of instance -> roles, got {}",
            section.type_str()
        ))
    })
}

/// Parse every configured instance
///
/// Fails on the first malformed instance; the top-level section must be a table.
pub fn parse_clusters(doc: &toml::Table) -> Result<Vec<(String, InstanceConfig)>, ConfigError> {
    clusters_table(doc)?
        .iter()
        .map(|(name, value)| Ok((name.clone(), InstanceConfig::from_value(name, value)?)))
        .collect()
}

/// Parse a single instance by name
pub fn instance_config(doc: &toml::Table, name: &str) -> Result<InstanceConfig, ConfigError> {
    let value = clusters_table(doc)?
        .get(name)
        .ok_or_else(|| ConfigError::MissingInstance(name.to_string()))?;
    InstanceConfig::from_value(name, value)
}

// ============================================================================
// Tuning Configuration
// ============================================================================

/// Pool tuning shared by all instances
///
/// Numeric limits are independent overrides: a non-positive value leaves the
/// driver default in place.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct Tuning {
    /// Idle connections kept per pool
    #[serde(default)]
    pub max_idle_conns: i64,
    /// Open connections allowed per pool
    #[serde(default)]
    pub max_open_conns: i64,
    /// Connection lifetime (seconds)
    #[serde(default)]
    pub conn_max_lifetime: i64,
    /// Structured SQL logging
    #[serde(default)]
    pub log: bool,
    /// Lightweight SQL echo, ignored when `log` is on
    #[serde(default)]
    pub show_sql: bool,
}

impl Tuning {
    pub fn max_idle(&self) -> Option<usize> {
        positive(self.max_idle_conns).map(|v| v as usize)
    }

    pub fn max_open(&self) -> Option<usize> {
        positive(self.max_open_conns).map(|v| v as usize)
    }

    pub fn max_lifetime(&self) -> Option<Duration> {
        positive(self.conn_max_lifetime).map(|v| Duration::from_secs(v as u64))
    }
}

fn positive(value: i64) -> Option<i64> {
    (value > 0).then_some(value)
}

// ============================================================================
// SQL Log Configuration
// ============================================================================

/// SQL log sink settings
///
/// `level` selects the verbosity of structured SQL logging. The file keys
/// place the log under `<log_path>/<log_file>`; rotation is time based.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct SqlLogConfig {
    /// DEBUG, INFO, WARN or ERROR
    #[serde(default)]
    pub level: Option<String>,
    /// File name without the `.log` suffix
    #[serde(default)]
    pub log_file: Option<String>,
    /// Directory for the log file
    #[serde(default)]
    pub log_path: Option<String>,
    /// Retention (days); needs `rotation_time`
    #[serde(default)]
    pub max_age: i64,
    /// Size-based rotation (MB); only 0 is accepted
    #[serde(default)]
    pub rotation_size: i64,
    /// Rotation period (hours): 1 or 24, 0 for a single file
    #[serde(default)]
    pub rotation_time: i64,
}

/// Rotation period of the SQL log file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogRotation {
    Never,
    Hourly,
    Daily,
}

impl SqlLogConfig {
    pub fn level(&self) -> SqlLogLevel {
        self.level
            .as_deref()
            .map(SqlLogLevel::from_name)
            .unwrap_or(SqlLogLevel::Unknown)
    }

    /// Directory and file name prefix, when a file name is configured
    pub fn file_location(&self) -> Option<(PathBuf, &str)> {
        let file = self.log_file.as_deref().filter(|f| !f.is_empty())?;
        let dir = PathBuf::from(self.log_path.as_deref().unwrap_or("."));
        Some((dir, file))
    }

    pub fn rotation(&self) -> LogRotation {
        match self.rotation_time {
            1 => LogRotation::Hourly,
            24 => LogRotation::Daily,
            _ => LogRotation::Never,
        }
    }

    /// Rotated files to keep so that `max_age` days are retained
    pub fn max_files(&self) -> Option<usize> {
        let days = positive(self.max_age)? as usize;
        match self.rotation() {
            LogRotation::Hourly => Some(days * 24),
            LogRotation::Daily => Some(days),
            LogRotation::Never => None,
        }
    }

    /// Reject settings the file sink cannot honor
    fn validate(&self) -> Result<(), ConfigError> {
        if self.rotation_time > 0 && self.rotation() == LogRotation::Never {
            return Err(ConfigError::format(format!(
                "sql_log.rotation_time must be 1 or 24 hours, got {}",
                self.rotation_time
            )));
        }
        if self.rotation_size > 0 {
            return Err(ConfigError::format(
                "sql_log.rotation_size is not supported, rotate with rotation_time",
            ));
        }
        if self.max_age > 0 && self.rotation() == LogRotation::Never {
            return Err(ConfigError::format(
                "sql_log.max_age needs rotation_time to be set",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Monitor Configuration
// ============================================================================

/// Health monitor configuration
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Interval between probes and between rebuild attempts (milliseconds)
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

fn default_tick_interval_ms() -> u64 {
    1000
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

impl MonitorConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}

// ============================================================================
// Settings
// ============================================================================

/// Every non-cluster section of the configuration document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    pub tuning: Tuning,
    pub sql_log: SqlLogConfig,
    pub monitor: MonitorConfig,
}

impl Settings {
    /// Read the optional sections; absent sections take their defaults
    ///
    /// SQL log settings the file sink cannot honor are rejected here.
    pub fn from_table(doc: &toml::Table) -> Result<Self, ConfigError> {
        let settings = Self {
            tuning: section(doc, TUNING_SECTION)?,
            sql_log: section(doc, SQL_LOG_SECTION)?,
            monitor: section(doc, MONITOR_SECTION)?,
        };
        settings.sql_log.validate()?;
        Ok(settings)
    }
}

fn section<T>(doc: &toml::Table, key: &str) -> Result<T, ConfigError>
where
    T: for<'de> Deserialize<'de> + Default,
{
    match doc.get(key) {
        Some(value) => Ok(value.clone().try_into()?),
        None => Ok(T::default()),
    }
}
