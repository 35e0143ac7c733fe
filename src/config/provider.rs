//! Configuration sources
//!
//! The cluster reads its configuration through [`ConfigProvider`] at startup
//! and again on every rebuild attempt, so a provider that re-reads its source
//! lets connection strings change while the process is running.

use std::path::PathBuf;

use parking_lot::RwLock;

use super::{load_config, ConfigError};

/// Source of the raw configuration document
pub trait ConfigProvider: Send + Sync + 'static {
    /// Return the current configuration document
    fn load(&self) -> Result<toml::Table, ConfigError>;
}

/// In-memory configuration
///
/// The document can be swapped with [`StaticConfig::replace`], which is how
/// tests simulate configuration changes between monitor ticks.
#[derive(Debug, Default)]
pub struct StaticConfig {
    table: RwLock<toml::Table>,
}

impl StaticConfig {
    pub fn new(table: toml::Table) -> Self {
        Self {
            table: RwLock::new(table),
        }
    }

    /// Parse a TOML document into a static config
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(Self::new(toml::from_str(content)?))
    }

    /// Swap the whole document
    pub fn replace(&self, table: toml::Table) {
        *self.table.write() = table;
    }
}

impl ConfigProvider for StaticConfig {
    fn load(&self) -> Result<toml::Table, ConfigError> {
        Ok(self.table.read().clone())
    }
}

/// TOML file configuration, re-read on every call
#[derive(Debug, Clone)]
pub struct FileConfig {
    path: PathBuf,
}

impl FileConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ConfigProvider for FileConfig {
    fn load(&self) -> Result<toml::Table, ConfigError> {
        load_config(&self.path)
    }
}
