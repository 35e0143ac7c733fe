mod provider;
mod schema;

pub use provider::{ConfigProvider, FileConfig, StaticConfig};
pub use schema::*;

use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Config format error: {0}")]
    Format(String),
    #[error("Instance {0} is not configured")]
    MissingInstance(String),
}

impl ConfigError {
    pub(crate) fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<toml::Table, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let table: toml::Table = toml::from_str(&content)?;
    Ok(table)
}
