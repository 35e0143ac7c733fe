//! dbcluster: named MySQL primary/replica connection groups
//!
//! Each configured instance gets a [`ConnectionGroup`] holding one primary pool
//! and zero or more replica pools. Groups live in a shared [`GroupRegistry`];
//! callers resolve handles through the [`Router`], and one [`HealthMonitor`]
//! per instance probes the primary and rebuilds the group when it dies.
//!
//! ```no_run
//! use std::sync::Arc;
//! use dbcluster::{Cluster, FileConfig, MysqlDialer, Role};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let cluster = Cluster::builder(
//!     Arc::new(FileConfig::new("config/dbcluster.toml")),
//!     Arc::new(MysqlDialer),
//! )
//! .init()
//! .await?;
//!
//! let reader = cluster.resolve("orders", Role::Replica)?;
//! # let _ = reader;
//! cluster.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod group;
pub mod health;
pub mod metrics;
pub mod pool;
pub mod router;

pub use config::{ConfigError, ConfigProvider, FileConfig, InstanceConfig, StaticConfig};
pub use group::{Cluster, ClusterBuilder, ConnectionGroup, GroupBuilder, GroupRegistry, InitError};
pub use health::{HealthMonitor, MonitorState};
pub use pool::{Backend, ConnectionError, Dialer, MysqlBackend, MysqlDialer, PoolTuning, ProbeError};
pub use router::{NotFound, Role, Router};
