//! Connection groups and the cluster that owns them
//!
//! A group is one instance's primary plus its replicas. The registry maps
//! instance names to their current group, the builder produces groups from
//! configuration, and the cluster wires both to the health monitors.

mod builder;
mod connection;
mod manager;
mod registry;

pub use builder::GroupBuilder;
pub use connection::ConnectionGroup;
pub use manager::{Cluster, ClusterBuilder, InitError};
pub use registry::GroupRegistry;
