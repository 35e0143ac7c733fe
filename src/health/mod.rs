//! Health monitoring for connection groups
//!
//! This module provides:
//! - One monitor task per configured instance, ticking at a fixed interval
//! - Primary liveness probes while the group is healthy
//! - Rebuild from freshly loaded configuration after a failed probe

mod monitor;
mod state;

pub use crate::pool::ProbeError;
pub use monitor::HealthMonitor;
pub use state::MonitorState;
