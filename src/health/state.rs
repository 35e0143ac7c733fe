//! Monitor state for one instance

use std::fmt;

/// State of an instance's health monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MonitorState {
    /// Group is installed; each tick probes its primary
    #[default]
    Healthy,
    /// Group is dead or missing; each tick attempts a rebuild
    Rebuilding,
}

impl MonitorState {
    pub fn is_healthy(&self) -> bool {
        *self == Self::Healthy
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "HEALTHY",
            Self::Rebuilding => "REBUILDING",
        }
    }

    /// Gauge value exported to metrics
    pub fn as_gauge(&self) -> i64 {
        match self {
            Self::Healthy => 0,
            Self::Rebuilding => 1,
        }
    }
}

impl fmt::Display for MonitorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
