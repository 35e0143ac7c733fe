//! Group builder: connection strings + tuning → connection group

use std::sync::Arc;

use tracing::{debug, warn};

use super::ConnectionGroup;
use crate::config::InstanceConfig;
use crate::pool::{redact_dsn, ConnectionError, Dialer, PoolTuning};

/// Builds connection groups through a [`Dialer`]
pub struct GroupBuilder<D: Dialer> {
    dialer: Arc<D>,
}

impl<D: Dialer> Clone for GroupBuilder<D> {
    fn clone(&self) -> Self {
        Self {
            dialer: self.dialer.clone(),
        }
    }
}

impl<D: Dialer> GroupBuilder<D> {
    pub fn new(dialer: Arc<D>) -> Self {
        Self { dialer }
    }

    /// Dial the primary, then each replica in order
    ///
    /// If a replica fails after earlier backends were opened, the partial
    /// group is closed before the error is returned.
    pub async fn build(
        &self,
        name: &str,
        instance: &InstanceConfig,
        tuning: &PoolTuning,
    ) -> Result<ConnectionGroup<D::Backend>, ConnectionError> {
        debug!(instance = %name, dsn = %redact_dsn(&instance.primary), "Dialing primary");
        let primary = self.dialer.dial(&instance.primary, tuning).await?;
        if !instance.has_replicas() {
            debug!(instance = %name, "No replicas, reads use the primary");
        }

        let mut replicas = Vec::with_capacity(instance.replicas.len());
        for dsn in &instance.replicas {
            debug!(instance = %name, dsn = %redact_dsn(dsn), "Dialing replica");
            match self.dialer.dial(dsn, tuning).await {
                Ok(backend) => replicas.push(backend),
                Err(e) => {
                    let partial = ConnectionGroup::new(name, primary, replicas);
                    if let Err(close_err) = partial.close().await {
                        warn!(instance = %name, error = %close_err, "Failed to close partial group");
                    }
                    return Err(e);
                }
            }
        }

        Ok(ConnectionGroup::new(name, primary, replicas))
    }

    /// Build, retrying exactly once immediately on failure
    pub async fn build_with_retry(
        &self,
        name: &str,
        instance: &InstanceConfig,
        tuning: &PoolTuning,
    ) -> Result<ConnectionGroup<D::Backend>, ConnectionError> {
        match self.build(name, instance, tuning).await {
            Ok(group) => Ok(group),
            Err(e) => {
                warn!(instance = %name, error = %e, "Group build failed, retrying once");
                self.build(name, instance, tuning).await
            }
        }
    }
}
