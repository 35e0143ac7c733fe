//! Cluster manager: startup, routing and monitor supervision

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::{ConnectionGroup, GroupBuilder, GroupRegistry};
use crate::config::{parse_clusters, ConfigError, ConfigProvider, Settings};
use crate::health::{HealthMonitor, MonitorState};
use crate::metrics::metrics;
use crate::pool::{Backend, ConnectionError, Dialer, PoolTuning};
use crate::router::{NotFound, Role, Router};

/// Startup failure
#[derive(Debug, Error)]
pub enum InitError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Failed to connect instance {instance}: {source}")]
    Connect {
        instance: String,
        source: ConnectionError,
    },
}

/// Configures and starts a [`Cluster`]
pub struct ClusterBuilder<D: Dialer> {
    provider: Arc<dyn ConfigProvider>,
    dialer: Arc<D>,
    registry: Option<Arc<GroupRegistry<D::Backend>>>,
    tick_interval: Option<Duration>,
    cancel: Option<CancellationToken>,
}

impl<D: Dialer> ClusterBuilder<D> {
    /// Install groups into an existing registry instead of a fresh one
    pub fn registry(mut self, registry: Arc<GroupRegistry<D::Backend>>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Override the `[monitor] tick_interval_ms` setting
    pub fn tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = Some(interval);
        self
    }

    /// Stop the monitors when `token` is cancelled
    ///
    /// The cluster only ever cancels a child of `token`.
    pub fn cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Build every configured group, install them, and start one monitor each
    ///
    /// Each group gets one immediate retry. All groups are built before any is
    /// installed; on failure the groups built so far are closed and the
    /// registry is left as it was.
    pub async fn init(self) -> Result<Cluster<D::Backend>, InitError> {
        let doc = self.provider.load()?;
        let instances = parse_clusters(&doc)?;
        let settings = Settings::from_table(&doc)?;
        let tuning = PoolTuning::from_settings(&settings.tuning, &settings.sql_log);
        let builder = GroupBuilder::new(self.dialer);

        let mut built = Vec::with_capacity(instances.len());
        for (name, instance) in &instances {
            match builder.build_with_retry(name, instance, &tuning).await {
                Ok(group) => built.push(group),
                Err(source) => {
                    error!(instance = %name, error = %source, "Failed to build group");
                    for group in &built {
                        if let Err(e) = group.close().await {
                            warn!(instance = %group.name(), error = %e, "Failed to close group");
                        }
                    }
                    return Err(InitError::Connect {
                        instance: name.clone(),
                        source,
                    });
                }
            }
        }

        let registry = self.registry.unwrap_or_default();
        for group in built {
            let name = group.name().to_string();
            let replicas = group.replicas().len();
            if let Some(previous) = registry.put(name.clone(), group) {
                if let Err(e) = previous.close().await {
                    warn!(instance = %name, error = %e, "Failed to close replaced group");
                }
            }
            info!(instance = %name, replicas = replicas, "Registered group");
        }
        metrics().set_groups(registry.len());

        let interval = self
            .tick_interval
            .unwrap_or_else(|| settings.monitor.tick_interval());
        // Cancelling or dropping the cluster must not reach the caller's token
        let cancel = self
            .cancel
            .map(|token| token.child_token())
            .unwrap_or_default();

        let mut states = HashMap::with_capacity(instances.len());
        let mut tasks = Vec::with_capacity(instances.len());
        for (name, _) in instances {
            let monitor = HealthMonitor::new(
                name.clone(),
                registry.clone(),
                builder.clone(),
                self.provider.clone(),
            );
            metrics().set_monitor_state(&name, monitor.state());
            states.insert(name, monitor.subscribe());
            tasks.push(monitor.spawn(interval, cancel.clone()));
        }

        info!(
            instances = states.len(),
            interval_ms = interval.as_millis() as u64,
            "Cluster started"
        );

        Ok(Cluster {
            router: Router::new(registry.clone()),
            registry,
            states,
            tasks: Mutex::new(tasks),
            cancel,
        })
    }
}

/// Running set of connection groups and their health monitors
pub struct Cluster<B: Backend> {
    registry: Arc<GroupRegistry<B>>,
    router: Router<B>,
    states: HashMap<String, watch::Receiver<MonitorState>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl<B: Backend> Cluster<B> {
    /// Start configuring a cluster
    pub fn builder<D>(provider: Arc<dyn ConfigProvider>, dialer: Arc<D>) -> ClusterBuilder<D>
    where
        D: Dialer<Backend = B>,
    {
        ClusterBuilder {
            provider,
            dialer,
            registry: None,
            tick_interval: None,
            cancel: None,
        }
    }

    /// Resolve a handle; see [`Router::resolve`]
    pub fn resolve(&self, instance: &str, role: impl Into<Role>) -> Result<Arc<B>, NotFound> {
        self.router.resolve(instance, role)
    }

    /// Install a prebuilt group, bypassing configuration and dialing
    ///
    /// A group displaced by this call is closed.
    pub async fn register(&self, name: impl Into<String>, group: ConnectionGroup<B>) {
        let name = name.into();
        if let Some(previous) = self.registry.put(name.clone(), group) {
            if let Err(e) = previous.close().await {
                warn!(instance = %name, error = %e, "Failed to close replaced group");
            }
        }
        info!(instance = %name, "Registered group");
        metrics().set_groups(self.registry.len());
    }

    pub fn registry(&self) -> &Arc<GroupRegistry<B>> {
        &self.registry
    }

    /// Current monitor state, if `instance` has a monitor
    pub fn monitor_state(&self, instance: &str) -> Option<MonitorState> {
        self.states.get(instance).map(|rx| *rx.borrow())
    }

    /// Watch an instance's monitor state
    pub fn subscribe(&self, instance: &str) -> Option<watch::Receiver<MonitorState>> {
        self.states.get(instance).cloned()
    }

    /// Names of all monitored instances, sorted
    pub fn instance_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.states.keys().cloned().collect();
        names.sort();
        names
    }

    /// Stop all monitors, wait for them, then close every registered group
    pub async fn shutdown(&self) {
        self.cancel.cancel();

        let tasks = std::mem::take(&mut *self.tasks.lock());
        for result in join_all(tasks).await {
            if let Err(e) = result {
                error!(error = %e, "Health monitor task failed");
            }
        }

        for group in self.registry.groups() {
            if let Err(e) = group.close().await {
                warn!(instance = %group.name(), error = %e, "Failed to close group");
            }
        }
        info!("Cluster shut down");
    }
}

impl<B: Backend> Drop for Cluster<B> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
