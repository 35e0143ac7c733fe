//! Per-instance health monitor
//!
//! Each configured instance gets one long-running monitor task. On every tick
//! the monitor either probes the installed group (`Healthy`) or tries to build
//! a replacement (`Rebuilding`). Rebuild retries are unbounded and use the
//! same fixed interval as probing.

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::MonitorState;
use crate::config::{instance_config, ConfigError, ConfigProvider, InstanceConfig, Settings};
use crate::group::{GroupBuilder, GroupRegistry};
use crate::metrics::metrics;
use crate::pool::{Dialer, PoolTuning};

/// Health monitor for one instance
///
/// The monitor exclusively owns rebuilds of its instance, so rebuild-and-install
/// is serialized per instance.
pub struct HealthMonitor<D: Dialer> {
    instance: String,
    registry: Arc<GroupRegistry<D::Backend>>,
    builder: GroupBuilder<D>,
    provider: Arc<dyn ConfigProvider>,
    state: watch::Sender<MonitorState>,
    /// Replaced groups still draining their connections
    closing: Mutex<JoinSet<()>>,
}

impl<D: Dialer> HealthMonitor<D> {
    /// Create a monitor in the `Healthy` state
    pub fn new(
        instance: impl Into<String>,
        registry: Arc<GroupRegistry<D::Backend>>,
        builder: GroupBuilder<D>,
        provider: Arc<dyn ConfigProvider>,
    ) -> Self {
        let (state, _) = watch::channel(MonitorState::Healthy);
        Self {
            instance: instance.into(),
            registry,
            builder,
            provider,
            state,
            closing: Mutex::new(JoinSet::new()),
        }
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    pub fn state(&self) -> MonitorState {
        *self.state.borrow()
    }

    /// Watch state transitions
    pub fn subscribe(&self) -> watch::Receiver<MonitorState> {
        self.state.subscribe()
    }

    /// Run one iteration of the state machine and return the new state
    pub async fn tick(&self) -> MonitorState {
        self.reap_closed();
        let current = self.state();
        let next = match current {
            MonitorState::Healthy => self.check().await,
            MonitorState::Rebuilding => self.rebuild().await,
        };

        if next != current {
            info!(instance = %self.instance, from = %current, to = %next, "Monitor state changed");
        }
        self.state.send_replace(next);
        metrics().set_monitor_state(&self.instance, next);
        next
    }

    /// Probe the installed group
    ///
    /// A missing or closed group counts as a failed probe.
    async fn check(&self) -> MonitorState {
        let Some(group) = self.registry.get(&self.instance) else {
            warn!(instance = %self.instance, "No group registered");
            metrics().record_probe(&self.instance, "missing");
            return MonitorState::Rebuilding;
        };

        match group.probe().await {
            Ok(()) => {
                debug!(instance = %self.instance, "Probe ok");
                metrics().record_probe(&self.instance, "success");
                MonitorState::Healthy
            }
            Err(e) => {
                warn!(instance = %self.instance, error = %e, "Probe failed");
                metrics().record_probe(&self.instance, "failure");
                MonitorState::Rebuilding
            }
        }
    }

    /// Build a fresh group from current configuration and install it
    async fn rebuild(&self) -> MonitorState {
        let (instance, tuning) = match self.load_config() {
            Ok(config) => config,
            Err(e) => {
                error!(instance = %self.instance, error = %e, "Instance config unusable, retrying next tick");
                metrics().record_rebuild(&self.instance, "config_error");
                return MonitorState::Rebuilding;
            }
        };

        let group = match self.builder.build(&self.instance, &instance, &tuning).await {
            Ok(group) => group,
            Err(e) => {
                error!(instance = %self.instance, error = %e, "Group rebuild failed, retrying next tick");
                metrics().record_rebuild(&self.instance, "failure");
                return MonitorState::Rebuilding;
            }
        };

        let replicas = group.replicas().len();
        if let Some(previous) = self.registry.put(self.instance.clone(), group) {
            // Closing waits for borrowed connections; keep it off the tick path
            let instance = self.instance.clone();
            self.closing.lock().spawn(async move {
                if let Err(e) = previous.close().await {
                    warn!(instance = %instance, error = %e, "Failed to close replaced group");
                }
            });
        }

        info!(instance = %self.instance, replicas = replicas, "Group rebuilt");
        metrics().record_rebuild(&self.instance, "success");
        metrics().set_groups(self.registry.len());
        MonitorState::Healthy
    }

    /// Drop finished close tasks without waiting on the rest
    fn reap_closed(&self) {
        let mut closing = self.closing.lock();
        while let Some(Some(result)) = closing.join_next().now_or_never() {
            if let Err(e) = result {
                error!(instance = %self.instance, error = %e, "Close task failed");
            }
        }
    }

    /// Wait for every replaced group to finish closing
    async fn drain_closing(&self) {
        let mut closing = std::mem::take(&mut *self.closing.lock());
        while let Some(result) = closing.join_next().await {
            if let Err(e) = result {
                error!(instance = %self.instance, error = %e, "Close task failed");
            }
        }
    }

    /// Re-read this instance's connection strings and the shared tuning
    fn load_config(&self) -> Result<(InstanceConfig, PoolTuning), ConfigError> {
        let doc = self.provider.load()?;
        let instance = instance_config(&doc, &self.instance)?;
        let settings = Settings::from_table(&doc)?;
        Ok((
            instance,
            PoolTuning::from_settings(&settings.tuning, &settings.sql_log),
        ))
    }

    /// Tick every `interval` until `cancel` fires
    ///
    /// The first tick happens one interval after start.
    pub async fn run(self, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            instance = %self.instance,
            interval_ms = interval.as_millis() as u64,
            "Health monitor started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.drain_closing().await;
                    info!(instance = %self.instance, "Health monitor stopped");
                    break;
                }
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }
    }

    /// Spawn [`run`](Self::run) as a tokio task
    pub fn spawn(self, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(interval, cancel))
    }
}
