//! Connection group: one primary backend plus its read replicas

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::pool::{Backend, ConnectionError, ProbeError};
use crate::router::Role;

/// The runtime object bundling one instance's primary and replicas
///
/// Never mutated after construction; configuration changes take effect by
/// building a new group and replacing this one in the registry.
pub struct ConnectionGroup<B: Backend> {
    name: String,
    primary: Arc<B>,
    replicas: Vec<Arc<B>>,
    /// Round-robin counter for replica selection
    counter: AtomicUsize,
    closed: AtomicBool,
}

impl<B: Backend> ConnectionGroup<B> {
    pub fn new(name: impl Into<String>, primary: B, replicas: Vec<B>) -> Self {
        Self {
            name: name.into(),
            primary: Arc::new(primary),
            replicas: replicas.into_iter().map(Arc::new).collect(),
            counter: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Instance name this group serves
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn primary(&self) -> Arc<B> {
        self.primary.clone()
    }

    /// Next replica in round-robin order, or the primary when there are none
    pub fn replica(&self) -> Arc<B> {
        if !self.has_replicas() {
            return self.primary.clone();
        }
        let idx = self.counter.fetch_add(1, Ordering::Relaxed) % self.replicas.len();
        self.replicas[idx].clone()
    }

    pub fn select(&self, role: Role) -> Arc<B> {
        match role {
            Role::Primary => self.primary(),
            Role::Replica => self.replica(),
        }
    }

    pub fn replicas(&self) -> &[Arc<B>] {
        &self.replicas
    }

    pub fn has_replicas(&self) -> bool {
        !self.replicas.is_empty()
    }

    /// Probe the primary
    ///
    /// Replicas are not probed; a closed group always fails.
    pub async fn probe(&self) -> Result<(), ProbeError> {
        if self.is_closed() {
            return Err(ProbeError::Closed);
        }
        self.primary.ping().await
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Close every backend of the group
    ///
    /// Only the first call does anything. All backends are closed even if
    /// some fail; the first error is returned.
    pub async fn close(&self) -> Result<(), ConnectionError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            debug!(instance = %self.name, "Group already closed");
            return Ok(());
        }

        let backends = std::iter::once(&self.primary).chain(self.replicas.iter());
        let results = join_all(backends.map(|b| b.close())).await;

        let mut first_err = None;
        for result in results {
            if let Err(e) = result {
                warn!(instance = %self.name, error = %e, "Failed to close backend");
                first_err.get_or_insert(e);
            }
        }

        info!(
            instance = %self.name,
            replicas = self.replicas.len(),
            "Group closed"
        );
        first_err.map_or(Ok(()), Err)
    }
}

impl<B: Backend> fmt::Debug for ConnectionGroup<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionGroup")
            .field("name", &self.name)
            .field("replicas", &self.replicas.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}
