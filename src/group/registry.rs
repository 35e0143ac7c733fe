//! Registry of the current connection group per instance
//!
//! The registry is the only shared mutable structure in the crate. Readers
//! clone an `Arc` out of a DashMap shard; writers replace whole groups, so no
//! reader ever observes a half-built group.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use super::ConnectionGroup;
use crate::pool::Backend;

/// Concurrency-safe map from instance name to its current group
pub struct GroupRegistry<B: Backend> {
    groups: DashMap<String, Arc<ConnectionGroup<B>>>,
}

impl<B: Backend> Default for GroupRegistry<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> GroupRegistry<B> {
    pub fn new() -> Self {
        Self {
            groups: DashMap::new(),
        }
    }

    /// Get the current group for an instance
    pub fn get(&self, name: &str) -> Option<Arc<ConnectionGroup<B>>> {
        self.groups.get(name).map(|r| r.value().clone())
    }

    /// Install or replace the group for an instance
    ///
    /// Returns the replaced group. The registry does not close it; the caller
    /// decides when its resources are released.
    pub fn put(
        &self,
        name: impl Into<String>,
        group: impl Into<Arc<ConnectionGroup<B>>>,
    ) -> Option<Arc<ConnectionGroup<B>>> {
        let name = name.into();
        let previous = self.groups.insert(name.clone(), group.into());
        debug!(instance = %name, replaced = previous.is_some(), "Group installed");
        previous
    }

    pub fn contains(&self, name: &str) -> bool {
        self.groups.contains_key(name)
    }

    /// Get the number of registered instances
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Get list of all instance names
    pub fn names(&self) -> Vec<String> {
        self.groups.iter().map(|r| r.key().clone()).collect()
    }

    /// Snapshot of every registered group
    pub fn groups(&self) -> Vec<Arc<ConnectionGroup<B>>> {
        self.groups.iter().map(|r| r.value().clone()).collect()
    }
}
