//! Read path: resolve an instance name and role to a live backend handle
//!
//! The router only reads the registry. It never triggers a rebuild; between a
//! primary failing and the monitor's next successful rebuild it keeps handing
//! out the old handle.

use std::str::FromStr;
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;

use crate::group::GroupRegistry;
use crate::pool::Backend;

/// Which side of a group a caller wants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(from = "String")]
pub enum Role {
    /// Writable primary (master)
    #[default]
    Primary,
    /// Read replica (slave), falling back to the primary
    Replica,
}

impl Role {
    /// Parse a role hint; anything that is not a replica name is the primary
    pub fn parse(hint: &str) -> Self {
        let hint = hint.trim();
        if hint.eq_ignore_ascii_case("slave") || hint.eq_ignore_ascii_case("replica") {
            Self::Replica
        } else {
            Self::Primary
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "master",
            Self::Replica => "slave",
        }
    }
}

impl FromStr for Role {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl From<&str> for Role {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

impl From<String> for Role {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<Option<&str>> for Role {
    fn from(hint: Option<&str>) -> Self {
        hint.map(Self::parse).unwrap_or_default()
    }
}

/// No group is registered under the requested name
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Instance not found: {instance}")]
pub struct NotFound {
    pub instance: String,
}

/// Routing facade over the group registry
pub struct Router<B: Backend> {
    registry: Arc<GroupRegistry<B>>,
}

impl<B: Backend> Clone for Router<B> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
        }
    }
}

impl<B: Backend> Router<B> {
    pub fn new(registry: Arc<GroupRegistry<B>>) -> Self {
        Self { registry }
    }

    /// Resolve a handle for `instance`
    ///
    /// # Behavior
    /// - `Role::Primary`: the group's primary
    /// - `Role::Replica`: the next replica in round-robin order, or the
    ///   primary when the group has no replicas
    pub fn resolve(&self, instance: &str, role: impl Into<Role>) -> Result<Arc<B>, NotFound> {
        let group = self.registry.get(instance).ok_or_else(|| NotFound {
            instance: instance.to_string(),
        })?;
        Ok(group.select(role.into()))
    }

    /// Shorthand for `resolve(instance, Role::Primary)`
    pub fn primary(&self, instance: &str) -> Result<Arc<B>, NotFound> {
        self.resolve(instance, Role::Primary)
    }

    /// Shorthand for `resolve(instance, Role::Replica)`
    pub fn replica(&self, instance: &str) -> Result<Arc<B>, NotFound> {
        self.resolve(instance, Role::Replica)
    }
}
