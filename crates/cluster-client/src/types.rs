//! Shared value types: object keys, change events and watch notices

use crate::error::ClientError;
use futures::stream::BoxStream;
use kube::Resource;
use std::fmt;
use std::sync::Arc;

/// Identity of a namespaced object within one resource kind
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey {
    /// Empty for cluster-scoped objects
    pub namespace: String,
    pub name: String,
}

impl ResourceKey {
    /// Key for `name` in `namespace`
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Parses the `namespace/name` form; a bare `name` has an empty namespace.
    ///
    /// Returns `None` for empty names or more than one separator.
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.split('/');
        let first = parts.next()?;
        match (parts.next(), parts.next()) {
            (None, _) if !first.is_empty() => Some(Self::new("", first)),
            (Some(name), None) if !first.is_empty() && !name.is_empty() => Some(Self::new(first, name)),
            _ => None,
        }
    }

    /// Key for `obj`, using `fallback_namespace` when the object carries none
    pub fn from_resource<K: Resource>(obj: &K, fallback_namespace: &str) -> Option<Self> {
        let meta = obj.meta();
        let name = meta.name.as_deref()?;
        let namespace = meta.namespace.as_deref().unwrap_or(fallback_namespace);
        Some(Self::new(namespace, name))
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}/{}", self.namespace, self.name)
        }
    }
}

/// What happened to an object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
}

/// One observed change, as delivered to the cache and the queue
#[derive(Debug, Clone)]
pub struct ChangeEvent<K> {
    pub kind: ChangeKind,
    pub key: ResourceKey,
    pub object: Arc<K>,
}

/// A single notification from a watch stream
#[derive(Debug, Clone, PartialEq)]
pub enum WatchNotice<K> {
    Added(K),
    Modified(K),
    Deleted(K),
    /// Progress marker carrying only a resource version
    Bookmark(String),
}

impl<K: Resource> WatchNotice<K> {
    /// Resource version this notice advances the stream to
    pub fn resource_version(&self) -> Option<&str> {
        match self {
            Self::Added(obj) | Self::Modified(obj) | Self::Deleted(obj) => {
                obj.meta().resource_version.as_deref()
            }
            Self::Bookmark(rv) => Some(rv),
        }
    }
}

/// Result of a list call
#[derive(Debug, Clone)]
pub struct ResourceList<K> {
    pub items: Vec<K>,
    /// Version to start a watch from so no change after the listing is missed
    pub resource_version: Option<String>,
}

/// Boxed watch stream; ends when the server closes the connection
pub type EventStream<K> = BoxStream<'static, Result<WatchNotice<K>, ClientError>>;
