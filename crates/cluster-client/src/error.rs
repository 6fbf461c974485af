//! Cluster client errors

use std::time::Duration;
use thiserror::Error;

/// Errors returned by resource clients and the redeploy operation
#[derive(Debug, Error)]
pub enum ClientError {
    /// Kubernetes API error that has no more specific mapping
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Object does not exist (HTTP 404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Write lost an optimistic-concurrency race (HTTP 409)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Requested resource version is too old to resume from (HTTP 410)
    #[error("Resource version expired: {0}")]
    Expired(String),

    /// Server-side or transport failure worth retrying (HTTP 5xx)
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Watch stream reported an error event
    #[error("Watch error: {0}")]
    Watch(String),

    /// Command run inside a container failed
    #[error("Exec error: {0}")]
    Exec(String),

    /// Object is missing fields an operation requires
    #[error("Invalid object: {0}")]
    InvalidObject(String),
}

impl ClientError {
    /// True when the remote object does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// True when a write was rejected because the object changed underneath it
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

/// Fatal errors from running a controller
#[derive(Debug, Error)]
pub enum RunError {
    /// The cache did not complete its initial listing in time
    #[error("Timed out after {0:?} waiting for cache to sync")]
    CacheSyncTimeout(Duration),

    /// A background task panicked
    #[error("Task panicked: {0}")]
    TaskPanicked(String),
}
