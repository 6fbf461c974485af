//! Cluster Client
//!
//! Typed, namespaced access to Kubernetes resources and a small watch-driven
//! controller runtime built on top of it.
//!
//! # Example
//!
//! ```no_run
//! use cluster_client::{ClusterClient, list_watch, redeploy};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = ClusterClient::try_default().await?;
//! let deployments = client.deployments("default");
//!
//! // Force a rollout of one deployment
//! redeploy(&deployments, "api").await?;
//!
//! // Log every deployment change until cancelled
//! let shutdown = CancellationToken::new();
//! list_watch(Arc::new(deployments), shutdown).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Resource clients**: one `ResourceClient` trait, implemented over `kube::Api`
//!   for deployments, pods, config maps, HPAs and the monitoring kinds
//! - **Controller**: list+watch feed, indexed cache, deduplicating rate-limited
//!   work queue and a worker pool with bounded retries
//! - **Redeploy**: rollout trigger through a host-alias generation marker
//! - **Mocking**: `MockResourceClient` behind the `test-util` feature

pub mod backoff;
pub mod client;
pub mod controller;
pub mod deployment;
pub mod error;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;
pub mod pod;
pub mod redeploy;
#[path = "trait.rs"]
pub mod resource_trait;
#[cfg(test)]
mod test_utils;
pub mod types;

pub use client::{ClusterClient, KubeResourceClient};
pub use controller::{Controller, ControllerConfig, LogSync, Reconcile, Store, WorkQueue};
pub use deployment::{list_watch, list_watch_with};
pub use error::{ClientError, RunError};
#[cfg(any(test, feature = "test-util"))]
pub use mock::MockResourceClient;
pub use pod::copy_command;
pub use redeploy::{apply_redeploy, bump_marker, redeploy};
pub use resource_trait::ResourceClient;
pub use types::{ChangeEvent, ChangeKind, EventStream, ResourceKey, ResourceList, WatchNotice};
