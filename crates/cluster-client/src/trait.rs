//! ResourceClient trait for mocking
//!
//! Abstracts namespaced access to one resource kind so the controller and the
//! redeploy operation can run against the API server or an in-memory mock.

use crate::error::ClientError;
use crate::types::{EventStream, ResourceList};
use kube::api::{ListParams, WatchParams};

/// Namespaced CRUD, list and watch for a single resource kind
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait ResourceClient<K>: Send + Sync
where
    K: Clone + Send + Sync + 'static,
{
    /// Namespace every request is scoped to
    fn namespace(&self) -> &str;

    /// Fetch one object; a missing object is `ClientError::NotFound`
    async fn get(&self, name: &str) -> Result<K, ClientError>;

    /// Create a new object; an existing name is `ClientError::Conflict`
    async fn create(&self, obj: &K) -> Result<K, ClientError>;

    /// Replace an object; a stale resource version is `ClientError::Conflict`
    async fn update(&self, obj: &K) -> Result<K, ClientError>;

    /// Delete an object by name
    async fn delete(&self, name: &str) -> Result<(), ClientError>;

    /// List every object, with the version to start a watch from
    async fn list(&self, params: &ListParams) -> Result<ResourceList<K>, ClientError>;

    /// Open a watch starting after `resource_version`
    ///
    /// An expired version is reported as `ClientError::Expired`, either from
    /// this call or as an item on the returned stream.
    async fn watch(
        &self,
        params: &WatchParams,
        resource_version: &str,
    ) -> Result<EventStream<K>, ClientError>;
}
