//! Kubernetes-backed resource clients
//!
//! One generic implementation of `ResourceClient` over `kube::Api`, plus typed
//! accessors for every kind the controllers work with.

use crate::error::ClientError;
use crate::resource_trait::ResourceClient;
use crate::types::{EventStream, ResourceList, WatchNotice};
use crds::{Prometheus, PrometheusRule, ServiceMonitor};
use futures::{StreamExt, TryStreamExt};
use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use k8s_openapi::api::core::v1::{ConfigMap, Pod};
use kube::api::{Api, DeleteParams, ListParams, PostParams, WatchEvent, WatchParams};
use kube::{Client, Resource};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use tracing::debug;

/// Maps API status codes the controller acts on to dedicated variants
pub(crate) fn classify(err: kube::Error, what: &str) -> ClientError {
    match err {
        kube::Error::Api(resp) if resp.code == 404 => ClientError::NotFound(what.to_string()),
        kube::Error::Api(resp) if resp.code == 409 => {
            ClientError::Conflict(format!("{what}: {}", resp.message))
        }
        kube::Error::Api(resp) if resp.code == 410 => {
            ClientError::Expired(format!("{what}: {}", resp.message))
        }
        kube::Error::Api(resp) if resp.code >= 500 => {
            ClientError::Unavailable(format!("{what}: {}", resp.message))
        }
        other => ClientError::Kube(other),
    }
}

/// `ResourceClient` for any namespaced kind, scoped to one namespace
#[derive(Clone)]
pub struct KubeResourceClient<K> {
    api: Api<K>,
    namespace: String,
}

impl<K> std::fmt::Debug for KubeResourceClient<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeResourceClient")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl<K> KubeResourceClient<K>
where
    K: Resource<Scope = NamespaceResourceScope>,
    K::DynamicType: Default,
{
    /// Client scoped to `namespace`
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            namespace: namespace.to_string(),
        }
    }

    /// Underlying API handle, for calls this trait does not cover
    pub fn api(&self) -> &Api<K> {
        &self.api
    }

    pub(crate) fn describe(&self, name: &str) -> String {
        format!("{}/{}", self.namespace, name)
    }
}

#[async_trait::async_trait]
impl<K> ResourceClient<K> for KubeResourceClient<K>
where
    K: Resource<Scope = NamespaceResourceScope>
        + Clone
        + Debug
        + DeserializeOwned
        + Serialize
        + Send
        + Sync
        + 'static,
    K::DynamicType: Default,
{
    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn get(&self, name: &str) -> Result<K, ClientError> {
        self.api
            .get_opt(name)
            .await
            .map_err(|e| classify(e, &self.describe(name)))?
            .ok_or_else(|| ClientError::NotFound(self.describe(name)))
    }

    async fn create(&self, obj: &K) -> Result<K, ClientError> {
        let name = obj.meta().name.clone().unwrap_or_default();
        self.api
            .create(&PostParams::default(), obj)
            .await
            .map_err(|e| classify(e, &self.describe(&name)))
    }

    async fn update(&self, obj: &K) -> Result<K, ClientError> {
        let name = obj
            .meta()
            .name
            .clone()
            .ok_or_else(|| ClientError::InvalidObject("object has no name".to_string()))?;
        self.api
            .replace(&name, &PostParams::default(), obj)
            .await
            .map_err(|e| classify(e, &self.describe(&name)))
    }

    async fn delete(&self, name: &str) -> Result<(), ClientError> {
        self.api
            .delete(name, &DeleteParams::default())
            .await
            .map_err(|e| classify(e, &self.describe(name)))?;
        Ok(())
    }

    async fn list(&self, params: &ListParams) -> Result<ResourceList<K>, ClientError> {
        let list = self
            .api
            .list(params)
            .await
            .map_err(|e| classify(e, &self.namespace))?;
        Ok(ResourceList {
            resource_version: list.metadata.resource_version,
            items: list.items,
        })
    }

    async fn watch(
        &self,
        params: &WatchParams,
        resource_version: &str,
    ) -> Result<EventStream<K>, ClientError> {
        debug!(namespace = %self.namespace, resource_version, "Opening watch");
        let namespace = self.namespace.clone();
        let stream = self
            .api
            .watch(params, resource_version)
            .await
            .map_err(|e| classify(e, &namespace))?;

        Ok(stream
            .map_err(move |e| classify(e, &namespace))
            .and_then(|event| async move {
                match event {
                    WatchEvent::Added(obj) => Ok(WatchNotice::Added(obj)),
                    WatchEvent::Modified(obj) => Ok(WatchNotice::Modified(obj)),
                    WatchEvent::Deleted(obj) => Ok(WatchNotice::Deleted(obj)),
                    WatchEvent::Bookmark(bookmark) => {
                        Ok(WatchNotice::Bookmark(bookmark.metadata.resource_version))
                    }
                    WatchEvent::Error(status) if status.code == 410 => {
                        Err(ClientError::Expired(status.message.clone()))
                    }
                    WatchEvent::Error(status) => Err(ClientError::Watch(format!(
                        "{} ({})",
                        status.message, status.code
                    ))),
                }
            })
            .boxed())
    }
}

/// Entry point for typed, namespaced access to the cluster
#[derive(Clone)]
pub struct ClusterClient {
    client: Client,
}

impl std::fmt::Debug for ClusterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterClient").finish_non_exhaustive()
    }
}

impl ClusterClient {
    /// Wrap an existing kube client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Builds a client from the in-cluster service account or the local kubeconfig
    pub async fn try_default() -> Result<Self, ClientError> {
        Ok(Self::new(Client::try_default().await?))
    }

    /// Resource client for any namespaced kind
    pub fn resource<K>(&self, namespace: &str) -> KubeResourceClient<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        K::DynamicType: Default,
    {
        KubeResourceClient::new(self.client.clone(), namespace)
    }

    /// Deployments (apps/v1) in `namespace`
    pub fn deployments(&self, namespace: &str) -> KubeResourceClient<Deployment> {
        self.resource(namespace)
    }

    /// Pods (v1) in `namespace`
    pub fn pods(&self, namespace: &str) -> KubeResourceClient<Pod> {
        self.resource(namespace)
    }

    /// ConfigMaps (v1) in `namespace`
    pub fn config_maps(&self, namespace: &str) -> KubeResourceClient<ConfigMap> {
        self.resource(namespace)
    }

    /// HorizontalPodAutoscalers (autoscaling/v2) in `namespace`
    pub fn horizontal_pod_autoscalers(
        &self,
        namespace: &str,
    ) -> KubeResourceClient<HorizontalPodAutoscaler> {
        self.resource(namespace)
    }

    /// PrometheusRules (monitoring.coreos.com/v1) in `namespace`
    pub fn prometheus_rules(&self, namespace: &str) -> KubeResourceClient<PrometheusRule> {
        self.resource(namespace)
    }

    /// Prometheus servers (monitoring.coreos.com/v1) in `namespace`
    pub fn prometheuses(&self, namespace: &str) -> KubeResourceClient<Prometheus> {
        self.resource(namespace)
    }

    /// ServiceMonitors (monitoring.coreos.com/v1) in `namespace`
    pub fn service_monitors(&self, namespace: &str) -> KubeResourceClient<ServiceMonitor> {
        self.resource(namespace)
    }
}
