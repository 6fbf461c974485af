//! Deployment controller entry points

use crate::controller::{Controller, ControllerConfig, LogSync};
use crate::error::RunError;
use crate::resource_trait::ResourceClient;
use k8s_openapi::api::apps::v1::Deployment;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Watch deployments in the client's namespace and log every change until
/// `shutdown` is cancelled
pub async fn list_watch<C>(client: Arc<C>, shutdown: CancellationToken) -> Result<(), RunError>
where
    C: ResourceClient<Deployment> + ?Sized + 'static,
{
    list_watch_with(client, ControllerConfig::default(), shutdown).await
}

/// `list_watch` with explicit tuning
pub async fn list_watch_with<C>(
    client: Arc<C>,
    config: ControllerConfig,
    shutdown: CancellationToken,
) -> Result<(), RunError>
where
    C: ResourceClient<Deployment> + ?Sized + 'static,
{
    Controller::new(client, Arc::new(LogSync::<Deployment>::new()), config)
        .run(shutdown)
        .await
}
