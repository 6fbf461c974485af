//! Main controller implementation.
//!
//! Wires the redeploy reconciler into a deployment watch for one namespace,
//! and exposes the one-shot redeploy used by `REDEPLOY_DEPLOYMENT`.

use crate::error::ControllerError;
use crate::reconciler::RedeployReconciler;
use cluster_client::{Controller, ControllerConfig, ResourceClient, redeploy};
use k8s_openapi::api::apps::v1::Deployment;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Redeploy controller for a single namespace
pub struct RedeployController<C: ?Sized> {
    client: Arc<C>,
    config: ControllerConfig,
}

impl<C> RedeployController<C>
where
    C: ResourceClient<Deployment> + ?Sized + 'static,
{
    pub fn new(client: Arc<C>, config: ControllerConfig) -> Self {
        Self { client, config }
    }

    /// Watch deployments and handle redeploy requests until `shutdown` fires
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), ControllerError> {
        info!(
            "Watching deployments in namespace {} with {} workers",
            self.client.namespace(),
            self.config.workers
        );
        let reconciler = Arc::new(RedeployReconciler::new(Arc::clone(&self.client)));
        Controller::new(self.client, reconciler, self.config)
            .run(shutdown)
            .await?;
        info!("Redeploy controller stopped");
        Ok(())
    }

    /// Restart one deployment immediately
    pub async fn redeploy_once(&self, name: &str) -> Result<Deployment, ControllerError> {
        Ok(redeploy(self.client.as_ref(), name).await?)
    }
}
