//! Annotation-driven redeploy reconciler.
//!
//! A Deployment asks for a restart by setting `redeploy.local/requested` to
//! any new token. The reconciler bumps the host-alias marker and records the
//! token in `redeploy.local/handled` in the same write, so its own update
//! event finds nothing left to do.

use crate::error::ControllerError;
use chrono::Utc;
use cluster_client::{Reconcile, ResourceClient, ResourceKey, apply_redeploy};
use k8s_openapi::api::apps::v1::Deployment;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Token of the restart being asked for
pub const REQUESTED_ANNOTATION: &str = "redeploy.local/requested";
/// Token of the last restart carried out
pub const HANDLED_ANNOTATION: &str = "redeploy.local/handled";
/// RFC 3339 time of the last restart carried out
pub const LAST_REDEPLOYED_ANNOTATION: &str = "redeploy.local/last-redeployed-at";

/// Requested token that has not been handled yet
pub fn pending_request(deployment: &Deployment) -> Option<&str> {
    let annotations = deployment.metadata.annotations.as_ref()?;
    let requested = annotations.get(REQUESTED_ANNOTATION)?;
    (annotations.get(HANDLED_ANNOTATION) != Some(requested)).then_some(requested.as_str())
}

/// Reconciler for Deployments carrying a redeploy request
pub struct RedeployReconciler<C: ?Sized> {
    client: Arc<C>,
}

impl<C: ?Sized> RedeployReconciler<C> {
    pub fn new(client: Arc<C>) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl<C> Reconcile<Deployment> for RedeployReconciler<C>
where
    C: ResourceClient<Deployment> + ?Sized,
{
    type Error = ControllerError;

    async fn reconcile(&self, key: &ResourceKey, obj: Arc<Deployment>) -> Result<(), ControllerError> {
        if pending_request(&obj).is_none() {
            debug!("No pending redeploy for deployment {}", key);
            return Ok(());
        }

        // The cached copy may be stale; decide on the live object
        let mut live = match self.client.get(&key.name).await {
            Ok(deployment) => deployment,
            Err(e) if e.is_not_found() => {
                debug!("Deployment {} is gone, skipping redeploy", key);
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        let Some(token) = pending_request(&live).map(str::to_string) else {
            debug!("Redeploy for deployment {} already handled", key);
            return Ok(());
        };

        let generation = apply_redeploy(&mut live)?;
        let annotations = live.metadata.annotations.get_or_insert_with(BTreeMap::new);
        annotations.insert(HANDLED_ANNOTATION.to_string(), token.clone());
        annotations.insert(LAST_REDEPLOYED_ANNOTATION.to_string(), Utc::now().to_rfc3339());
        self.client.update(&live).await?;

        info!(
            "Redeployed deployment {} for request {} (generation {})",
            key, token, generation
        );
        Ok(())
    }
}
