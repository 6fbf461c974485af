//! Redeploy Controller
//!
//! Restarts Deployments on request. A restart is forced by bumping a synthetic
//! `deployment-<N>.redeploy.local` host alias in the pod template, which rolls
//! the pods without touching anything the workload depends on.
//!
//! Runs either as a long-lived controller reacting to the
//! `redeploy.local/requested` annotation, or, when `REDEPLOY_DEPLOYMENT` is
//! set, as a one-shot restart of that deployment.

mod controller;
mod error;
mod reconciler;

use crate::controller::RedeployController;
use crate::error::ControllerError;
use cluster_client::{ClusterClient, ControllerConfig};
use std::env;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Settings read from the environment
#[derive(Debug, Clone, PartialEq)]
struct Config {
    namespace: String,
    workers: usize,
    max_retries: u32,
    cache_sync_timeout: Duration,
    /// Restart this deployment and exit instead of watching
    one_shot: Option<String>,
}

impl Config {
    fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ControllerError> {
        Ok(Self {
            namespace: lookup("WATCH_NAMESPACE").unwrap_or_else(|| "default".to_string()),
            workers: parse_var(&lookup, "CONTROLLER_WORKERS", 2)?,
            max_retries: parse_var(&lookup, "MAX_RETRIES", 5)?,
            cache_sync_timeout: Duration::from_secs(parse_var(
                &lookup,
                "CACHE_SYNC_TIMEOUT_SECS",
                60,
            )?),
            one_shot: lookup("REDEPLOY_DEPLOYMENT").filter(|name| !name.is_empty()),
        })
        .and_then(Self::validate)
    }

    fn validate(self) -> Result<Self, ControllerError> {
        if self.workers == 0 {
            return Err(ControllerError::InvalidConfig(
                "CONTROLLER_WORKERS must be at least 1".to_string(),
            ));
        }
        if self.cache_sync_timeout.is_zero() {
            return Err(ControllerError::InvalidConfig(
                "CACHE_SYNC_TIMEOUT_SECS must be at least 1".to_string(),
            ));
        }
        Ok(self)
    }

    fn controller_config(&self) -> ControllerConfig {
        ControllerConfig::default()
            .workers(self.workers)
            .max_retries(self.max_retries)
            .cache_sync_timeout(self.cache_sync_timeout)
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
) -> Result<T, ControllerError> {
    match lookup(name) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| {
            ControllerError::InvalidConfig(format!("{name} has invalid value {value:?}"))
        }),
    }
}

/// Resolves on Ctrl-C or SIGTERM
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    result = tokio::signal::ctrl_c() => {
                        if let Err(e) = result {
                            error!("Failed to listen for Ctrl-C: {}", e);
                        }
                    }
                    _ = terminate.recv() => {}
                }
                return;
            }
            Err(e) => error!("Failed to listen for SIGTERM: {}", e),
        }
    }
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting Redeploy Controller");

    let config = Config::from_env()?;
    info!("Configuration:");
    info!("  Namespace: {}", config.namespace);
    info!("  Workers: {}", config.workers);
    info!("  Max retries: {}", config.max_retries);
    info!("  Cache sync timeout: {:?}", config.cache_sync_timeout);

    let client = ClusterClient::try_default().await?;
    let deployments = Arc::new(client.deployments(&config.namespace));
    let controller = RedeployController::new(deployments, config.controller_config());

    if let Some(name) = &config.one_shot {
        info!("One-shot redeploy of deployment {}/{}", config.namespace, name);
        controller.redeploy_once(name).await?;
        return Ok(());
    }

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            info!("Shutdown signal received");
            shutdown.cancel();
        }
    });

    controller.run(shutdown).await
}
