//! Test utilities for controller and redeploy tests

use crate::error::ClientError;
use crate::types::ResourceKey;
use crate::controller::Reconcile;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::HostAlias;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Helper to create a test Deployment with a minimal pod template
pub fn create_test_deployment(name: &str, namespace: &str) -> Deployment {
    let manifest = format!(
        r#"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: {name}
  namespace: {namespace}
spec:
  selector:
    matchLabels:
      app: {name}
  template:
    metadata:
      labels:
        app: {name}
    spec:
      containers:
        - name: app
          image: nginx:1.27
"#
    );
    serde_yaml::from_str(&manifest).unwrap()
}

/// Helper to create a test Deployment with the given host aliases
pub fn create_test_deployment_with_aliases(
    name: &str,
    namespace: &str,
    aliases: Vec<HostAlias>,
) -> Deployment {
    let mut deployment = create_test_deployment(name, namespace);
    pod_spec_mut(&mut deployment).host_aliases = Some(aliases);
    deployment
}

pub fn host_alias(ip: &str, hostnames: &[&str]) -> HostAlias {
    HostAlias {
        ip: ip.to_string(),
        hostnames: Some(hostnames.iter().map(|h| (*h).to_string()).collect()),
    }
}

/// Host aliases of a deployment's pod template
pub fn host_aliases(deployment: &Deployment) -> Vec<HostAlias> {
    deployment
        .spec
        .as_ref()
        .and_then(|spec| spec.template.spec.as_ref())
        .and_then(|pod| pod.host_aliases.clone())
        .unwrap_or_default()
}

fn pod_spec_mut(deployment: &mut Deployment) -> &mut k8s_openapi::api::core::v1::PodSpec {
    deployment
        .spec
        .as_mut()
        .and_then(|spec| spec.template.spec.as_mut())
        .unwrap()
}

/// Reconciler that records every call and fails on demand
#[derive(Default)]
pub struct RecordingReconciler {
    /// Number of failures still to return, per key name
    failures: Mutex<HashMap<String, u32>>,
    /// Keys whose every attempt fails
    always_fail: Mutex<Vec<String>>,
    reconciled: Mutex<Vec<ResourceKey>>,
    deleted: Mutex<Vec<ResourceKey>>,
    /// Artificial time spent in each reconcile
    delay: Option<Duration>,
    finished: Mutex<Vec<ResourceKey>>,
}

impl RecordingReconciler {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn fail_times(&self, name: &str, times: u32) {
        self.failures.lock().insert(name.to_string(), times);
    }

    pub fn fail_always(&self, name: &str) {
        self.always_fail.lock().push(name.to_string());
    }

    /// Reconcile attempts for `name`, including failed ones
    pub fn attempts(&self, name: &str) -> usize {
        self.reconciled
            .lock()
            .iter()
            .filter(|key| key.name == name)
            .count()
    }

    pub fn finished(&self, name: &str) -> usize {
        self.finished
            .lock()
            .iter()
            .filter(|key| key.name == name)
            .count()
    }

    pub fn deleted(&self) -> Vec<ResourceKey> {
        self.deleted.lock().clone()
    }
}

#[async_trait::async_trait]
impl<K: Send + Sync + 'static> Reconcile<K> for RecordingReconciler {
    type Error = ClientError;

    async fn reconcile(&self, key: &ResourceKey, _obj: Arc<K>) -> Result<(), ClientError> {
        self.reconciled.lock().push(key.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.finished.lock().push(key.clone());

        if self.always_fail.lock().contains(&key.name) {
            return Err(ClientError::Unavailable(format!("{key} always fails")));
        }
        let mut failures = self.failures.lock();
        if let Some(remaining) = failures.get_mut(&key.name) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ClientError::Unavailable(format!("{key} failed")));
            }
        }
        Ok(())
    }

    async fn deleted(&self, key: &ResourceKey) -> Result<(), ClientError> {
        self.deleted.lock().push(key.clone());
        Ok(())
    }
}

/// Poll `condition` every few milliseconds until it holds or `timeout` passes
pub async fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
