//! Mock ResourceClient for unit testing
//!
//! Keeps objects in memory with a monotonically increasing resource version,
//! records every change in an event log that watches replay from, and can be
//! told to fail lists or updates, drop open watches, or expire old versions.

use crate::error::ClientError;
use crate::resource_trait::ResourceClient;
use crate::types::{EventStream, ResourceList, WatchNotice};
use futures::StreamExt;
use kube::Resource;
use kube::api::{ListParams, WatchParams};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc;

type WatchSender<K> = mpsc::UnboundedSender<Result<WatchNotice<K>, ClientError>>;

struct MockState<K> {
    objects: BTreeMap<String, K>,
    resource_version: u64,
    /// Every change, tagged with the version it produced
    events: Vec<(u64, WatchNotice<K>)>,
    /// Watches may not resume from a version older than this
    compacted: u64,
    watchers: Vec<WatchSender<K>>,
    fail_lists: u32,
    fail_updates: u32,
    list_calls: usize,
    watch_calls: usize,
    update_calls: usize,
}

/// In-memory `ResourceClient` for one namespace
#[derive(Clone)]
pub struct MockResourceClient<K> {
    namespace: String,
    state: Arc<Mutex<MockState<K>>>,
}

impl<K> std::fmt::Debug for MockResourceClient<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockResourceClient")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl<K> MockResourceClient<K>
where
    K: Resource + Clone + Send + Sync + 'static,
{
    /// Create an empty mock client
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            state: Arc::new(Mutex::new(MockState {
                objects: BTreeMap::new(),
                resource_version: 0,
                events: Vec::new(),
                compacted: 0,
                watchers: Vec::new(),
                fail_lists: 0,
                fail_updates: 0,
                list_calls: 0,
                watch_calls: 0,
                update_calls: 0,
            })),
        }
    }

    /// Create or overwrite an object without a version check (for test setup)
    ///
    /// Open watches see ADDED or MODIFIED accordingly.
    pub fn insert(&self, obj: K) -> K {
        let mut state = self.state.lock();
        let name = obj.meta().name.clone().unwrap_or_default();
        if state.objects.contains_key(&name) {
            state.store(obj, WatchNotice::Modified)
        } else {
            state.store(obj, WatchNotice::Added)
        }
    }

    /// Delete an object if present (for test setup)
    pub fn remove(&self, name: &str) -> Option<K> {
        self.state.lock().remove(name)
    }

    /// Current copy of an object
    pub fn object(&self, name: &str) -> Option<K> {
        self.state.lock().objects.get(name).cloned()
    }

    /// Latest resource version handed out
    pub fn resource_version(&self) -> u64 {
        self.state.lock().resource_version
    }

    /// Fail the next `n` list calls with `ClientError::Unavailable`
    pub fn fail_lists(&self, n: u32) {
        self.state.lock().fail_lists = n;
    }

    /// Fail the next `n` update calls with `ClientError::Unavailable`
    pub fn fail_updates(&self, n: u32) {
        self.state.lock().fail_updates = n;
    }

    /// End every open watch stream, as a server-side timeout would
    pub fn close_watches(&self) {
        self.state.lock().watchers.clear();
    }

    /// Forget history up to now: open watches receive an expiry error and
    /// resuming from any earlier version fails until the next list
    pub fn expire_versions(&self) {
        let mut state = self.state.lock();
        state.compacted = state.resource_version;
        state.events.clear();
        for watcher in state.watchers.drain(..) {
            let _ = watcher.send(Err(ClientError::Expired(
                "too old resource version".to_string(),
            )));
        }
    }

    /// Number of `list` calls so far
    pub fn list_calls(&self) -> usize {
        self.state.lock().list_calls
    }

    /// Number of `watch` calls so far
    pub fn watch_calls(&self) -> usize {
        self.state.lock().watch_calls
    }

    /// Number of `update` calls so far
    pub fn update_calls(&self) -> usize {
        self.state.lock().update_calls
    }
}

impl<K> MockState<K>
where
    K: Resource + Clone,
{
    /// Stamps a new version on `obj`, stores it and fans the change out
    fn store(&mut self, mut obj: K, notice: fn(K) -> WatchNotice<K>) -> K {
        self.resource_version += 1;
        let version = self.resource_version;
        obj.meta_mut().resource_version = Some(version.to_string());
        let name = obj.meta().name.clone().unwrap_or_default();
        self.objects.insert(name, obj.clone());
        self.publish(version, notice(obj.clone()));
        obj
    }

    fn remove(&mut self, name: &str) -> Option<K> {
        let mut obj = self.objects.remove(name)?;
        self.resource_version += 1;
        let version = self.resource_version;
        obj.meta_mut().resource_version = Some(version.to_string());
        self.publish(version, WatchNotice::Deleted(obj.clone()));
        Some(obj)
    }

    fn publish(&mut self, version: u64, notice: WatchNotice<K>) {
        self.watchers
            .retain(|watcher| watcher.send(Ok(notice.clone())).is_ok());
        self.events.push((version, notice));
    }
}

fn unavailable(op: &str) -> ClientError {
    ClientError::Unavailable(format!("injected {op} failure"))
}

#[async_trait::async_trait]
impl<K> ResourceClient<K> for MockResourceClient<K>
where
    K: Resource + Clone + Send + Sync + 'static,
{
    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn get(&self, name: &str) -> Result<K, ClientError> {
        self.object(name)
            .ok_or_else(|| ClientError::NotFound(format!("{}/{}", self.namespace, name)))
    }

    async fn create(&self, obj: &K) -> Result<K, ClientError> {
        let mut state = self.state.lock();
        let name = obj
            .meta()
            .name
            .clone()
            .ok_or_else(|| ClientError::InvalidObject("object has no name".to_string()))?;
        if state.objects.contains_key(&name) {
            return Err(ClientError::Conflict(format!(
                "{}/{} already exists",
                self.namespace, name
            )));
        }
        Ok(state.store(obj.clone(), WatchNotice::Added))
    }

    async fn update(&self, obj: &K) -> Result<K, ClientError> {
        let mut state = self.state.lock();
        state.update_calls += 1;
        if state.fail_updates > 0 {
            state.fail_updates -= 1;
            return Err(unavailable("update"));
        }
        let name = obj
            .meta()
            .name
            .clone()
            .ok_or_else(|| ClientError::InvalidObject("object has no name".to_string()))?;
        let Some(current) = state.objects.get(&name) else {
            return Err(ClientError::NotFound(format!("{}/{}", self.namespace, name)));
        };
        let expected = obj.meta().resource_version.as_deref();
        if expected.is_some() && expected != current.meta().resource_version.as_deref() {
            return Err(ClientError::Conflict(format!(
                "{}/{}: the object has been modified",
                self.namespace, name
            )));
        }
        Ok(state.store(obj.clone(), WatchNotice::Modified))
    }

    async fn delete(&self, name: &str) -> Result<(), ClientError> {
        self.state
            .lock()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| ClientError::NotFound(format!("{}/{}", self.namespace, name)))
    }

    async fn list(&self, _params: &ListParams) -> Result<ResourceList<K>, ClientError> {
        let mut state = self.state.lock();
        state.list_calls += 1;
        if state.fail_lists > 0 {
            state.fail_lists -= 1;
            return Err(unavailable("list"));
        }
        Ok(ResourceList {
            items: state.objects.values().cloned().collect(),
            resource_version: Some(state.resource_version.to_string()),
        })
    }

    async fn watch(
        &self,
        _params: &WatchParams,
        resource_version: &str,
    ) -> Result<EventStream<K>, ClientError> {
        let mut state = self.state.lock();
        state.watch_calls += 1;
        let from: u64 = resource_version.parse().unwrap_or(0);
        if from < state.compacted {
            return Err(ClientError::Expired(format!(
                "resource version {resource_version} is too old"
            )));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        for (version, notice) in &state.events {
            if *version > from {
                let _ = tx.send(Ok(notice.clone()));
            }
        }
        state.watchers.push(tx);

        Ok(futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })
        .boxed())
    }
}
