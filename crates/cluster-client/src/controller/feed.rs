//! Change feed: list, then watch, reconnecting forever
//!
//! Turns a `ResourceClient` into an endless, ordered sequence of cache events.
//! Each (re)list is framed by `Init` and `InitDone` so the cache can drop
//! objects deleted while no watch was open.

use crate::backoff::ExponentialBackoff;
use crate::error::ClientError;
use crate::resource_trait::ResourceClient;
use crate::types::{ChangeEvent, ChangeKind, EventStream, ResourceKey, WatchNotice};
use futures::StreamExt;
use kube::Resource;
use kube::api::{ListParams, WatchParams};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// One step of the feed
#[derive(Debug, Clone)]
pub enum FeedEvent<K> {
    /// A listing is about to be replayed
    Init,
    /// An object changed (or was listed, as `Added`)
    Change(ChangeEvent<K>),
    /// The listing has been replayed; `keys` is everything it contained
    InitDone { keys: HashSet<ResourceKey> },
}

enum State<K> {
    /// Needs a full list
    Empty,
    /// Emitting the listed objects one by one
    Replaying {
        items: std::vec::IntoIter<K>,
        keys: HashSet<ResourceKey>,
        resource_version: String,
    },
    /// Needs a watch from `resource_version`
    Connect { resource_version: String },
    Watching {
        resource_version: String,
        stream: EventStream<K>,
    },
}

/// List+watch state machine over one resource client
///
/// `next` is not cancel safe: dropping it mid-call loses the position and the
/// following call relists.
pub struct ChangeFeed<K, C: ?Sized> {
    client: Arc<C>,
    list_params: ListParams,
    watch_params: WatchParams,
    backoff: ExponentialBackoff,
    state: State<K>,
}

impl<K, C: ?Sized> std::fmt::Debug for ChangeFeed<K, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &self.state {
            State::Empty => "empty",
            State::Replaying { .. } => "replaying",
            State::Connect { .. } => "connect",
            State::Watching { .. } => "watching",
        };
        f.debug_struct("ChangeFeed").field("state", &state).finish_non_exhaustive()
    }
}

impl<K, C> ChangeFeed<K, C>
where
    K: Resource + Clone + Send + Sync + 'static,
    C: ResourceClient<K> + ?Sized,
{
    /// Create a feed that starts with a full list
    pub fn new(
        client: Arc<C>,
        list_params: ListParams,
        watch_params: WatchParams,
        backoff: ExponentialBackoff,
    ) -> Self {
        Self {
            client,
            list_params,
            watch_params,
            backoff,
            state: State::Empty,
        }
    }

    /// Next event; retries internally and never ends
    pub async fn next(&mut self) -> FeedEvent<K> {
        loop {
            if let Some(event) = self.step().await {
                return event;
            }
        }
    }

    async fn step(&mut self) -> Option<FeedEvent<K>> {
        match std::mem::replace(&mut self.state, State::Empty) {
            State::Empty => match self.client.list(&self.list_params).await {
                Ok(list) => {
                    self.backoff.reset();
                    debug!(
                        namespace = self.client.namespace(),
                        count = list.items.len(),
                        "Listed objects"
                    );
                    self.state = State::Replaying {
                        items: list.items.into_iter(),
                        keys: HashSet::new(),
                        resource_version: list.resource_version.unwrap_or_default(),
                    };
                    Some(FeedEvent::Init)
                }
                Err(e) => {
                    let delay = self.backoff.next_backoff();
                    warn!(
                        namespace = self.client.namespace(),
                        "List failed, retrying in {:?}: {}", delay, e
                    );
                    tokio::time::sleep(delay).await;
                    None
                }
            },
            State::Replaying {
                mut items,
                mut keys,
                resource_version,
            } => {
                while let Some(obj) = items.next() {
                    let Some(key) = ResourceKey::from_resource(&obj, self.client.namespace())
                    else {
                        continue;
                    };
                    keys.insert(key.clone());
                    self.state = State::Replaying {
                        items,
                        keys,
                        resource_version,
                    };
                    return Some(FeedEvent::Change(ChangeEvent {
                        kind: ChangeKind::Added,
                        key,
                        object: Arc::new(obj),
                    }));
                }
                self.state = State::Connect { resource_version };
                Some(FeedEvent::InitDone { keys })
            }
            State::Connect { resource_version } => {
                match self.client.watch(&self.watch_params, &resource_version).await {
                    Ok(stream) => {
                        self.state = State::Watching {
                            resource_version,
                            stream,
                        };
                    }
                    Err(ClientError::Expired(msg)) => {
                        warn!(
                            namespace = self.client.namespace(),
                            "Resource version {} expired, relisting: {}", resource_version, msg
                        );
                    }
                    Err(e) => {
                        let delay = self.backoff.next_backoff();
                        warn!(
                            namespace = self.client.namespace(),
                            "Watch failed, retrying in {:?}: {}", delay, e
                        );
                        tokio::time::sleep(delay).await;
                        self.state = State::Connect { resource_version };
                    }
                }
                None
            }
            State::Watching {
                resource_version,
                mut stream,
            } => match stream.next().await {
                Some(Ok(notice)) => {
                    self.backoff.reset();
                    let resource_version = notice
                        .resource_version()
                        .map_or(resource_version, ToOwned::to_owned);
                    let (kind, obj) = match notice {
                        WatchNotice::Added(obj) => (ChangeKind::Added, obj),
                        WatchNotice::Modified(obj) => (ChangeKind::Modified, obj),
                        WatchNotice::Deleted(obj) => (ChangeKind::Deleted, obj),
                        WatchNotice::Bookmark(_) => {
                            self.state = State::Watching {
                                resource_version,
                                stream,
                            };
                            return None;
                        }
                    };
                    self.state = State::Watching {
                        resource_version,
                        stream,
                    };
                    let key = ResourceKey::from_resource(&obj, self.client.namespace())?;
                    Some(FeedEvent::Change(ChangeEvent {
                        kind,
                        key,
                        object: Arc::new(obj),
                    }))
                }
                Some(Err(ClientError::Expired(msg))) => {
                    warn!(
                        namespace = self.client.namespace(),
                        "Watch expired at {}, relisting: {}", resource_version, msg
                    );
                    None
                }
                Some(Err(e)) => {
                    let delay = self.backoff.next_backoff();
                    warn!(
                        namespace = self.client.namespace(),
                        "Watch error, reconnecting in {:?}: {}", delay, e
                    );
                    tokio::time::sleep(delay).await;
                    self.state = State::Connect { resource_version };
                    None
                }
                None => {
                    debug!(
                        namespace = self.client.namespace(),
                        "Watch closed, resuming from {}", resource_version
                    );
                    self.state = State::Connect { resource_version };
                    None
                }
            },
        }
    }
}
