//! Unit tests for the list+watch change feed

#[cfg(test)]
mod tests {
    use super::super::feed::{ChangeFeed, FeedEvent};
    use crate::backoff::ExponentialBackoff;
    use crate::mock::MockResourceClient;
    use crate::types::{ChangeKind, ResourceKey};
    use k8s_openapi::api::core::v1::ConfigMap;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use kube::api::{ListParams, WatchParams};
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::time::Duration;

    type Feed = ChangeFeed<ConfigMap, MockResourceClient<ConfigMap>>;

    fn config_map(name: &str) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn new_feed(client: &Arc<MockResourceClient<ConfigMap>>) -> Feed {
        ChangeFeed::new(
            Arc::clone(client),
            ListParams::default(),
            WatchParams::default(),
            ExponentialBackoff::new(Duration::from_millis(1), Duration::from_millis(10)),
        )
    }

    async fn expect_change(feed: &mut Feed) -> (ChangeKind, String) {
        match feed.next().await {
            FeedEvent::Change(change) => (change.kind, change.key.name),
            other => panic!("expected a change, got {other:?}"),
        }
    }

    async fn expect_init_done(feed: &mut Feed) -> HashSet<ResourceKey> {
        match feed.next().await {
            FeedEvent::InitDone { keys } => keys,
            other => panic!("expected InitDone, got {other:?}"),
        }
    }

    fn keys(names: &[&str]) -> HashSet<ResourceKey> {
        names.iter().map(|name| ResourceKey::new("default", *name)).collect()
    }

    #[tokio::test]
    async fn test_initial_list_then_watch() {
        let client = Arc::new(MockResourceClient::new("default"));
        client.insert(config_map("a"));
        client.insert(config_map("b"));
        let mut feed = new_feed(&client);

        assert!(matches!(feed.next().await, FeedEvent::Init));
        assert_eq!(expect_change(&mut feed).await, (ChangeKind::Added, "a".to_string()));
        assert_eq!(expect_change(&mut feed).await, (ChangeKind::Added, "b".to_string()));
        assert_eq!(expect_init_done(&mut feed).await, keys(&["a", "b"]));

        client.insert(config_map("c"));
        client.insert(config_map("a"));
        client.remove("b");

        assert_eq!(expect_change(&mut feed).await, (ChangeKind::Added, "c".to_string()));
        assert_eq!(expect_change(&mut feed).await, (ChangeKind::Modified, "a".to_string()));
        assert_eq!(expect_change(&mut feed).await, (ChangeKind::Deleted, "b".to_string()));
        assert_eq!(client.list_calls(), 1);
    }

    #[tokio::test]
    async fn test_resumes_from_last_version_after_stream_closes() {
        let client = Arc::new(MockResourceClient::new("default"));
        client.insert(config_map("a"));
        let mut feed = new_feed(&client);
        assert!(matches!(feed.next().await, FeedEvent::Init));
        expect_change(&mut feed).await;
        expect_init_done(&mut feed).await;
        client.insert(config_map("b"));
        expect_change(&mut feed).await;

        client.close_watches();
        client.insert(config_map("c"));

        // Missed while disconnected, replayed on reconnect without a relist
        assert_eq!(expect_change(&mut feed).await, (ChangeKind::Added, "c".to_string()));
        assert_eq!(client.list_calls(), 1);
        assert_eq!(client.watch_calls(), 2);
    }

    #[tokio::test]
    async fn test_relists_when_version_expires() {
        let client = Arc::new(MockResourceClient::new("default"));
        client.insert(config_map("a"));
        client.insert(config_map("b"));
        let mut feed = new_feed(&client);
        assert!(matches!(feed.next().await, FeedEvent::Init));
        expect_change(&mut feed).await;
        expect_change(&mut feed).await;
        expect_init_done(&mut feed).await;
        client.insert(config_map("c"));
        expect_change(&mut feed).await;

        client.expire_versions();
        client.remove("b");

        assert!(matches!(feed.next().await, FeedEvent::Init));
        assert_eq!(expect_change(&mut feed).await, (ChangeKind::Added, "a".to_string()));
        assert_eq!(expect_change(&mut feed).await, (ChangeKind::Added, "c".to_string()));
        assert_eq!(expect_init_done(&mut feed).await, keys(&["a", "c"]));
        assert_eq!(client.list_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_list_failures_are_retried() {
        let client = Arc::new(MockResourceClient::new("default"));
        client.insert(config_map("a"));
        client.fail_lists(3);
        let mut feed = new_feed(&client);

        assert!(matches!(feed.next().await, FeedEvent::Init));

        assert_eq!(client.list_calls(), 4);
    }
}
