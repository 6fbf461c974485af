//! Integration-style tests for the controller wiring

#[cfg(test)]
mod tests {
    use super::super::{Controller, ControllerConfig, Reconcile};
    use crate::deployment::list_watch;
    use crate::error::{ClientError, RunError};
    use crate::mock::MockResourceClient;
    use crate::resource_trait::ResourceClient;
    use crate::test_utils::*;
    use crate::types::ResourceKey;
    use k8s_openapi::api::apps::v1::Deployment;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    const WAIT: Duration = Duration::from_secs(5);

    fn client_with(names: &[&str]) -> Arc<MockResourceClient<Deployment>> {
        let client = Arc::new(MockResourceClient::new("default"));
        for name in names {
            client.insert(create_test_deployment(name, "default"));
        }
        client
    }

    #[tokio::test]
    async fn test_reconciles_listed_and_deleted_objects() {
        let client = client_with(&["api", "web"]);
        let reconciler = Arc::new(RecordingReconciler::default());
        let controller = Controller::<Deployment, _, _>::new(
            Arc::clone(&client),
            Arc::clone(&reconciler),
            ControllerConfig::default().workers(2),
        );
        let store = controller.store();
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(controller.run(shutdown.clone()));

        assert!(
            wait_for(WAIT, || reconciler.attempts("api") >= 1
                && reconciler.attempts("web") >= 1)
            .await
        );
        assert_eq!(store.len(), 2);

        // Delete while the watch history is gone: only a relist can notice
        client.expire_versions();
        client.remove("web");

        let web = ResourceKey::new("default", "web");
        assert!(wait_for(WAIT, || reconciler.deleted().contains(&web)).await);
        assert!(!store.contains(&web));
        assert!(store.contains(&ResourceKey::new("default", "api")));

        shutdown.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_runs_over_trait_object_client_and_reconciler() {
        let mock = client_with(&["api"]);
        let client: Arc<dyn ResourceClient<Deployment>> =
            Arc::<MockResourceClient<Deployment>>::clone(&mock);
        let recorder = Arc::new(RecordingReconciler::default());
        let reconciler: Arc<dyn Reconcile<Deployment, Error = ClientError>> =
            Arc::<RecordingReconciler>::clone(&recorder);
        let controller = Controller::new(client, reconciler, ControllerConfig::default());
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(controller.run(shutdown.clone()));

        assert!(wait_for(WAIT, || recorder.attempts("api") >= 1).await);
        shutdown.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_watch_changes_are_reconciled() {
        let client = client_with(&[]);
        let reconciler = Arc::new(RecordingReconciler::default());
        let controller = Controller::<Deployment, _, _>::new(
            Arc::clone(&client),
            Arc::clone(&reconciler),
            ControllerConfig::default(),
        );
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(controller.run(shutdown.clone()));
        assert!(wait_for(WAIT, || client.watch_calls() >= 1).await);

        client.insert(create_test_deployment("late", "default"));

        assert!(wait_for(WAIT, || reconciler.attempts("late") >= 1).await);
        shutdown.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_sync_timeout_is_fatal() {
        let client = client_with(&["api"]);
        client.fail_lists(u32::MAX);
        let reconciler = Arc::new(RecordingReconciler::default());
        let controller = Controller::<Deployment, _, _>::new(
            client,
            Arc::clone(&reconciler),
            ControllerConfig::default().cache_sync_timeout(Duration::from_secs(1)),
        );

        let result = controller.run(CancellationToken::new()).await;

        assert!(matches!(result, Err(RunError::CacheSyncTimeout(_))));
        assert_eq!(reconciler.attempts("api"), 0);
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_in_flight_reconcile() {
        let client = client_with(&["api"]);
        let reconciler = Arc::new(RecordingReconciler::with_delay(Duration::from_millis(200)));
        let controller = Controller::<Deployment, _, _>::new(
            client,
            Arc::clone(&reconciler),
            ControllerConfig::default(),
        );
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(controller.run(shutdown.clone()));
        assert!(wait_for(WAIT, || reconciler.attempts("api") == 1).await);

        shutdown.cancel();
        handle.await.unwrap().unwrap();

        assert_eq!(reconciler.finished("api"), 1);
    }

    #[tokio::test]
    async fn test_list_watch_runs_until_cancelled() {
        let client = client_with(&["api"]);
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(list_watch(Arc::clone(&client), shutdown.clone()));
        assert!(wait_for(WAIT, || client.watch_calls() >= 1).await);

        shutdown.cancel();

        handle.await.unwrap().unwrap();
        assert_eq!(client.list_calls(), 1);
    }
}
