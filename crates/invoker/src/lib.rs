pub mod docker;

pub use docker::*;

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use skiff_models::{Recipe, SkiffError};
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    struct MockHost {
        calls: Mutex<Vec<String>>,
        exit: Option<i64>, // None simulates a wait deadline
    }

    impl MockHost {
        fn new(exit: Option<i64>) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                exit,
            }
        }

        fn record(&self, call: &str) {
            self.calls.lock().unwrap().push(call.to_string());
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ContainerHost for MockHost {
        async fn create(&self, _spec: CreateSpec) -> anyhow::Result<String> {
            self.record("create");
            Ok("cid-1".to_string())
        }

        async fn start(&self, _container_id: &str) -> anyhow::Result<()> {
            self.record("start");
            Ok(())
        }

        async fn wait_exit(
            &self,
            _container_id: &str,
            _timeout_ms: u64,
        ) -> anyhow::Result<Option<i64>> {
            self.record("wait");
            Ok(self.exit)
        }

        async fn logs(&self, _container_id: &str) -> anyhow::Result<String> {
            self.record("logs");
            Ok("Hello Bot\n".to_string())
        }

        async fn stop(&self, _container_id: &str, _timeout_secs: u64) -> anyhow::Result<()> {
            self.record("stop");
            Ok(())
        }

        async fn remove(&self, _container_id: &str, _force: bool) -> anyhow::Result<()> {
            self.record("remove");
            Ok(())
        }
    }

    fn opts(remove_after_exit: bool) -> RunOptions {
        RunOptions {
            wait_timeout_ms: 1_000,
            stop_grace_secs: 1,
            remove_after_exit,
        }
    }

    #[tokio::test]
    async fn test_launch_and_wait_happy_path() {
        let host = MockHost::new(Some(0));
        let outcome = launch_and_wait(&host, CreateSpec::default(), &opts(true))
            .await
            .unwrap();

        assert_eq!(outcome.container_id, "cid-1");
        assert_eq!(outcome.exit_code, 0);
        assert_eq!(outcome.logs, "Hello Bot\n");
        assert_eq!(host.calls(), vec!["create", "start", "wait", "logs", "remove"]);
    }

    #[tokio::test]
    async fn test_launch_and_wait_forwards_exit_code() {
        let host = MockHost::new(Some(2));
        let outcome = launch_and_wait(&host, CreateSpec::default(), &opts(true))
            .await
            .unwrap();
        assert_eq!(outcome.exit_code, 2);
    }

    #[tokio::test]
    async fn test_launch_and_wait_keeps_container_when_configured() {
        let host = MockHost::new(Some(0));
        launch_and_wait(&host, CreateSpec::default(), &opts(false))
            .await
            .unwrap();
        assert!(!host.calls().contains(&"remove".to_string()));
    }

    #[tokio::test]
    async fn test_launch_and_wait_times_out() {
        let host = MockHost::new(None);
        let result = launch_and_wait(&host, CreateSpec::default(), &opts(true)).await;
        assert!(matches!(
            result,
            Err(SkiffError::ContainerTimeout { timeout_ms: 1_000 })
        ));
        // Deadline cleanup stops then removes before surfacing the error.
        assert_eq!(host.calls(), vec!["create", "start", "wait", "stop", "remove"]);
    }

    #[test]
    fn test_create_spec_from_recipe() {
        let recipe = Recipe::default();
        let overrides = BTreeMap::from([("NAME".to_string(), "Other".to_string())]);
        let spec = create_spec(&recipe, "skiff/app:abc123", &overrides);

        assert_eq!(spec.image, "skiff/app:abc123");
        assert!(spec.name.starts_with("skiff-app-"));
        assert_eq!(
            spec.env,
            vec![("NAME".to_string(), "Other".to_string())]
        );
        assert_eq!(spec.working_dir.as_deref(), Some("/app"));
        assert_eq!(spec.exposed_ports, vec![8080]);
        assert_eq!(spec.cmd, vec!["python", "main.py"]);
        assert_eq!(
            spec.labels,
            vec![("io.skiff.recipe".to_string(), "app".to_string())]
        );
    }
}
