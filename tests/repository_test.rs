//! Configuration Repository Integration Tests
//!
//! Covers the readiness gate, caching, bulk reads, reload notifications and
//! the distinction between empty and malformed documents.

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use authgate::repository::{
        ConfigStore, ConfigurationChangeListener, ConfigurationRepository, FileStore, Health,
        InMemoryStore, Lifecycle, ListenerError, RepositoryError, Settings, StoreError,
        StoredDocument, CONFIG_TYPE, INTERNAL_USERS_TYPE,
    };
    use mockall::mock;
    use parking_lot::Mutex;
    use std::sync::Arc;

    mock! {
        Store {}

        #[async_trait]
        impl ConfigStore for Store {
            async fn lifecycle(&self) -> Lifecycle;
            async fn index_exists(&self) -> bool;
            async fn health(&self) -> Health;
            async fn multi_get(
                &self,
                types: &[String],
            ) -> Result<Vec<(String, StoredDocument)>, StoreError>;
        }
    }

    /// Records every document it is notified with
    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<Settings>>,
    }

    impl Recorder {
        fn count(&self) -> usize {
            self.seen.lock().len()
        }
    }

    impl ConfigurationChangeListener for Recorder {
        fn on_change(&self, config: &Settings) -> Result<(), ListenerError> {
            self.seen.lock().push(config.clone());
            Ok(())
        }
    }

    // ========================================================================
    // Readiness gate
    // ========================================================================

    #[tokio::test]
    async fn test_not_started_store_is_never_read() {
        let mut store = MockStore::new();
        store
            .expect_lifecycle()
            .returning(|| Lifecycle::Initializing);
        store.expect_multi_get().never();

        let repository = ConfigurationRepository::new(Arc::new(store));
        assert!(repository.get(CONFIG_TYPE).await.unwrap().is_none());
        assert!(repository.get_bulk(&[CONFIG_TYPE]).await.unwrap().is_empty());
        assert!(repository.reload(&[CONFIG_TYPE]).await.unwrap().is_empty());
        assert!(!repository.is_ready());
    }

    #[tokio::test]
    async fn test_missing_index_is_not_ready() {
        let mut store = MockStore::new();
        store.expect_lifecycle().returning(|| Lifecycle::Started);
        store.expect_index_exists().returning(|| false);
        store.expect_multi_get().never();

        let repository = ConfigurationRepository::new(Arc::new(store));
        assert!(repository.get(CONFIG_TYPE).await.unwrap().is_none());
        assert!(!repository.is_ready());
    }

    #[tokio::test]
    async fn test_red_health_is_not_ready_but_yellow_is() {
        let store = Arc::new(InMemoryStore::new());
        store.put(CONFIG_TYPE, "a: 1");
        store.set_health(Health::Red);

        let repository = ConfigurationRepository::new(store.clone());
        assert!(repository.get(CONFIG_TYPE).await.unwrap().is_none());

        store.set_health(Health::TimedOut);
        assert!(repository.get(CONFIG_TYPE).await.unwrap().is_none());

        store.set_health(Health::Yellow);
        assert!(repository.get(CONFIG_TYPE).await.unwrap().is_some());
        assert!(repository.is_ready());
    }

    #[tokio::test]
    async fn test_readiness_is_sticky() {
        let mut store = MockStore::new();
        // Probed exactly once; later reads skip the gate entirely
        store
            .expect_lifecycle()
            .times(1)
            .returning(|| Lifecycle::Started);
        store.expect_index_exists().times(1).returning(|| true);
        store.expect_health().times(1).returning(|| Health::Green);
        store.expect_multi_get().returning(|types| {
            Ok(types
                .iter()
                .map(|t| (t.clone(), StoredDocument::Found("a: 1".into())))
                .collect())
        });

        let repository = ConfigurationRepository::new(Arc::new(store));
        repository.get(CONFIG_TYPE).await.unwrap();
        repository.reload(&[CONFIG_TYPE]).await.unwrap();
        repository.get_bulk(&[INTERNAL_USERS_TYPE]).await.unwrap();
    }

    // ========================================================================
    // Reads
    // ========================================================================

    #[tokio::test]
    async fn test_get_bulk_omits_missing_and_failed_types() {
        let mut store = MockStore::new();
        store.expect_lifecycle().returning(|| Lifecycle::Started);
        store.expect_index_exists().returning(|| true);
        store.expect_health().returning(|| Health::Green);
        store.expect_multi_get().times(1).returning(|_| {
            Ok(vec![
                ("config".to_string(), StoredDocument::Found("a: 1".into())),
                ("internalusers".to_string(), StoredDocument::Missing),
                ("roles".to_string(), StoredDocument::Failed("shard down".into())),
            ])
        });

        let repository = ConfigurationRepository::new(Arc::new(store));
        let result = repository
            .get_bulk(&["config", "internalusers", "roles"])
            .await
            .unwrap();

        assert_eq!(result.len(), 1);
        assert_eq!(result["config"].get_i64("a", 0), 1);
    }

    #[tokio::test]
    async fn test_get_bulk_serves_cached_types_without_store_read() {
        let store = Arc::new(InMemoryStore::new());
        store.put(CONFIG_TYPE, "a: 1");
        store.put(INTERNAL_USERS_TYPE, "kirk:\n  hash: x\n");
        let repository = ConfigurationRepository::new(store.clone());

        let cached = repository.get(CONFIG_TYPE).await.unwrap().unwrap();
        store.put(CONFIG_TYPE, "a: 2");

        let result = repository
            .get_bulk(&[CONFIG_TYPE, INTERNAL_USERS_TYPE])
            .await
            .unwrap();
        assert!(Arc::ptr_eq(&result[CONFIG_TYPE], &cached));
        assert_eq!(result[INTERNAL_USERS_TYPE].names(), vec!["kirk"]);
    }

    #[tokio::test]
    async fn test_empty_document_is_valid_but_malformed_is_error() {
        let store = Arc::new(InMemoryStore::new());
        store.put(CONFIG_TYPE, "");
        store.put(INTERNAL_USERS_TYPE, "kirk: [unclosed");
        let repository = ConfigurationRepository::new(store);

        let empty = repository.get(CONFIG_TYPE).await.unwrap().unwrap();
        assert!(empty.is_empty());

        let result = repository.get(INTERNAL_USERS_TYPE).await;
        assert!(matches!(
            result,
            Err(RepositoryError::Parse { ref config_type, .. }) if config_type == INTERNAL_USERS_TYPE
        ));
    }

    #[tokio::test]
    async fn test_missing_type_is_absent() {
        let repository = ConfigurationRepository::new(Arc::new(InMemoryStore::new()));
        assert!(repository.get("nothing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_store_error_is_surfaced() {
        let mut store = MockStore::new();
        store.expect_lifecycle().returning(|| Lifecycle::Started);
        store.expect_index_exists().returning(|| true);
        store.expect_health().returning(|| Health::Green);
        store
            .expect_multi_get()
            .returning(|_| Err(StoreError::Unavailable("connection reset".into())));

        let repository = ConfigurationRepository::new(Arc::new(store));
        assert!(matches!(
            repository.get(CONFIG_TYPE).await,
            Err(RepositoryError::Store(_))
        ));
    }

    // ========================================================================
    // Reload and notifications
    // ========================================================================

    #[tokio::test]
    async fn test_reload_notifies_each_subscriber_exactly_once() {
        let store = Arc::new(InMemoryStore::new());
        store.put(CONFIG_TYPE, "a: 1");
        store.put(INTERNAL_USERS_TYPE, "kirk:\n  hash: x\n");
        let repository = ConfigurationRepository::new(store.clone());

        let first = Arc::new(Recorder::default());
        let second = Arc::new(Recorder::default());
        let users = Arc::new(Recorder::default());
        repository.subscribe(CONFIG_TYPE, first.clone());
        repository.subscribe(CONFIG_TYPE, second.clone());
        repository.subscribe(INTERNAL_USERS_TYPE, users.clone());

        repository.reload(&[CONFIG_TYPE]).await.unwrap();
        assert_eq!(first.count(), 1);
        assert_eq!(second.count(), 1);
        assert_eq!(users.count(), 0);

        // Unchanged document still notifies
        repository.reload(&[CONFIG_TYPE]).await.unwrap();
        assert_eq!(first.count(), 2);
        assert_eq!(second.count(), 2);

        store.put(CONFIG_TYPE, "a: 3");
        repository.reload_subscribed().await.unwrap();
        assert_eq!(first.count(), 3);
        assert_eq!(users.count(), 1);
        assert_eq!(first.seen.lock()[2].get_i64("a", 0), 3);
    }

    #[tokio::test]
    async fn test_reload_replaces_cache() {
        let store = Arc::new(InMemoryStore::new());
        store.put(CONFIG_TYPE, "a: 1");
        let repository = ConfigurationRepository::new(store.clone());

        repository.get(CONFIG_TYPE).await.unwrap();
        store.put(CONFIG_TYPE, "a: 2");
        repository.reload(&[CONFIG_TYPE]).await.unwrap();

        let current = repository.get(CONFIG_TYPE).await.unwrap().unwrap();
        assert_eq!(current.get_i64("a", 0), 2);
    }

    #[tokio::test]
    async fn test_get_does_not_notify() {
        let store = Arc::new(InMemoryStore::new());
        store.put(CONFIG_TYPE, "a: 1");
        let repository = ConfigurationRepository::new(store);
        let recorder = Arc::new(Recorder::default());
        repository.subscribe(CONFIG_TYPE, recorder.clone());

        repository.get(CONFIG_TYPE).await.unwrap();
        assert_eq!(recorder.count(), 0);
        assert!(repository.subscribed_types().contains(CONFIG_TYPE));
    }

    // ========================================================================
    // File store
    // ========================================================================

    #[tokio::test]
    async fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.yml"),
            "dynamic.http.anonymous_auth_enabled: true\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("internalusers.json"), r#"{"kirk":{"hash":"x"}}"#)
            .unwrap();

        let repository = ConfigurationRepository::new(Arc::new(FileStore::new(dir.path())));
        let result = repository
            .get_bulk(&[CONFIG_TYPE, INTERNAL_USERS_TYPE, "roles"])
            .await
            .unwrap();

        assert_eq!(result.len(), 2);
        assert!(result[CONFIG_TYPE].get_bool("dynamic.http.anonymous_auth_enabled", false));
        assert_eq!(result[INTERNAL_USERS_TYPE].get_str("kirk.hash"), Some("x".into()));
    }

    #[tokio::test]
    async fn test_file_store_missing_directory_is_not_ready() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent");
        let repository = ConfigurationRepository::new(Arc::new(FileStore::new(missing)));
        assert!(repository.get(CONFIG_TYPE).await.unwrap().is_none());
        assert!(!repository.is_ready());
    }
}
